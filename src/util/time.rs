//! Calendar helpers. All arithmetic is done in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

/// UTC midnight of the day containing `at`.
#[must_use]
pub fn midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// UTC midnight of the Monday on or before `at`.
#[must_use]
pub fn monday_of(at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = i64::from(at.weekday().num_days_from_monday());
    midnight(at) - Duration::days(offset)
}

/// Calendar label such as `"March 6, 2023"`.
#[must_use]
pub fn calendar_alias(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// Parse either an RFC 3339 instant or a bare `YYYY-MM-DD` date (as UTC midnight).
///
/// # Errors
/// Returns a message naming the rejected input.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got '{trimmed}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn midnight_truncates() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        assert_eq!(midnight(at), Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn monday_alignment() {
        // 2023-03-09 is a Thursday
        let thu = Utc.with_ymd_and_hms(2023, 3, 9, 15, 0, 0).unwrap();
        assert_eq!(monday_of(thu), Utc.with_ymd_and_hms(2023, 3, 6, 0, 0, 0).unwrap());

        let sun = Utc.with_ymd_and_hms(2024, 1, 7, 23, 0, 0).unwrap();
        assert_eq!(monday_of(sun), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let mon = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(monday_of(mon), mon);
    }

    #[test]
    fn calendar_alias_format() {
        let at = Utc.with_ymd_and_hms(2023, 3, 6, 0, 0, 0).unwrap();
        assert_eq!(calendar_alias(at), "March 6, 2023");
    }

    #[test]
    fn parse_instant_accepts_dates_and_timestamps() {
        assert_eq!(
            parse_instant("2024-03-10").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2024-03-10T08:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 6, 30, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
    }
}

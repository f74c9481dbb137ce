//! Usage domains tracked by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatError;

/// A feature domain whose usage is billed and rolled up independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Ai,
    Connect,
}

impl Domain {
    /// All domains, in rollup order.
    pub const ALL: [Self; 2] = [Self::Ai, Self::Connect];

    /// Name used on the command line and in stored documents.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Connect => "connect",
        }
    }

    /// The `kind` that quota and payment records carry for this domain.
    ///
    /// Connect subscriptions are sold as the "cloud" product.
    #[must_use]
    pub const fn quota_kind(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Connect => "cloud",
        }
    }

    /// Parse a domain from its CLI name (case-insensitive).
    #[must_use]
    pub fn from_cli_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ai" => Some(Self::Ai),
            "connect" | "ct" => Some(Self::Connect),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for Domain {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cli_name(s).ok_or_else(|| StatError::InvalidDomain(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!("ai".parse::<Domain>().unwrap(), Domain::Ai);
        assert_eq!(" Connect ".parse::<Domain>().unwrap(), Domain::Connect);
        assert!(matches!(
            "billing".parse::<Domain>(),
            Err(StatError::InvalidDomain(_))
        ));
    }

    #[test]
    fn quota_kinds() {
        assert_eq!(Domain::Ai.quota_kind(), "ai");
        assert_eq!(Domain::Connect.quota_kind(), "cloud");
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Domain::Ai).unwrap(), "\"ai\"");
        let d: Domain = serde_json::from_str("\"connect\"").unwrap();
        assert_eq!(d, Domain::Connect);
    }
}

//! `ustat stat`: print one stored stat.

use anyhow::anyhow;

use crate::cli::args::{OutputFormat, StatArgs};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::models::DerivedStat;
use crate::error::{Result, StatError};
use crate::storage::Lookup;

/// # Errors
/// Returns an error if the account has no stat or the read fails.
pub async fn execute(
    runtime: &Runtime,
    args: &StatArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let Lookup::Found(stat) = runtime.store.get_stat(&args.account).await? else {
        return Err(StatError::Other(anyhow!(
            "no stat for account '{}'; run `ustat refresh` first",
            args.account
        )));
    };
    emit("stat", &stat, format, pretty, human_lines)
}

fn plan(level: &crate::core::models::Level) -> String {
    let tier = if level.premium { "premium" } else { "free" };
    format!("{tier} ({} level {})", level.plan.plan_type, level.plan.level)
}

fn human_lines(stat: &DerivedStat) -> Vec<String> {
    let mut lines = vec![
        format!("Account   {}", stat.id),
        format!("Email     {}", stat.email),
        format!("Created   {}", stat.created_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Updated   {}", stat.updated_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Cohort    {}", stat.cohort.week.alias),
        format!("AI        {}", plan(&stat.class.ai)),
        format!("Connect   {}", plan(&stat.class.connect)),
        String::new(),
        format!("{:<10} {:>10} {:>10} {:>10} {:>10}", "", "total", "month", "week", "yesterday"),
    ];
    for (name, bills) in [("ai", &stat.bills.ai), ("connect", &stat.bills.connect)] {
        lines.push(format!(
            "{name:<10} {:>10} {:>10} {:>10} {:>10}",
            bills.total, bills.last_month, bills.last_week, bills.yesterday
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "Apps {}  knowledge bases {}  uploads {}  connections {}",
        stat.usages.ai.app,
        stat.usages.ai.knowledge_base,
        stat.usages.ai.upload,
        stat.usages.connect.connection,
    ));
    lines
}

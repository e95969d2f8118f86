//! Shared helpers for CLI commands.

use chrono::NaiveDate;
use console::{style, StyledObject};

use crate::config::Settings;
use crate::models::{parse_logical_date, RunStatus};
use crate::pipeline::Pipeline;
use crate::repository::LedgerContext;

pub fn pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    settings.ensure_directories()?;
    Ok(Pipeline::new(settings.clone())?)
}

/// Open the run ledger, creating its tables if needed.
pub async fn ledger(settings: &Settings) -> anyhow::Result<LedgerContext> {
    settings.ensure_directories()?;
    let ctx = LedgerContext::from_url(&settings.database_url());
    ctx.init_schema().await?;
    Ok(ctx)
}

pub fn parse_date(raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    Ok(raw.map(parse_logical_date).transpose()?)
}

pub fn styled_status(status: RunStatus) -> StyledObject<&'static str> {
    let label = status.as_str();
    match status {
        RunStatus::Success => style(label).green(),
        RunStatus::Failed => style(label).red(),
        RunStatus::Running => style(label).cyan(),
        RunStatus::Skipped => style(label).yellow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("20250102")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 2)
        );
        assert_eq!(parse_date(None).unwrap(), None);
        assert!(parse_date(Some("Jan 2")).is_err());
    }
}

//! Data models for ytpipe.

mod batch;
mod channel;
mod comment;
mod ledger;
mod run;
mod video;

pub mod lenient;

pub use batch::{ExtractTable, ExtractionBatch};
pub use channel::{Category, Channel};
pub use comment::Comment;
pub use ledger::{DagRun, RunStatus, TaskRun};
pub use run::{Lineage, RunId};
pub use video::{Video, VideoStatistics};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{PipelineError, Result};

/// Parse a logical date given as `yyyymmdd` or `yyyy-mm-dd`.
pub fn parse_logical_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| {
            PipelineError::invalid(format!(
                "Invalid date '{}' (expected yyyymmdd or yyyy-mm-dd)",
                raw
            ))
        })
}

/// Parse a timestamp as the API or a previous load wrote it.
///
/// Unparseable input yields `None` so the column lands as NULL.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-03-05T10:20:30Z").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 5));
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_parse_offset_is_normalized_to_utc() {
        let ts = parse_timestamp("2024-03-05T10:20:30+02:00").unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn test_parse_naive_and_date_only() {
        assert!(parse_timestamp("2024-03-05 10:20:30.123456").is_some());
        assert!(parse_timestamp("2024-03-05").is_some());
    }

    #[test]
    fn test_parse_logical_date() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(parse_logical_date("20250131").unwrap(), d);
        assert_eq!(parse_logical_date("2025-01-31").unwrap(), d);
        assert!(parse_logical_date("31/01/2025").unwrap_err().is_client_error());
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}

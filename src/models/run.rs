//! Run identifiers and row lineage.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const MAX_RUN_ID_LEN: usize = 128;

/// Opaque token grouping every row produced by one extraction.
///
/// Run ids end up in object paths, so only `[A-Za-z0-9_.:+-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run id: `<yyyymmddTHHMMSSZ>_<8 hex>`.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        RunId(format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8]))
    }

    /// Validate a caller-supplied run id.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PipelineError::invalid("run_id must not be empty"));
        }
        if raw.len() > MAX_RUN_ID_LEN {
            return Err(PipelineError::invalid(format!(
                "run_id longer than {} characters",
                MAX_RUN_ID_LEN
            )));
        }
        if raw == "." || raw == ".." {
            return Err(PipelineError::invalid("run_id must not be a path component"));
        }
        let valid = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '+' | '-'));
        if !valid {
            return Err(PipelineError::invalid(format!(
                "run_id contains unsupported characters: {}",
                raw
            )));
        }
        Ok(RunId(raw.to_string()))
    }

    /// Use the supplied id when present, otherwise generate one.
    pub fn parse_or_generate(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(s) if !s.trim().is_empty() => Self::parse(s),
            _ => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Columns appended to every raw row at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage {
    pub ingest_timestamp: DateTime<Utc>,
    /// URI of the staged object the row came from.
    pub source_path: String,
    pub run_id: RunId,
}

impl Lineage {
    pub fn new(source_path: impl Into<String>, run_id: RunId) -> Self {
        Self {
            ingest_timestamp: Utc::now(),
            source_path: source_path.into(),
            run_id,
        }
    }
}

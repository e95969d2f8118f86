//! Orchestrator run records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// State of a DAG run or a task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One DAG execution for a logical date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagRun {
    pub id: i32,
    pub dag_id: String,
    pub logical_date: NaiveDate,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// One attempt of one task within a DAG run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRun {
    pub id: i32,
    pub dag_run_id: i32,
    pub task_id: String,
    pub attempt: i32,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Response body of the invoked endpoint, when it answered.
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}

//! The two DAGs: task order, endpoints and payload wiring.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};

pub const ETL_DAG_ID: &str = "youtube_pipeline";
pub const GOLDEN_DAG_ID: &str = "youtube_golden_pipeline";
/// Task id under which the golden DAG records its wait on the ETL DAG.
pub const SENSOR_TASK_ID: &str = "wait_for_etl";

/// A task that invokes one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Schema,
    Extract,
    Load,
    Transform,
    Golden,
}

impl Task {
    /// ETL tasks in execution order. Each one receives the previous response.
    pub const ETL: [Task; 4] = [Task::Schema, Task::Extract, Task::Load, Task::Transform];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Extract => "extract",
            Self::Load => "load",
            Self::Transform => "transform",
            Self::Golden => "golden",
        }
    }

    /// Path of the function endpoint. The golden endpoint is configured separately.
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Schema => Some("raw-schema"),
            Self::Extract => Some("raw-extract"),
            Self::Load => Some("raw-parse"),
            Self::Transform => Some("raw-transform"),
            Self::Golden => None,
        }
    }

    /// Request body for this task.
    ///
    /// Extract and load forward the upstream response so that the load
    /// step finds the `run_id` and `blob_name` the extract step produced.
    pub fn payload(&self, upstream: Option<&Value>, ctx: &DagContext) -> Value {
        let mut body = match (self, upstream) {
            (Self::Extract | Self::Load, Some(Value::Object(map))) => map.clone(),
            _ => Map::new(),
        };
        if *self == Self::Extract {
            body.insert("run_id".into(), Value::String(ctx.run_id.clone()));
        }
        if *self != Self::Schema {
            body.insert("date".into(), Value::String(ctx.ds_nodash()));
        }
        Value::Object(body)
    }
}

/// Join a base URL and an endpoint path.
pub fn endpoint_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint)
}

/// Identity of one DAG execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagContext {
    pub logical_date: NaiveDate,
    pub run_id: String,
}

impl DagContext {
    /// Context of a run fired by the daily schedule.
    pub fn scheduled(logical_date: NaiveDate) -> Self {
        Self {
            logical_date,
            run_id: format!("scheduled__{}T00:00:00+00:00", logical_date.format("%Y-%m-%d")),
        }
    }

    /// Context of a run triggered by hand at `now`.
    pub fn manual(logical_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            logical_date,
            run_id: format!("manual__{}", now.to_rfc3339_opts(SecondsFormat::Secs, false)),
        }
    }

    /// Logical date as `YYYYMMDD`.
    pub fn ds_nodash(&self) -> String {
        self.logical_date.format("%Y%m%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunId;
    use serde_json::json;

    fn ctx() -> DagContext {
        DagContext::scheduled(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    #[test]
    fn test_scheduled_run_id_is_valid() {
        let ctx = ctx();
        assert_eq!(ctx.run_id, "scheduled__2025-01-01T00:00:00+00:00");
        assert!(RunId::parse(&ctx.run_id).is_ok());
        assert_eq!(ctx.ds_nodash(), "20250101");
    }

    #[test]
    fn test_manual_run_id_is_valid() {
        let now = DateTime::parse_from_rfc3339("2025-02-03T04:05:06Z")
            .unwrap()
            .with_timezone(&Utc);
        let ctx = DagContext::manual(NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(), now);
        assert_eq!(ctx.run_id, "manual__2025-02-03T04:05:06+00:00");
        assert!(RunId::parse(&ctx.run_id).is_ok());
    }

    #[test]
    fn test_payload_wiring() {
        let ctx = ctx();
        assert_eq!(Task::Schema.payload(None, &ctx), json!({}));

        let schema_resp = json!({"status": "success", "dataset": "youtube_raw"});
        let extract = Task::Extract.payload(Some(&schema_resp), &ctx);
        assert_eq!(extract["run_id"], ctx.run_id.as_str());
        assert_eq!(extract["date"], "20250101");
        assert_eq!(extract["dataset"], "youtube_raw");

        let extract_resp = json!({"run_id": "r1", "blob_name": "raw/x.json", "bucket_name": "b"});
        let load = Task::Load.payload(Some(&extract_resp), &ctx);
        assert_eq!(load["run_id"], "r1");
        assert_eq!(load["blob_name"], "raw/x.json");
        assert_eq!(load["date"], "20250101");

        let transform = Task::Transform.payload(Some(&extract_resp), &ctx);
        assert_eq!(transform, json!({"date": "20250101"}));
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://localhost:3030/", "raw-schema"),
            "http://localhost:3030/raw-schema"
        );
        assert_eq!(Task::Load.endpoint(), Some("raw-parse"));
        assert_eq!(Task::Golden.endpoint(), None);
    }
}

//! Analytical warehouse access (raw and staging datasets).
//!
//! Two engines sit behind the [`Warehouse`] trait: an embedded DuckDB
//! database (also reaching MotherDuck through `md:` paths) and BigQuery over
//! its REST API. Statements are rendered per [`Dialect`].

mod bigquery;
mod dialect;
mod duck;
pub mod merge;
pub mod tables;

pub use bigquery::BigQueryWarehouse;
pub use dialect::{validate_dataset, validate_project, Dialect};
pub use duck::DuckDbWarehouse;
pub use merge::MergeSpec;
pub use tables::{ColumnDef, ColumnType, TableDef};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::config::{Settings, WarehouseBackend};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;
use crate::secrets::SecretStore;

pub const BIGQUERY_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// A value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    /// Empty strings are stored as NULL.
    pub fn opt_text(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => SqlValue::Text(v.to_string()),
            _ => SqlValue::Null,
        }
    }

    pub fn opt_timestamp(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Timestamp)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Canonical text form (timestamps as `YYYY-MM-DD HH:MM:SS.ffffff`).
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            SqlValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => Value::from(*f),
            other => other.to_text().map_or(Value::Null, Value::String),
        }
    }
}

/// A named statement parameter, written `@name` in SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: SqlValue,
}

impl QueryParam {
    pub fn new(name: impl Into<String>, value: SqlValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Typed accessors over result rows.
pub trait RowExt {
    fn int(&self, column: &str) -> i64;
    fn float(&self, column: &str) -> f64;
    fn text(&self, column: &str) -> Option<String>;
}

impl RowExt for Row {
    fn int(&self, column: &str) -> i64 {
        match self.get(column) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
            _ => 0,
        }
    }

    fn float(&self, column: &str) -> f64 {
        match self.get(column) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// An analytical SQL engine holding the raw and staging datasets.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn dialect(&self) -> &Dialect;

    /// Run DDL/DML (one statement or a script).
    async fn execute(&self, sql: &str) -> Result<()>;

    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>>;

    /// Append rows laid out in `table`'s column order. `batch_key` makes
    /// retried inserts deduplicable where the engine supports it.
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &TableDef,
        rows: &[Vec<SqlValue>],
        batch_key: &str,
    ) -> Result<usize>;

    async fn count_rows(&self, dataset: &str, table: &str) -> Result<i64> {
        let rows = self
            .query(&self.dialect().count_rows(dataset, table), &[])
            .await?;
        Ok(rows.first().map(|r| r.int("row_count")).unwrap_or(0))
    }
}

/// Open the configured warehouse.
pub async fn connect(
    settings: &Settings,
    secrets: &dyn SecretStore,
    auth: Arc<GcpAuth>,
) -> Result<Arc<dyn Warehouse>> {
    let wh = &settings.warehouse;
    validate_dataset(&wh.raw_dataset)?;
    validate_dataset(&wh.staging_dataset)?;

    match wh.backend {
        WarehouseBackend::DuckDb => {
            let mut path = wh.duckdb_path.clone();
            if path.starts_with("md:") {
                if let Some(ref secret) = wh.token_secret {
                    let token = secrets.get_secret(secret).await?;
                    let sep = if path.contains('?') { '&' } else { '?' };
                    path = format!("{}{}motherduck_token={}", path, sep, token);
                }
            } else if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
            }
            let warehouse = DuckDbWarehouse::open(&path)?;
            tracing::debug!("Opened DuckDB warehouse at {}", wh.duckdb_path);
            Ok(Arc::new(warehouse))
        }
        WarehouseBackend::BigQuery => {
            let project = wh.project_id.clone().ok_or_else(|| {
                PipelineError::Config(
                    "BigQuery warehouse needs a project (set GCP_PROJECT)".to_string(),
                )
            })?;
            validate_project(&project)?;
            let warehouse = BigQueryWarehouse::new(
                &wh.bigquery_base_url,
                project,
                wh.location.clone(),
                auth,
                &settings.user_agent,
            )?;
            Ok(Arc::new(warehouse))
        }
    }
}

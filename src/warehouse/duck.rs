//! DuckDB warehouse (local file, `:memory:` or MotherDuck `md:` path).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat};
use duckdb::types::{TimeUnit, ToSql, ToSqlOutput, Value as DuckValue};
use duckdb::Connection;
use regex::Regex;
use serde_json::Value;

use super::{ColumnType, Dialect, QueryParam, Row, SqlValue, TableDef, Warehouse};
use crate::error::{PipelineError, Result};

trait DuckDbResultExt<T> {
    fn to_wh_err(self) -> Result<T>;
}

impl<T> DuckDbResultExt<T> for std::result::Result<T, duckdb::Error> {
    fn to_wh_err(self) -> Result<T> {
        self.map_err(PipelineError::warehouse)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => DuckValue::Null,
            SqlValue::Bool(b) => DuckValue::Boolean(*b),
            SqlValue::Int(i) => DuckValue::BigInt(*i),
            SqlValue::Float(f) => DuckValue::Double(*f),
            other => other.to_text().map_or(DuckValue::Null, DuckValue::Text),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

pub struct DuckDbWarehouse {
    conn: Arc<Mutex<Connection>>,
    dialect: Dialect,
}

impl DuckDbWarehouse {
    /// Open a database file, `:memory:`, or an `md:` URL.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| PipelineError::Connection(format!("DuckDB open failed: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dialect: Dialect::DuckDb,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| PipelineError::warehouse(format!("connection lock poisoned: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| PipelineError::warehouse(format!("warehouse task failed: {}", e)))?
    }
}

fn truncate_sql(sql: &str) -> String {
    if sql.len() <= 200 {
        return sql.to_string();
    }
    let end = sql
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= 200)
        .unwrap_or(sql.len());
    format!("{}...", &sql[..end])
}

/// Rewrite `@name` placeholders to positional `?` and collect values in order.
pub(crate) fn bind_named(sql: &str, params: &[QueryParam]) -> Result<(String, Vec<SqlValue>)> {
    let re = Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").map_err(PipelineError::warehouse)?;
    let mut values = Vec::new();
    let mut missing = None;

    let rewritten = re.replace_all(sql, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match params.iter().find(|p| p.name == name) {
            Some(p) => values.push(p.value.clone()),
            None => missing = Some(name.to_string()),
        }
        "?"
    });

    if let Some(name) = missing {
        return Err(PipelineError::warehouse(format!("Unbound query parameter @{}", name)));
    }
    Ok((rewritten.into_owned(), values))
}

fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(i as f64)),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f64::from(f)),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .unwrap_or(Value::Null)
        }
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        other => Value::String(format!("{:?}", other)),
    }
}

fn placeholder(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Timestamp => "CAST(? AS TIMESTAMP)",
        ColumnType::Date => "CAST(? AS DATE)",
        _ => "?",
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.execute_batch(&sql).map_err(|e| {
                if sql.trim_start().starts_with("BEGIN") {
                    let _ = conn.execute_batch("ROLLBACK");
                }
                PipelineError::warehouse(format!("{}: {}", e, truncate_sql(&sql)))
            })
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>> {
        let (sql, values) = bind_named(sql, params)?;
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PipelineError::warehouse(format!("{}: {}", e, truncate_sql(&sql))))?;
            let mut rows = stmt.query(duckdb::params_from_iter(values.iter())).to_wh_err()?;
            let names: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

            let mut out = Vec::new();
            while let Some(row) = rows.next().to_wh_err()? {
                let mut record = Row::new();
                for (i, name) in names.iter().enumerate() {
                    let value: DuckValue = row.get(i).to_wh_err()?;
                    record.insert(name.clone(), to_json(value));
                }
                out.push(record);
            }
            Ok(out)
        })
        .await
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &TableDef,
        rows: &[Vec<SqlValue>],
        _batch_key: &str,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let width = table.columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(PipelineError::warehouse(format!(
                "Row has {} values, {} expects {}",
                bad.len(),
                table.name,
                width
            )));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.table_ref(dataset, table.name),
            table
                .columns
                .iter()
                .map(|c| self.dialect.ident(c.name))
                .collect::<Vec<_>>()
                .join(", "),
            table
                .columns
                .iter()
                .map(|c| placeholder(c.ty))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = rows.to_vec();

        self.with_conn(move |conn| {
            let tx = conn.transaction().to_wh_err()?;
            {
                let mut stmt = tx.prepare(&sql).to_wh_err()?;
                for row in &rows {
                    stmt.execute(duckdb::params_from_iter(row.iter()))
                        .to_wh_err()?;
                }
            }
            tx.commit().to_wh_err()?;
            Ok(rows.len())
        })
        .await
    }
}

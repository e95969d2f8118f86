//! BigQuery over the REST v2 API (`jobs.query`, `getQueryResults`, `insertAll`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Dialect, QueryParam, Row, SqlValue, TableDef, Warehouse};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;

/// Server-side wait per `jobs.query` / `getQueryResults` call.
const QUERY_TIMEOUT_MS: u64 = 10_000;
/// Rows per `insertAll` request.
const INSERT_CHUNK: usize = 500;
const MAX_POLLS: usize = 360;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryResponse {
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    rows: Vec<TableRow>,
    page_token: Option<String>,
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TableRow {
    f: Vec<Cell>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Cell {
    v: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorProto {
    reason: Option<String>,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InsertAllResponse {
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InsertError {
    index: usize,
    errors: Vec<ErrorProto>,
}

pub struct BigQueryWarehouse {
    client: Client,
    base_url: String,
    project: String,
    location: String,
    auth: Arc<GcpAuth>,
    dialect: Dialect,
}

impl BigQueryWarehouse {
    pub fn new(
        base_url: &str,
        project: impl Into<String>,
        location: impl Into<String>,
        auth: Arc<GcpAuth>,
        user_agent: &str,
    ) -> Result<Self> {
        let project = project.into();
        let location = location.into();
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(QUERY_TIMEOUT_MS + 50_000))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dialect: Dialect::BigQuery {
                project: project.clone(),
                location: location.clone(),
            },
            project,
            location,
            auth,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let token = self.auth.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message")
                .to_string();
            return Err(PipelineError::warehouse(format!(
                "BigQuery HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }
        Ok(body)
    }

    /// Run a statement to completion and collect every result page.
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project);
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.location,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = Value::Array(params.iter().map(query_parameter).collect());
        }

        let mut page: QueryResponse =
            serde_json::from_value(self.send(self.client.post(&url).json(&body)).await?)?;
        check_errors(&page.errors)?;

        let job = page.job_reference.take().ok_or_else(|| {
            PipelineError::warehouse("BigQuery response is missing jobReference")
        })?;
        let location = job.location.clone().unwrap_or_else(|| self.location.clone());
        let results_url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.project, job.job_id
        );

        let mut polls = 0;
        while !page.job_complete {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(PipelineError::warehouse(format!(
                    "BigQuery job {} did not complete",
                    job.job_id
                )));
            }
            page = self.get_results(&results_url, &location, None).await?;
        }

        let schema = page.schema.take().unwrap_or_default();
        let mut rows = convert_rows(&schema, std::mem::take(&mut page.rows));

        while let Some(token) = page.page_token.take() {
            page = self.get_results(&results_url, &location, Some(&token)).await?;
            rows.extend(convert_rows(&schema, std::mem::take(&mut page.rows)));
        }

        Ok(rows)
    }

    async fn get_results(
        &self,
        url: &str,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let timeout = QUERY_TIMEOUT_MS.to_string();
        let mut query: Vec<(&str, &str)> = vec![("location", location), ("timeoutMs", timeout.as_str())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let page: QueryResponse =
            serde_json::from_value(self.send(self.client.get(url).query(&query)).await?)?;
        check_errors(&page.errors)?;
        Ok(page)
    }
}

fn check_errors(errors: &[ErrorProto]) -> Result<()> {
    match errors.first() {
        None => Ok(()),
        Some(e) => Err(PipelineError::warehouse(format!(
            "{} ({})",
            e.message,
            e.reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

fn query_parameter(param: &QueryParam) -> Value {
    let ty = match param.value {
        SqlValue::Null | SqlValue::Text(_) => "STRING",
        SqlValue::Bool(_) => "BOOL",
        SqlValue::Int(_) => "INT64",
        SqlValue::Float(_) => "FLOAT64",
        SqlValue::Timestamp(_) => "TIMESTAMP",
        SqlValue::Date(_) => "DATE",
    };
    let value = match param.value.to_text() {
        Some(v) => json!({ "value": v }),
        None => json!({}),
    };
    json!({
        "name": param.name,
        "parameterType": { "type": ty },
        "parameterValue": value,
    })
}

/// Cells arrive as strings; convert by declared column type.
fn convert_cell(ty: &str, v: Value) -> Value {
    let Value::String(s) = v else {
        return v;
    };
    match ty {
        "INTEGER" | "INT64" => s.parse::<i64>().map(Value::from).unwrap_or(Value::String(s)),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            s.parse::<f64>().map(Value::from).unwrap_or(Value::String(s))
        }
        "BOOLEAN" | "BOOL" => Value::Bool(s.eq_ignore_ascii_case("true")),
        "TIMESTAMP" => s
            .parse::<f64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64))
            .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::String(s)),
        _ => Value::String(s),
    }
}

fn convert_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), convert_cell(&field.ty, cell.v)))
                .collect()
        })
        .collect()
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.run_query(sql, &[]).await.map(|_| ())
    }

    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>> {
        self.run_query(sql, params).await
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &TableDef,
        rows: &[Vec<SqlValue>],
        batch_key: &str,
    ) -> Result<usize> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url, self.project, dataset, table.name
        );

        for (chunk_no, chunk) in rows.chunks(INSERT_CHUNK).enumerate() {
            let payload: Vec<Value> = chunk
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let record: serde_json::Map<String, Value> = table
                        .columns
                        .iter()
                        .zip(row)
                        .filter(|(_, v)| !v.is_null())
                        .map(|(c, v)| (c.name.to_string(), v.to_json()))
                        .collect();
                    json!({
                        "insertId": format!("{}:{}", batch_key, chunk_no * INSERT_CHUNK + i),
                        "json": record,
                    })
                })
                .collect();

            let body = json!({ "rows": payload, "skipInvalidRows": false, "ignoreUnknownValues": false });
            let response: InsertAllResponse =
                serde_json::from_value(self.send(self.client.post(&url).json(&body)).await?)?;

            if let Some(first) = response.insert_errors.first() {
                let detail = first
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                return Err(PipelineError::warehouse(format!(
                    "insertAll into {}.{} rejected {} row(s); row {}: {}",
                    dataset,
                    table.name,
                    response.insert_errors.len(),
                    chunk_no * INSERT_CHUNK + first.index,
                    detail
                )));
            }
        }

        tracing::debug!("Streamed {} rows into {}.{}", rows.len(), dataset, table.name);
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{tables, RowExt};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn warehouse(server: &MockServer) -> BigQueryWarehouse {
        BigQueryWarehouse::new(
            &server.uri(),
            "proj",
            "US",
            Arc::new(GcpAuth::static_token("tok")),
            "ytpipe-test",
        )
        .unwrap()
    }

    #[test]
    fn test_convert_cell() {
        assert_eq!(convert_cell("INTEGER", json!("42")), json!(42));
        assert_eq!(convert_cell("BOOLEAN", json!("true")), json!(true));
        assert_eq!(
            convert_cell("TIMESTAMP", json!("1.7356896E9")),
            json!("2025-01-01T00:00:00Z")
        );
        assert_eq!(convert_cell("STRING", Value::Null), Value::Null);
    }

    #[tokio::test]
    async fn test_query_polls_and_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .and(body_partial_json(json!({
                "parameterMode": "NAMED",
                "queryParameters": [{
                    "name": "since",
                    "parameterType": {"type": "DATE"},
                    "parameterValue": {"value": "2025-01-01"}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": false,
                "jobReference": {"projectId": "proj", "jobId": "job1", "location": "US"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/proj/queries/job1"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "views", "type": "INTEGER"}]},
                "rows": [{"f": [{"v": "2"}]}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/proj/queries/job1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "views", "type": "INTEGER"}]},
                "rows": [{"f": [{"v": "1"}]}],
                "pageToken": "p2"
            })))
            .mount(&server)
            .await;

        let rows = warehouse(&server)
            .query(
                "SELECT views FROM t WHERE date >= @since",
                &[QueryParam::new(
                    "since",
                    SqlValue::Date(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
                )],
            )
            .await
            .unwrap();
        let views: Vec<i64> = rows.iter().map(|r| r.int("views")).collect();
        assert_eq!(views, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_query_error_is_warehouse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "Syntax error: Unexpected keyword"}
            })))
            .mount(&server)
            .await;

        let err = warehouse(&server).execute("MERGE nonsense").await.unwrap_err();
        assert!(matches!(err, PipelineError::Warehouse(_)));
        assert!(err.to_string().contains("Syntax error"));
    }

    #[tokio::test]
    async fn test_insert_all_uses_insert_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/datasets/youtube_raw/tables/categories/insertAll"))
            .and(body_partial_json(json!({
                "rows": [{"insertId": "run-1:categories:0", "json": {"category_id": "10"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "bigquery#tableDataInsertAllResponse"})))
            .expect(1)
            .mount(&server)
            .await;

        let table = tables::raw_table(crate::models::ExtractTable::Categories);
        let row = vec![
            SqlValue::text("10"),
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::text("US"),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::text("run-1"),
        ];
        let n = warehouse(&server)
            .insert_rows("youtube_raw", &table, &[row], "run-1:categories")
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_insert_errors_fail_the_load() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "insertErrors": [{"index": 0, "errors": [{"reason": "invalid", "message": "no such field"}]}]
            })))
            .mount(&server)
            .await;

        let table = tables::raw_table(crate::models::ExtractTable::Categories);
        let row = vec![SqlValue::Null; table.columns.len()];
        let err = warehouse(&server)
            .insert_rows("youtube_raw", &table, &[row], "k")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such field"));
    }
}

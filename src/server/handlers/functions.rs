//! Pipeline stage endpoints.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use super::payload::{respond, Payload};
use crate::error::Result;
use crate::models::{parse_logical_date, ExtractTable, RunId};
use crate::pipeline::extract::{BatchRequest, TableRequest};
use crate::server::AppState;

type Params = Query<HashMap<String, String>>;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn raw_schema(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = state
        .pipeline
        .raw_schema(payload.flag("drop_existing"))
        .await;
    respond("Schema created/verified successfully", result)
}

fn batch_request(state: &AppState, payload: &Payload) -> Result<BatchRequest> {
    let mut request = BatchRequest::from_settings(&state.pipeline.settings().youtube);
    if let Some(query) = payload.str("query") {
        request.query = query;
    }
    if let Some(max_results) = payload.usize("max_results")? {
        request.max_results = max_results;
    }
    if let Some(region) = payload.str("region_code") {
        request.region_code = region;
    }
    if let Some(order) = payload.str("order") {
        request.order = order;
    }
    Ok(request)
}

pub async fn raw_extract(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = async {
        let request = batch_request(&state, &payload)?;
        let run_id = RunId::parse_or_generate(payload.str("run_id").as_deref())?;
        let date = match payload.str("date") {
            Some(raw) => parse_logical_date(&raw)?,
            None => Utc::now().date_naive(),
        };
        state.pipeline.raw_extract(request, run_id, date).await
    }
    .await;
    respond("Extraction staged", result)
}

pub async fn raw_parse(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = async {
        let blob_name = payload.require("blob_name")?;
        let run_id = RunId::parse(&payload.require("run_id")?)?;
        let bucket = payload.str("bucket_name");
        state
            .pipeline
            .raw_parse(&blob_name, run_id, bucket.as_deref())
            .await
    }
    .await;
    respond("Data loaded successfully", result)
}

pub async fn raw_transform(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = async {
        let date = payload.str("date").map(|d| parse_logical_date(&d)).transpose()?;
        state.pipeline.raw_transform(date).await
    }
    .await;
    respond("Incremental transformations completed successfully", result)
}

pub async fn yt_extract(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = async {
        let table = ExtractTable::parse(&payload.require("table")?.to_ascii_lowercase())?;
        let mut request = TableRequest::new(table, &state.pipeline.settings().youtube);
        request.query = payload.str("query");
        request.video_ids = payload.list("video_ids");
        request.channel_ids = payload.list("channel_id");
        if let Some(region) = payload.str("region_code") {
            request.region_code = region;
        }
        if let Some(max_results) = payload.usize("max_results")? {
            request.max_results = max_results;
        }
        let run_id = RunId::parse_or_generate(payload.str("run_id").as_deref())?;
        state.pipeline.yt_extract(request, run_id).await
    }
    .await;
    respond("extract ok", result)
}

pub async fn yt_ingest(State(state): State<AppState>, Query(query): Params, body: Bytes) -> Response {
    let payload = Payload::from_parts(query, &body);
    let result = async {
        let table = ExtractTable::parse(&payload.require("table")?.to_ascii_lowercase())?;
        let run_id = RunId::parse(&payload.require("run_id")?)?;
        state.pipeline.yt_ingest(table, run_id).await
    }
    .await;
    let message = match payload.str("table") {
        Some(table) => format!("ingest ok: {}", table),
        None => "ingest ok".to_string(),
    };
    respond(&message, result)
}

//! Request payloads and response envelopes shared by the function endpoints.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{PipelineError, Result};

/// Merged request parameters: JSON body fields overridden by query parameters.
///
/// A body that is not a JSON object counts as empty.
#[derive(Debug, Clone, Default)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn from_parts(query: HashMap<String, String>, body: &Bytes) -> Self {
        let mut fields = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (key, value) in query {
            fields.insert(key, Value::String(value));
        }
        Payload(fields)
    }

    /// String value; numbers and booleans are rendered, blanks are absent.
    pub fn str(&self, key: &str) -> Option<String> {
        let value = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.str(key)
            .ok_or_else(|| PipelineError::invalid(format!("Missing required parameter: {}", key)))
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }
            _ => false,
        }
    }

    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.str(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
                PipelineError::invalid(format!("{} must be a non-negative integer", key))
            }),
        }
    }

    /// Id list given as a JSON array or a comma-separated string.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect(),
            _ => self
                .str(key)
                .map(|raw| crate::pipeline::extract::split_ids(&raw))
                .unwrap_or_default(),
        }
    }
}

/// `{"status": "success", "message": ..., <result fields>}` with 200.
pub fn success(message: &str, result: impl Serialize) -> Response {
    match serde_json::to_value(result) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("status".into(), json!("success"));
            fields.insert("message".into(), json!(message));
            (StatusCode::OK, Json(Value::Object(fields))).into_response()
        }
        Ok(other) => (
            StatusCode::OK,
            Json(json!({"status": "success", "message": message, "result": other})),
        )
            .into_response(),
        Err(e) => failure(PipelineError::from(e)),
    }
}

/// Error envelope: 400 for request errors, 500 for everything else.
pub fn failure(err: PipelineError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!("Request failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(json!({"status": "error", "error": err.to_string()})),
    )
        .into_response()
}

/// Collapse a stage result into its response.
pub fn respond<T: Serialize>(message: &str, result: Result<T>) -> Response {
    match result {
        Ok(value) => success(message, value),
        Err(e) => failure(e),
    }
}

//! Error types shared by every pipeline stage.

use thiserror::Error;

/// Errors raised by the pipeline library.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller sent an unusable payload (HTTP 400).
    #[error("{0}")]
    InvalidRequest(String),

    /// The YouTube Data API answered with a non-success status.
    #[error("YouTube API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// Transport-level HTTP failure (connect, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Secret '{name}' unavailable: {message}")]
    Secret { name: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

impl PipelineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PipelineError::InvalidRequest(message.into())
    }

    pub fn warehouse(message: impl std::fmt::Display) -> Self {
        PipelineError::Warehouse(message.to_string())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        PipelineError::Storage(message.to_string())
    }

    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidRequest(_))
    }

    /// Transport failures are raised out of extraction so the caller can retry.
    /// Everything the API itself answered with degrades to an empty result.
    pub fn is_transport(&self) -> bool {
        matches!(self, PipelineError::Http(e) if !e.is_decode() && !e.is_status())
    }

    /// API error reason code, e.g. `commentsDisabled` or `quotaExceeded`.
    pub fn api_reason(&self) -> Option<&str> {
        match self {
            PipelineError::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

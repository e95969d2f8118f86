//! Calls to the function endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Invokes one function endpoint with a JSON payload.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, url: &str, payload: &Value) -> Result<Value>;
}

/// POSTs JSON over HTTP and fails on any non-2xx answer.
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, url: &str, payload: &Value) -> Result<Value> {
        debug!("POST {} {}", url, payload);
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PipelineError::Connection(format!(
                "{} returned HTTP {}: {}",
                url,
                status.as_u16(),
                body.trim()
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

//! Bearer tokens for Google Cloud REST APIs.
//!
//! Either a static token (`GCP_ACCESS_TOKEN`, e.g. from
//! `gcloud auth print-access-token`) or the instance metadata server.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the metadata token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum TokenSource {
    Static(String),
    Metadata { url: String },
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Token provider shared by storage, warehouse and secret clients.
#[derive(Debug)]
pub struct GcpAuth {
    client: Client,
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl GcpAuth {
    /// Static token when given, metadata server otherwise.
    pub fn new(static_token: Option<String>) -> Self {
        match static_token.filter(|t| !t.is_empty()) {
            Some(token) => Self::static_token(token),
            None => Self::metadata(METADATA_TOKEN_URL),
        }
    }

    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            source: TokenSource::Static(token.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn metadata(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            source: TokenSource::Metadata { url: url.into() },
            cached: Mutex::new(None),
        }
    }

    /// Current access token, refreshed from the metadata server when stale.
    pub async fn token(&self) -> Result<String> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url } => url,
        };

        let mut cached = self.cached.lock().await;
        if let Some(ref token) = *cached {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| PipelineError::Auth(format!("Metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Auth(format!(
                "Metadata server returned HTTP {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| PipelineError::Auth(format!("Invalid metadata token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!("Refreshed GCP access token (valid {}s)", lifetime.as_secs());
        Ok(token.access_token)
    }
}

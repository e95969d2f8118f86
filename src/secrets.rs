//! Secret lookup: environment variables locally, Secret Manager in GCP.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::config::{SecretsBackend, Settings};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;

pub const SECRET_MANAGER_BASE: &str = "https://secretmanager.googleapis.com/v1";

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve a secret to its UTF-8 value.
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// Reads secrets from process environment variables.
///
/// The name is tried verbatim, then upper-snake-cased
/// (`youtube-api-key` resolves `YOUTUBE_API_KEY`).
#[derive(Debug, Default, Clone)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let candidates = [name.to_string(), env_key(name)];
        candidates
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| PipelineError::Secret {
                name: name.to_string(),
                message: "not set in environment".to_string(),
            })
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Fixed secrets, used by tests and embedded callers.
#[derive(Debug, Default, Clone)]
pub struct MemorySecretStore(HashMap<String, String>);

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        self.0.get(name).cloned().ok_or_else(|| PipelineError::Secret {
            name: name.to_string(),
            message: "not configured".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Google Secret Manager `versions/<v>:access`.
pub struct GcpSecretManager {
    client: Client,
    base_url: String,
    project_id: String,
    version: String,
    auth: Arc<GcpAuth>,
}

impl GcpSecretManager {
    pub fn new(
        base_url: &str,
        project_id: impl Into<String>,
        version: impl Into<String>,
        auth: Arc<GcpAuth>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            version: version.into(),
            auth,
        }
    }

    fn fail(name: &str, message: impl std::fmt::Display) -> PipelineError {
        PipelineError::Secret {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/{}:access",
            self.base_url, self.project_id, name, self.version
        );
        let token = self.auth.token().await.map_err(|e| Self::fail(name, e))?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Self::fail(name, e))?;

        if !response.status().is_success() {
            return Err(Self::fail(name, format!("HTTP {}", response.status())));
        }

        let body: AccessResponse = response.json().await.map_err(|e| Self::fail(name, e))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|e| Self::fail(name, format!("invalid payload encoding: {}", e)))?;
        let value = String::from_utf8(bytes).map_err(|e| Self::fail(name, e))?;
        Ok(value.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Build the configured secret store.
pub fn from_settings(settings: &Settings, auth: Arc<GcpAuth>) -> Result<Arc<dyn SecretStore>> {
    match settings.secrets.backend {
        SecretsBackend::Env => Ok(Arc::new(EnvSecretStore)),
        SecretsBackend::Gcp => {
            let project = settings
                .secrets
                .project_id
                .clone()
                .or_else(|| settings.warehouse.project_id.clone())
                .ok_or_else(|| {
                    PipelineError::Config(
                        "Secret Manager needs a project (set GCP_PROJECT)".to_string(),
                    )
                })?;
            Ok(Arc::new(GcpSecretManager::new(
                &settings.secrets.base_url,
                project,
                settings.secrets.version.clone(),
                auth,
            )))
        }
    }
}

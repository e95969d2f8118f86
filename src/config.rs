//! Configuration management for ytpipe.
//!
//! Settings start from defaults, are overlaid by an optional config file
//! (TOML, YAML or JSON by extension, discovered with the prefer crate) and
//! finally by environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::youtube::CommentScope;

/// Default run ledger filename.
pub const DEFAULT_LEDGER_FILENAME: &str = "ytpipe.db";

/// Warehouse engine used for raw and staging tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    DuckDb,
    BigQuery,
}

impl WarehouseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseBackend::DuckDb => "duckdb",
            WarehouseBackend::BigQuery => "bigquery",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" | "motherduck" => Some(WarehouseBackend::DuckDb),
            "bigquery" | "bq" => Some(WarehouseBackend::BigQuery),
            _ => None,
        }
    }
}

/// Where staged extraction documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Gcs,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::Gcs => "gcs",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "file" => Some(StorageBackend::Local),
            "gcs" => Some(StorageBackend::Gcs),
            _ => None,
        }
    }
}

/// Source of secret values (API key, warehouse token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretsBackend {
    #[default]
    Env,
    Gcp,
}

impl SecretsBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretsBackend::Env => "env",
            SecretsBackend::Gcp => "gcp",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "env" => Some(SecretsBackend::Env),
            "gcp" | "secretmanager" => Some(SecretsBackend::Gcp),
            _ => None,
        }
    }
}

/// YouTube Data API settings.
#[derive(Debug, Clone)]
pub struct YoutubeSettings {
    pub api_base: String,
    /// Secret name holding the API key.
    pub api_key_secret: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub default_query: String,
    /// Video ceiling for combined extraction.
    pub max_results: u32,
    /// Row ceiling for single-table extraction.
    pub table_max_results: u32,
    pub region_code: String,
    pub search_order: String,
    pub comment_limit: u32,
    pub comment_scope: CommentScope,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_base: crate::youtube::API_BASE.to_string(),
            api_key_secret: "YOUTUBE_API_KEY".to_string(),
            request_timeout: 30,
            default_query: "data engineering".to_string(),
            max_results: 50,
            table_max_results: 25,
            region_code: "US".to_string(),
            search_order: "relevance".to_string(),
            comment_limit: 50,
            comment_scope: CommentScope::default(),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    /// Root directory of the local backend.
    pub local_root: PathBuf,
    pub gcs_base_url: String,
}

/// Warehouse settings.
#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub backend: WarehouseBackend,
    pub project_id: Option<String>,
    pub location: String,
    pub raw_dataset: String,
    pub staging_dataset: String,
    /// File path, `:memory:` or an `md:` URL.
    pub duckdb_path: String,
    /// Secret name holding the connection token for `md:` URLs.
    pub token_secret: Option<String>,
    pub bigquery_base_url: String,
}

/// Secret store settings.
#[derive(Debug, Clone)]
pub struct SecretSettings {
    pub backend: SecretsBackend,
    pub project_id: Option<String>,
    pub version: String,
    pub base_url: String,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            backend: SecretsBackend::Env,
            project_id: None,
            version: "latest".to_string(),
            base_url: crate::secrets::SECRET_MANAGER_BASE.to_string(),
        }
    }
}

/// Orchestrator settings (DAG sequencing and retry policy).
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Base URL of the function endpoints (`/raw-schema`, `/raw-extract`, ...).
    pub functions_url: String,
    /// Golden enrichment endpoint. The golden DAG is skipped when unset.
    pub golden_url: Option<String>,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub poke_interval_secs: u64,
    pub sensor_timeout_secs: u64,
    /// Per-call timeout for function invocations.
    pub request_timeout: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            functions_url: "http://127.0.0.1:3030".to_string(),
            golden_url: None,
            retries: 2,
            retry_delay_secs: 300,
            poke_interval_secs: 300,
            sensor_timeout_secs: 3 * 60 * 60,
            request_timeout: 540,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Default bind address for `serve`: PORT, HOST or HOST:PORT.
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3030".to_string(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (run ledger, local objects, DuckDB file).
    pub data_dir: PathBuf,
    /// Run ledger URL (overrides data_dir/ytpipe.db if set).
    pub database_url: Option<String>,
    pub user_agent: String,
    pub youtube: YoutubeSettings,
    pub storage: StorageSettings,
    pub warehouse: WarehouseSettings,
    pub secrets: SecretSettings,
    /// Static bearer token for GCP REST calls; metadata server when unset.
    pub gcp_access_token: Option<String>,
    pub orchestrator: OrchestratorSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ytpipe");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            storage: StorageSettings {
                backend: StorageBackend::Local,
                bucket: None,
                local_root: data_dir.join("objects"),
                gcs_base_url: crate::storage::GCS_BASE.to_string(),
            },
            warehouse: WarehouseSettings {
                backend: WarehouseBackend::DuckDb,
                project_id: None,
                location: "US".to_string(),
                raw_dataset: "youtube_raw".to_string(),
                staging_dataset: "youtube_staging".to_string(),
                duckdb_path: data_dir.join("warehouse.duckdb").display().to_string(),
                token_secret: None,
                bigquery_base_url: crate::warehouse::BIGQUERY_BASE.to_string(),
            },
            data_dir,
            database_url: None,
            user_agent: format!("ytpipe/{}", env!("CARGO_PKG_VERSION")),
            youtube: YoutubeSettings::default(),
            secrets: SecretSettings::default(),
            gcp_access_token: None,
            orchestrator: OrchestratorSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Run ledger URL, constructed from the data directory if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!(
                "sqlite:{}",
                self.data_dir.join(DEFAULT_LEDGER_FILENAME).display()
            ),
        }
    }

    /// Bucket name, required by every stage that touches object storage.
    pub fn bucket(&self) -> Result<&str> {
        self.storage
            .bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                PipelineError::Config(
                    "Missing bucket name (set RAW_BUCKET or storage.bucket)".to_string(),
                )
            })
    }

    /// Move to another data directory. Paths still at their data-dir default
    /// follow it; explicitly configured paths are kept.
    pub fn rebase_data_dir(&mut self, data_dir: PathBuf) {
        let current = Settings::with_data_dir(self.data_dir.clone());
        let rebased = Settings::with_data_dir(data_dir);
        if self.storage.local_root == current.storage.local_root {
            self.storage.local_root = rebased.storage.local_root;
        }
        if self.warehouse.duckdb_path == current.warehouse.duckdb_path {
            self.warehouse.duckdb_path = rebased.warehouse.duckdb_path;
        }
        self.data_dir = rebased.data_dir;
    }

    /// Ensure the data directory and local object root exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;
        if self.storage.backend == StorageBackend::Local {
            fs::create_dir_all(&self.storage.local_root)?;
        }
        Ok(())
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = get("RAW_BUCKET").or_else(|| get("BUCKET_NAME")) {
            self.storage.bucket = Some(bucket);
        }
        if let Some(project) = get("GCP_PROJECT").or_else(|| get("GOOGLE_CLOUD_PROJECT")) {
            self.warehouse.project_id = Some(project.clone());
            self.secrets.project_id.get_or_insert(project);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(base) = get("YOUTUBE_API_BASE") {
            self.youtube.api_base = base;
        }
        if let Some(value) = get("YTPIPE_WAREHOUSE") {
            match WarehouseBackend::from_str(&value) {
                Some(backend) => self.warehouse.backend = backend,
                None => tracing::warn!("Ignoring unknown YTPIPE_WAREHOUSE '{}'", value),
            }
        }
        if let Some(path) = get("YTPIPE_DUCKDB_PATH") {
            self.warehouse.duckdb_path = path;
        }
        if let Some(value) = get("YTPIPE_STORAGE") {
            match StorageBackend::from_str(&value) {
                Some(backend) => self.storage.backend = backend,
                None => tracing::warn!("Ignoring unknown YTPIPE_STORAGE '{}'", value),
            }
        }
        if let Some(value) = get("YTPIPE_SECRETS") {
            match SecretsBackend::from_str(&value) {
                Some(backend) => self.secrets.backend = backend,
                None => tracing::warn!("Ignoring unknown YTPIPE_SECRETS '{}'", value),
            }
        }
        if let Some(token) = get("GCP_ACCESS_TOKEN") {
            self.gcp_access_token = Some(token);
        }
        if let Some(url) = get("YTPIPE_FUNCTIONS_URL") {
            self.orchestrator.functions_url = url;
        }
        if let Some(url) = get("YTPIPE_GOLDEN_URL") {
            self.orchestrator.golden_url = Some(url);
        }
    }
}

/// `[youtube]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_base: Option<String>,
    pub api_key_secret: Option<String>,
    pub request_timeout: Option<u64>,
    pub default_query: Option<String>,
    pub max_results: Option<u32>,
    pub table_max_results: Option<u32>,
    pub region_code: Option<String>,
    pub search_order: Option<String>,
    pub comment_limit: Option<u32>,
    pub comment_scope: Option<CommentScope>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Option<StorageBackend>,
    pub bucket: Option<String>,
    pub local_root: Option<String>,
}

/// `[warehouse]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub backend: Option<WarehouseBackend>,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub raw_dataset: Option<String>,
    pub staging_dataset: Option<String>,
    pub duckdb_path: Option<String>,
    pub token_secret: Option<String>,
}

/// `[secrets]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: Option<SecretsBackend>,
    pub project_id: Option<String>,
    pub version: Option<String>,
}

/// `[orchestrator]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub functions_url: Option<String>,
    pub golden_url: Option<String>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub poke_interval_secs: Option<u64>,
    pub sensor_timeout_secs: Option<u64>,
    pub request_timeout: Option<u64>,
}

/// `[gcp]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Static bearer token; the metadata server is used when unset.
    pub access_token: Option<String>,
}

/// `[server]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<String>,
    pub database_url: Option<String>,
    pub user_agent: Option<String>,
    pub youtube: YoutubeConfig,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub secrets: SecretsConfig,
    pub orchestrator: OrchestratorConfig,
    pub gcp: GcpConfig,
    pub server: ServerConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// The format is chosen from the file extension (JSON when unknown).
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the given format.
    pub fn parse(contents: &str, ext: &str) -> Result<Self> {
        let config: Config = match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| PipelineError::Config(format!("Failed to parse TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| PipelineError::Config(format!("Failed to parse YAML config: {}", e)))?,
            _ => serde_json::from_str(contents)
                .map_err(|e| PipelineError::Config(format!("Failed to parse JSON config: {}", e)))?,
        };
        Ok(config)
    }

    /// Locate a `ytpipe` config file through prefer's standard search paths.
    pub async fn discover() -> Option<PathBuf> {
        match prefer::load("ytpipe").await {
            Ok(found) => found.source_path().map(|p| p.to_path_buf()),
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                None
            }
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path that may be relative to the config file.
    /// Paths starting with ~ are expanded.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        let base_dir = self.base_dir();

        if let Some(ref data_dir) = self.data_dir {
            settings.rebase_data_dir(self.resolve_path(data_dir, &base_dir));
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref ua) = self.user_agent {
            settings.user_agent = ua.clone();
        }

        let yt = &self.youtube;
        let s = &mut settings.youtube;
        if let Some(ref v) = yt.api_base {
            s.api_base = v.clone();
        }
        if let Some(ref v) = yt.api_key_secret {
            s.api_key_secret = v.clone();
        }
        if let Some(v) = yt.request_timeout {
            s.request_timeout = v;
        }
        if let Some(ref v) = yt.default_query {
            s.default_query = v.clone();
        }
        if let Some(v) = yt.max_results {
            s.max_results = v;
        }
        if let Some(v) = yt.table_max_results {
            s.table_max_results = v;
        }
        if let Some(ref v) = yt.region_code {
            s.region_code = v.clone();
        }
        if let Some(ref v) = yt.search_order {
            s.search_order = v.clone();
        }
        if let Some(v) = yt.comment_limit {
            s.comment_limit = v;
        }
        if let Some(v) = yt.comment_scope {
            s.comment_scope = v;
        }

        if let Some(v) = self.storage.backend {
            settings.storage.backend = v;
        }
        if let Some(ref v) = self.storage.bucket {
            settings.storage.bucket = Some(v.clone());
        }
        if let Some(ref v) = self.storage.local_root {
            settings.storage.local_root = self.resolve_path(v, &base_dir);
        }

        let wh = &self.warehouse;
        let w = &mut settings.warehouse;
        if let Some(v) = wh.backend {
            w.backend = v;
        }
        if let Some(ref v) = wh.project_id {
            w.project_id = Some(v.clone());
        }
        if let Some(ref v) = wh.location {
            w.location = v.clone();
        }
        if let Some(ref v) = wh.raw_dataset {
            w.raw_dataset = v.clone();
        }
        if let Some(ref v) = wh.staging_dataset {
            w.staging_dataset = v.clone();
        }
        if let Some(ref v) = wh.duckdb_path {
            w.duckdb_path = if v == ":memory:" || v.starts_with("md:") {
                v.clone()
            } else {
                self.resolve_path(v, &base_dir).display().to_string()
            };
        }
        if let Some(ref v) = wh.token_secret {
            w.token_secret = Some(v.clone());
        }

        if let Some(v) = self.secrets.backend {
            settings.secrets.backend = v;
        }
        if let Some(ref v) = self.secrets.project_id {
            settings.secrets.project_id = Some(v.clone());
        }
        if let Some(ref v) = self.secrets.version {
            settings.secrets.version = v.clone();
        }

        let oc = &self.orchestrator;
        let o = &mut settings.orchestrator;
        if let Some(ref v) = oc.functions_url {
            o.functions_url = v.clone();
        }
        if let Some(ref v) = oc.golden_url {
            o.golden_url = Some(v.clone());
        }
        if let Some(v) = oc.retries {
            o.retries = v;
        }
        if let Some(v) = oc.retry_delay_secs {
            o.retry_delay_secs = v;
        }
        if let Some(v) = oc.poke_interval_secs {
            o.poke_interval_secs = v;
        }
        if let Some(v) = oc.sensor_timeout_secs {
            o.sensor_timeout_secs = v;
        }
        if let Some(v) = oc.request_timeout {
            o.request_timeout = v;
        }

        if let Some(ref v) = self.gcp.access_token {
            settings.gcp_access_token = Some(v.clone());
        }
        if let Some(ref v) = self.server.bind {
            settings.server.bind = v.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

/// Load settings: defaults, then config file, then environment.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<Settings> {
    let mut settings = Settings::default();

    let config_path = match options.config_path {
        Some(path) => Some(path),
        None => Config::discover().await,
    };
    if let Some(path) = config_path {
        tracing::debug!("Loading config from {}", path.display());
        let config = Config::load_from_path(&path).await?;
        config.apply_to_settings(&mut settings);
    }

    if let Some(data_dir) = options.data_dir {
        settings.rebase_data_dir(data_dir);
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

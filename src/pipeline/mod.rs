//! Pipeline stages and the context that wires them to their backends.
//!
//! [`Pipeline`] is the primary entry point for every stage. It holds the
//! settings and lazily opens the YouTube client, the object store and the
//! warehouse the first time a stage needs them; handles are then reused for
//! the lifetime of the process.
//!
//! # Example
//! ```ignore
//! let pipeline = Pipeline::new(settings)?;
//! let report = pipeline.raw_schema(false).await?;
//! ```

pub mod extract;
pub mod ingest;
pub mod schema;
pub mod stage;
pub mod transform;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::Settings;
use crate::dashboard::{self, Dashboard, DashboardFilter};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;
use crate::models::{ExtractTable, RunId};
use crate::secrets::{self, SecretStore};
use crate::storage::{self, ObjectStore};
use crate::warehouse::{self, Warehouse};
use crate::youtube::YoutubeClient;

use extract::{BatchRequest, TableRequest};
use ingest::{TableIngest, TableLoad};
use schema::TableStatus;
use transform::TransformOutcome;

/// Result of `raw-schema`.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub engine: &'static str,
    pub project: Option<String>,
    pub dataset: String,
    pub tables: Vec<TableStatus>,
    pub drop_existing: bool,
}

/// Result of `raw-extract`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchExtract {
    pub run_id: RunId,
    pub query: String,
    pub bucket_name: String,
    pub blob_name: String,
    pub uri: String,
    pub counts: BTreeMap<&'static str, usize>,
}

/// Result of `raw-parse`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchLoad {
    pub dataset: String,
    pub run_id: RunId,
    pub source_path: String,
    pub tables: Vec<TableLoad>,
}

/// Result of `yt-extract`.
#[derive(Debug, Clone, Serialize)]
pub struct TableExtract {
    pub table: String,
    pub count: usize,
    pub gcs_uri: String,
    pub run_id: RunId,
}

/// Everything `run` did, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub schema: SchemaReport,
    pub extract: BatchExtract,
    pub load: BatchLoad,
    pub transform: TransformOutcome,
}

/// Shared stage context.
pub struct Pipeline {
    settings: Arc<Settings>,
    auth: Arc<GcpAuth>,
    secrets: Arc<dyn SecretStore>,
    youtube: OnceCell<YoutubeClient>,
    store: OnceCell<Arc<dyn ObjectStore>>,
    warehouse: OnceCell<Arc<dyn Warehouse>>,
}

impl Pipeline {
    /// Create a context; backends are opened on first use.
    pub fn new(settings: Settings) -> Result<Self> {
        let auth = Arc::new(GcpAuth::new(settings.gcp_access_token.clone()));
        let secrets = secrets::from_settings(&settings, auth.clone())?;
        Ok(Self {
            settings: Arc::new(settings),
            auth,
            secrets,
            youtube: OnceCell::new(),
            store: OnceCell::new(),
            warehouse: OnceCell::new(),
        })
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_youtube(mut self, client: YoutubeClient) -> Self {
        self.youtube = OnceCell::from(client);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = OnceCell::from(store);
        self
    }

    pub fn with_warehouse(mut self, warehouse: Arc<dyn Warehouse>) -> Self {
        self.warehouse = OnceCell::from(warehouse);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// YouTube client; the API key is read from the secret store once.
    pub async fn youtube(&self) -> Result<&YoutubeClient> {
        self.youtube
            .get_or_try_init(|| async {
                let yt = &self.settings.youtube;
                let api_key = self.secrets.get_secret(&yt.api_key_secret).await?;
                YoutubeClient::new(
                    api_key,
                    yt.api_base.clone(),
                    Duration::from_secs(yt.request_timeout),
                    &self.settings.user_agent,
                )
            })
            .await
    }

    pub async fn store(&self) -> Result<&Arc<dyn ObjectStore>> {
        self.store
            .get_or_try_init(|| async { storage::from_settings(&self.settings, self.auth.clone()) })
            .await
    }

    pub async fn warehouse(&self) -> Result<&Arc<dyn Warehouse>> {
        self.warehouse
            .get_or_try_init(|| async {
                warehouse::connect(&self.settings, self.secrets.as_ref(), self.auth.clone()).await
            })
            .await
    }

    fn raw_dataset(&self) -> &str {
        &self.settings.warehouse.raw_dataset
    }

    fn staging_dataset(&self) -> &str {
        &self.settings.warehouse.staging_dataset
    }

    /// Create (or recreate) the raw tables.
    pub async fn raw_schema(&self, drop_existing: bool) -> Result<SchemaReport> {
        let warehouse = self.warehouse().await?;
        let tables = schema::init_raw_schema(warehouse.as_ref(), self.raw_dataset(), drop_existing).await;
        Ok(SchemaReport {
            engine: warehouse.dialect().name(),
            project: self.settings.warehouse.project_id.clone(),
            dataset: self.raw_dataset().to_string(),
            tables,
            drop_existing,
        })
    }

    /// Combined extraction staged as one JSON document.
    pub async fn raw_extract(
        &self,
        request: BatchRequest,
        run_id: RunId,
        date: NaiveDate,
    ) -> Result<BatchExtract> {
        let request = request.validate()?;
        let store = self.store().await?;
        let client = self.youtube().await?;

        info!("Extracting '{}' (run {})", request.query, run_id);
        let batch = extract::extract_batch(client, &request).await?;
        let staged = stage::stage_batch(store.as_ref(), &batch, &run_id, date).await?;

        Ok(BatchExtract {
            run_id,
            query: request.query,
            bucket_name: staged.bucket_name,
            blob_name: staged.blob_name,
            uri: staged.uri,
            counts: batch.counts().into_iter().collect(),
        })
    }

    /// Load a staged batch document into the raw tables.
    pub async fn raw_parse(
        &self,
        blob_name: &str,
        run_id: RunId,
        bucket_name: Option<&str>,
    ) -> Result<BatchLoad> {
        let store = self.store().await?;
        if let Some(bucket) = bucket_name.filter(|b| !b.is_empty()) {
            if bucket != store.bucket() {
                return Err(PipelineError::invalid(format!(
                    "bucket_name '{}' does not match the configured bucket '{}'",
                    bucket,
                    store.bucket()
                )));
            }
        }
        let warehouse = self.warehouse().await?;

        let tables = ingest::load_batch(
            warehouse.as_ref(),
            store.as_ref(),
            self.raw_dataset(),
            blob_name,
            &run_id,
        )
        .await?;

        Ok(BatchLoad {
            dataset: self.raw_dataset().to_string(),
            source_path: store.uri(blob_name),
            run_id,
            tables,
        })
    }

    /// Single-table extraction staged as JSON Lines.
    pub async fn yt_extract(&self, request: TableRequest, run_id: RunId) -> Result<TableExtract> {
        let request = request.validate()?;
        let store = self.store().await?;
        let client = self.youtube().await?;

        let rows = extract::extract_table(client, &request).await?;
        let staged = stage::stage_table(store.as_ref(), &rows, &run_id).await?;

        Ok(TableExtract {
            table: request.table.as_str().to_string(),
            count: staged.count,
            gcs_uri: staged.uri,
            run_id,
        })
    }

    /// Load one staged table into its raw table.
    pub async fn yt_ingest(&self, table: ExtractTable, run_id: RunId) -> Result<TableIngest> {
        let store = self.store().await?;
        let warehouse = self.warehouse().await?;
        let dialect = warehouse.dialect();
        warehouse
            .execute(&dialect.create_schema(self.raw_dataset()))
            .await?;
        warehouse
            .execute(&dialect.create_table(
                self.raw_dataset(),
                &warehouse::tables::raw_table(table),
            ))
            .await?;

        ingest::load_table(
            warehouse.as_ref(),
            store.as_ref(),
            self.raw_dataset(),
            table,
            &run_id,
        )
        .await
    }

    /// Upsert raw rows into the dimension and fact tables.
    pub async fn raw_transform(&self, date: Option<NaiveDate>) -> Result<TransformOutcome> {
        let warehouse = self.warehouse().await?;
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        transform::run_transform(
            warehouse.as_ref(),
            self.raw_dataset(),
            self.staging_dataset(),
            date,
        )
        .await
    }

    pub async fn dashboard(&self, filter: &DashboardFilter) -> Result<Dashboard> {
        let warehouse = self.warehouse().await?;
        Ok(dashboard::load_dashboard(
            warehouse.as_ref(),
            self.staging_dataset(),
            filter,
            Utc::now().date_naive(),
        )
        .await)
    }

    /// Schema, extract, load and transform in one process.
    pub async fn run(&self, request: BatchRequest, run_id: RunId) -> Result<RunSummary> {
        let today = Utc::now().date_naive();
        let schema = self.raw_schema(false).await?;
        let extract = self.raw_extract(request, run_id.clone(), today).await?;
        let load = self.raw_parse(&extract.blob_name, run_id, None).await?;
        let transform = self.raw_transform(Some(today)).await?;
        Ok(RunSummary {
            schema,
            extract,
            load,
            transform,
        })
    }
}

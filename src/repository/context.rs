//! Ledger context for managing connections and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::pool::{DbError, SqlitePool};
use super::runs::RunRepository;

/// Entry point for run ledger access.
///
/// # Example
/// ```ignore
/// let ctx = LedgerContext::from_url(&settings.database_url());
/// ctx.init_schema().await?;
/// let runs = ctx.runs().recent_dag_runs(20).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LedgerContext {
    pool: SqlitePool,
}

impl LedgerContext {
    /// Create a context from a path or `sqlite:` URL.
    pub fn from_url(url: &str) -> Self {
        Self {
            pool: SqlitePool::new(url),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            pool: SqlitePool::from_path(path),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn runs(&self) -> RunRepository {
        RunRepository::new(self.pool.clone())
    }

    /// Create the ledger tables if missing.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(include_str!("schema_sqlite.sql")).await
    }
}

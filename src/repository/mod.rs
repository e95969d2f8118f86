//! Run ledger persistence.
//!
//! All database access uses Diesel over SQLite through diesel-async's
//! `SyncConnectionWrapper`.

pub mod context;
pub mod models;
pub mod pool;
pub mod runs;

pub use context::LedgerContext;
pub use pool::{DbError, SqlitePool};
pub use runs::RunRepository;

//! ytpipe - YouTube analytics ETL pipeline.
//!
//! Extracts search results, video details, channels, comments and categories
//! from the YouTube Data API, stages them in object storage, loads them into
//! raw warehouse tables and upserts a small dimensional model that feeds the
//! dashboard.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gcp_auth;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod secrets;
pub mod server;
pub mod storage;
pub mod utils;
pub mod warehouse;
pub mod youtube;

pub use error::{PipelineError, Result};

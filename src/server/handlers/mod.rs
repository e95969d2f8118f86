//! HTTP request handlers.

mod dashboard;
mod functions;
mod payload;

pub use dashboard::{api_dashboard, dashboard_page, serve_css};
pub use functions::{health, raw_extract, raw_parse, raw_schema, raw_transform, yt_extract, yt_ingest};

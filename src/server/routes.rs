//! Router configuration for the function endpoints and dashboard.

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Pipeline stages accept GET (query string) and POST (JSON body)
        .route(
            "/raw-schema",
            get(handlers::raw_schema).post(handlers::raw_schema),
        )
        .route(
            "/raw-extract",
            get(handlers::raw_extract).post(handlers::raw_extract),
        )
        .route(
            "/raw-parse",
            get(handlers::raw_parse).post(handlers::raw_parse),
        )
        .route(
            "/raw-transform",
            get(handlers::raw_transform).post(handlers::raw_transform),
        )
        .route(
            "/yt-extract",
            get(handlers::yt_extract).post(handlers::yt_extract),
        )
        .route(
            "/yt-ingest",
            get(handlers::yt_ingest).post(handlers::yt_ingest),
        )
        // Dashboard
        .route("/", get(handlers::dashboard_page))
        .route("/dashboard", get(handlers::dashboard_page))
        .route("/api/dashboard", get(handlers::api_dashboard))
        .route("/static/style.css", get(handlers::serve_css))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Dashboard page and JSON endpoint.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};

use super::payload::failure;
use crate::dashboard::DashboardFilter;
use crate::server::{assets, templates, AppState};

fn filter_from(params: &HashMap<String, String>) -> crate::error::Result<DashboardFilter> {
    DashboardFilter::parse(
        params.get("ndays").map(String::as_str),
        params.get("channel_id").map(String::as_str),
    )
}

pub async fn dashboard_page(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = match filter_from(&params) {
        Ok(f) => f,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(templates::error_page(&e.to_string())),
            )
                .into_response()
        }
    };

    match state.pipeline.dashboard(&filter).await {
        Ok(dash) => Html(templates::dashboard_page(&dash)).into_response(),
        Err(e) => {
            tracing::error!("Dashboard unavailable: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(templates::error_page(&e.to_string())),
            )
                .into_response()
        }
    }
}

pub async fn api_dashboard(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = match filter_from(&params) {
        Ok(f) => f,
        Err(e) => return failure(e),
    };
    match state.pipeline.dashboard(&filter).await {
        Ok(dash) => Json(dash).into_response(),
        Err(e) => failure(e),
    }
}

pub async fn serve_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], assets::CSS)
}

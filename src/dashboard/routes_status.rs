//! Status document API. Every document is returned together with its derived
//! health so the frontend never re-implements the threshold rules.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, AppState};
use crate::model::ServerStatusDocument;
use crate::status::{derive_server_health, ServerHealth};

#[derive(Serialize)]
pub(super) struct StatusView {
    #[serde(flatten)]
    document: ServerStatusDocument,
    health: ServerHealth,
}

impl From<ServerStatusDocument> for StatusView {
    fn from(document: ServerStatusDocument) -> Self {
        let health = derive_server_health(&document);
        StatusView { document, health }
    }
}

fn views(docs: Vec<ServerStatusDocument>) -> Vec<StatusView> {
    docs.into_iter().map(StatusView::from).collect()
}

pub(super) async fn handler_status_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_status().await {
        Ok(docs) => Json(views(docs)).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list server data: {}", e),
        ),
    }
}

#[derive(Deserialize)]
pub(super) struct FilterQuery {
    #[serde(default)]
    tags: String,
}

/// Split `a,b,,c` into trimmed non-empty tags.
fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

pub(super) async fn handler_status_filter(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilterQuery>,
) -> impl IntoResponse {
    let tags = parse_tag_list(&query.tags);
    match state.store.list_status_with_tags(&tags).await {
        Ok(docs) => Json(views(docs)).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to filter server data: {}", e),
        ),
    }
}

pub(super) async fn handler_status_get(
    State(state): State<Arc<AppState>>,
    AxumPath(hostname): AxumPath<String>,
) -> impl IntoResponse {
    match state.store.get_status(&hostname).await {
        Ok(Some(doc)) => Json(StatusView::from(doc)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Server not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Run every probe step for one server now and return the fresh document.
pub(super) async fn handler_status_refresh(
    State(state): State<Arc<AppState>>,
    AxumPath(hostname): AxumPath<String>,
) -> impl IntoResponse {
    match state.coordinator.refresh_now(&hostname).await {
        Ok(Some(doc)) => Json(StatusView::from(doc)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Server not found"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Refresh failed: {}", e),
        ),
    }
}

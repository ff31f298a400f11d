//! Tag definitions used by the dashboard's filter bar.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{error_response, AppState};

pub(super) async fn handler_tags_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_tags().await {
        Ok(tags) => Json(tags).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list tags: {}", e),
        ),
    }
}

#[derive(Deserialize)]
pub(super) struct TagBody {
    tag: String,
}

pub(super) async fn handler_tags_create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TagBody>,
) -> impl IntoResponse {
    let tag = body.tag.trim();
    if tag.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Tag must not be empty");
    }
    match state.store.add_tag(tag).await {
        Ok(true) => (StatusCode::CREATED, Json(serde_json::json!({ "tag": tag }))).into_response(),
        Ok(false) => error_response(StatusCode::CONFLICT, format!("Tag '{}' already exists", tag)),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to add tag: {}", e),
        ),
    }
}

pub(super) async fn handler_tags_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(tag): AxumPath<String>,
) -> impl IntoResponse {
    match state.store.delete_tag(&tag).await {
        Ok(true) => Json(serde_json::json!({ "ok": true, "tag": tag })).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Tag not found"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to delete tag: {}", e),
        ),
    }
}

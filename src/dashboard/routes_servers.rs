//! Server registration API: create, list, retag and delete servers.
//!
//! Responses never include credentials; they carry the [`ServerMetaView`]
//! projection. Validation failures come back as one `400 { "errors": [...] }`.
//! Writes go through the coordinator so they take the host lock. A new server
//! is refreshed in the background right after it is stored.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, AppState};
use crate::model::{ServerMeta, ServerMetaView};
use crate::registration::RegistrationError;

pub(super) async fn handler_servers_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_server_meta().await {
        Ok(metas) => {
            let views: Vec<ServerMetaView> = metas.iter().map(ServerMeta::view).collect();
            Json(views).into_response()
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list servers: {}", e),
        ),
    }
}

pub(super) async fn handler_servers_create(
    State(state): State<Arc<AppState>>,
    Json(meta): Json<ServerMeta>,
) -> impl IntoResponse {
    match state.coordinator.register(meta).await {
        Ok(view) => {
            let coordinator = state.coordinator.clone();
            let hostname = view.hostname.clone();
            tokio::spawn(async move {
                if let Err(e) = coordinator.refresh_now(&hostname).await {
                    warn!(hostname = %hostname, error = %e, "initial refresh failed");
                }
            });
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(RegistrationError::Invalid(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response(),
        Err(e @ RegistrationError::Conflict(_)) => error_response(StatusCode::CONFLICT, e),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to register server: {}", e),
        ),
    }
}

#[derive(Deserialize)]
pub(super) struct TagsBody {
    tags: Vec<String>,
}

pub(super) async fn handler_servers_update_tags(
    State(state): State<Arc<AppState>>,
    AxumPath(hostname): AxumPath<String>,
    Json(body): Json<TagsBody>,
) -> impl IntoResponse {
    match state.coordinator.update_tags(&hostname, body.tags).await {
        Ok(true) => match state.store.get_server_meta(&hostname).await {
            Ok(Some(meta)) => Json(meta.view()).into_response(),
            Ok(None) => error_response(StatusCode::NOT_FOUND, "Server not found"),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        },
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Server not found"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to update tags: {}", e),
        ),
    }
}

pub(super) async fn handler_servers_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(hostname): AxumPath<String>,
) -> impl IntoResponse {
    match state.coordinator.delete_server(&hostname).await {
        Ok(true) => {
            info!(hostname = %hostname, "server removed via API");
            Json(serde_json::json!({ "ok": true, "hostname": hostname })).into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Server not found"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to delete server: {}", e),
        ),
    }
}

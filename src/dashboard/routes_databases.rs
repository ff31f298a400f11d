//! Ad hoc database listing for the registration form. Nothing is persisted.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::{error_response, AppState};
use crate::dbprobe::DbProbeError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatabaseHostBody {
    database_host: String,
    database_username: String,
    database_password: String,
}

pub(super) async fn handler_databases_list(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DatabaseHostBody>,
) -> impl IntoResponse {
    if body.database_host.trim().is_empty() || body.database_username.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "databaseHost and databaseUsername are required",
        );
    }
    match state
        .coordinator
        .databases()
        .list_databases(
            body.database_host.trim(),
            &body.database_username,
            &body.database_password,
        )
        .await
    {
        Ok(names) => Json(serde_json::json!({ "databases": names })).into_response(),
        Err(e) => {
            warn!(host = %body.database_host, error = %e, "database listing failed");
            let status = match e {
                DbProbeError::Connect { .. } | DbProbeError::Timeout { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                DbProbeError::Query { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e)
        }
    }
}

//! # Dashboard: JSON API and Polling Host
//!
//! Runs an Axum HTTP server exposing server registration, status documents
//! (with derived health), tag definitions and ad hoc database listing, and
//! hosts the polling scheduler in the same process.

mod routes_databases;
mod routes_health;
mod routes_servers;
mod routes_status;
mod routes_tags;

use crate::coordinator::Coordinator;
use crate::prom_metrics;
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::store::StatusStore;
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

pub struct AppState {
    pub store: Arc<dyn StatusStore>,
    pub coordinator: Arc<Coordinator>,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, prom_metrics: Arc<prom_metrics::Metrics>) -> Arc<Self> {
        Arc::new(AppState {
            store: coordinator.store().clone(),
            coordinator,
            prom_metrics,
        })
    }
}

/// `{ "error": message }` with the given status.
pub(super) fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(serde_json::json!({ "error": message.to_string() }))).into_response()
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse per-server path segments so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            let parent = if i > 0 { segments[i - 1] } else { "" };
            match parent {
                "servers-meta" | "servers-data" if *seg != "filter" => ":hostname",
                "tags" if i == 4 => ":tag",
                _ => *seg,
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route(
            "/api/servers-meta",
            get(routes_servers::handler_servers_list).post(routes_servers::handler_servers_create),
        )
        .route(
            "/api/servers-meta/{hostname}",
            delete(routes_servers::handler_servers_delete),
        )
        .route(
            "/api/servers-meta/{hostname}/tags",
            put(routes_servers::handler_servers_update_tags),
        )
        .route("/api/servers-data", get(routes_status::handler_status_list))
        .route(
            "/api/servers-data/filter",
            get(routes_status::handler_status_filter),
        )
        .route(
            "/api/servers-data/{hostname}",
            get(routes_status::handler_status_get),
        )
        .route(
            "/api/servers-data/{hostname}/refresh",
            post(routes_status::handler_status_refresh),
        )
        .route(
            "/api/misc/tags",
            get(routes_tags::handler_tags_list).post(routes_tags::handler_tags_create),
        )
        .route(
            "/api/misc/tags/{tag}",
            delete(routes_tags::handler_tags_delete),
        )
        .route(
            "/api/databases",
            post(routes_databases::handler_databases_list),
        )
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(1024 * 1024))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(120),
    ))
    .with_state(state)
}

/// Serve the API until Ctrl-C, optionally running the polling scheduler.
pub async fn run(
    port: u16,
    state: Arc<AppState>,
    scheduler: Option<SchedulerSettings>,
    static_dir: Option<&Path>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = scheduler
        .map(|settings| Scheduler::spawn(state.coordinator.clone(), &settings, shutdown_rx));

    let app = build_router(state, static_dir);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dashboard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
            }
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.join().await;
    }
    Ok(())
}

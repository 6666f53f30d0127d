//! Health and metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info, warn};

use herald_queue::QueueConsumer;
use herald_scheduler::{MetricsSnapshot, PipelineMetrics};

pub struct AppState {
    pub metrics: Arc<PipelineMetrics>,
    pub consumer: Arc<dyn QueueConsumer>,
    /// Checked by `/health` when present.
    pub database: Option<PgPool>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub queue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u64>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.database {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "database health check failed");
                false
            }
        },
        None => true,
    };
    let (queue, queue_depth) = match state.consumer.status().await {
        Ok(s) => (s.reachable, s.depth),
        Err(e) => {
            warn!(error = %e, "queue health check failed");
            (false, None)
        }
    };

    let healthy = database && queue;
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            database,
            queue,
            queue_depth,
        }),
    )
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Serve until `shutdown` flips to true.
pub fn spawn_server(
    addr: std::net::SocketAddr,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, error = %e, "failed to bind HTTP server");
                return;
            }
        };
        info!(%addr, "HTTP server listening");

        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                let mut rx = shutdown;
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server failed");
        }
        info!("HTTP server stopped");
    })
}

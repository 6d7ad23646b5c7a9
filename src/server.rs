//! HTTP callbacks the task queue posts stage payloads to.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::PipelineResult;
use crate::pipeline::{Pipeline, StageStatus, StageTask};

/// Maps a stage result to the response the queue acts on: 503 is redelivered,
/// 200 is acknowledged whether the stage succeeded or was abandoned.
pub fn stage_response(route: &str, result: PipelineResult<StageStatus>) -> (StatusCode, String) {
    match result {
        Ok(status) => (StatusCode::OK, status.to_string()),
        Err(e) if e.is_retryable() => {
            warn!("{} failed, leaving for retry: {}", route, e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!("{} abandoned: {}", route, e);
            (StatusCode::OK, format!("abandoned: {}", e))
        }
    }
}

async fn run_stage(
    State(pipeline): State<Arc<Pipeline>>,
    Path(route): Path<String>,
    body: Bytes,
) -> (StatusCode, String) {
    if !StageTask::ROUTES.contains(&route.as_str()) {
        return (StatusCode::NOT_FOUND, format!("unknown stage {}", route));
    }
    info!("Received {} ({} bytes)", route, body.len());
    let result = match StageTask::from_route(&route, &body) {
        Ok(task) => pipeline.execute(task).await,
        Err(e) => Err(e),
    };
    stage_response(&route, result)
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/{stage}", post(run_stage))
        .with_state(pipeline)
}

pub async fn serve(pipeline: Arc<Pipeline>, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

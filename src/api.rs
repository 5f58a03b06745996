//! HTTP API: task definitions, task submission and execution listing.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::tasks::{TaskEnvelope, TaskExecutor, TaskRegistry, sort_by_submission};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub executor: Arc<dyn TaskExecutor>,
}

/// Build the API router.
pub fn routes(registry: Arc<TaskRegistry>, executor: Arc<dyn TaskExecutor>) -> Router {
    let state = AppState { registry, executor };

    Router::new()
        .route("/health", get(health))
        .route("/api/taskdefinitions", get(list_definitions))
        .route("/api/tasks", get(list_tasks).post(submit_task))
        .with_state(state)
}

/// Serve `app` until `shutdown` fires, then give in-flight requests at most
/// `grace` to finish.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> std::io::Result<()> {
    let signal = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.cancelled().await;
    });
    let server = async move { server.await };
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown.cancelled() => {}
    }
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(grace_secs = grace.as_secs_f64(), "Open requests dropped at shutdown");
            Ok(())
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "photo-library"
    }))
}

async fn list_definitions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "data": state.registry.defined_tasks() }))
}

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let mut executions = state.executor.list_tasks().await;
    sort_by_submission(&mut executions);
    Json(json!({ "data": executions }))
}

/// POST /api/tasks
///
/// Decodes `{"type", "parameters"}` into a task and queues it. Responds
/// `202` with the pending execution.
async fn submit_task(
    State(state): State<AppState>,
    Json(envelope): Json<TaskEnvelope>,
) -> Response {
    let task = match state.registry.decode(&envelope) {
        Ok(task) => task,
        Err(e) => {
            warn!(task_type = %envelope.kind, error = %e, "Rejected task submission");
            return error_response(&e);
        }
    };
    match state.executor.submit(task).await {
        Ok(execution) => {
            info!(task_type = %execution.task_type, execution_id = %execution.id, "Task submitted");
            (StatusCode::ACCEPTED, Json(execution)).into_response()
        }
        Err(e) => {
            warn!(task_type = %envelope.kind, error = %e, "Task submission failed");
            error_response(&e)
        }
    }
}

fn status_of(err: &TaskError) -> StatusCode {
    match err {
        TaskError::UnknownTaskType(_) | TaskError::InvalidParameters { .. } => {
            StatusCode::BAD_REQUEST
        }
        TaskError::ExecutorStopped | TaskError::QueueFull { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &TaskError) -> Response {
    (status_of(err), Json(json!({"error": err.to_string()}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_errors_map_to_status_codes() {
        assert_eq!(
            status_of(&TaskError::UnknownTaskType("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&TaskError::InvalidParameters {
                name: "x".into(),
                reason: "bad".into()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&TaskError::ExecutorStopped),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(&TaskError::QueueFull { capacity: 1 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(&TaskError::Failed("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

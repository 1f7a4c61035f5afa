//! HTTP gateway: synchronous request boundary.
//!
//! The gateway validates input, records a PENDING task, and enqueues the
//! work item. It never blocks on analysis; callers poll `/status/{id}`
//! and fetch `/results/{id}` once the task reaches a terminal state.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::github;
use crate::task::runner::{Progress, ProgressBoard, ReviewJob, WorkQueue};
use crate::task::{TaskStatus, TaskStore};

#[derive(Clone)]
pub struct AppState {
    pub store: TaskStore,
    pub queue: WorkQueue,
    pub progress: ProgressBoard,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze-pr", post(submit))
        .route("/status/:id", get(status))
        .route("/results/:id", get(results))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    repo_url: String,
    pr_number: u64,
    github_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    task_id: String,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    task_id: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

async fn submit(State(state): State<AppState>, Json(request): Json<AnalyzeRequest>) -> Response {
    // Malformed references fail fast and never enter the pipeline.
    if let Err(err) = github::parse_repo_url(&request.repo_url) {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    let record = match state.store.create(&request.repo_url, request.pr_number) {
        Ok(record) => record,
        Err(err) => {
            error!(error = %err, "failed to create task record");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create task");
        }
    };

    let job = ReviewJob {
        task_id: record.id.clone(),
        repo_url: request.repo_url,
        pr_number: request.pr_number,
        github_token: request.github_token,
    };
    if let Err(err) = state.queue.enqueue(job).await {
        error!(task_id = %record.id, error = %err, "failed to enqueue job");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "analysis queue unavailable");
    }

    info!(task_id = %record.id, pr = request.pr_number, "task submitted");
    (
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            task_id: record.id,
            status: record.status,
        }),
    )
        .into_response()
}

async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let record = match state.store.get(&id) {
        Ok(Some(record)) => record,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => {
            error!(task_id = %id, error = %err, "failed to read task record");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read task");
        }
    };

    let progress = match record.status {
        TaskStatus::Processing => state.progress.get(&id),
        _ => None,
    };

    Json(StatusResponse {
        task_id: record.id,
        status: record.status,
        created_at: record.created_at,
        updated_at: record.updated_at,
        progress,
        error_message: record.error_message,
    })
    .into_response()
}

async fn results(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let record = match state.store.get(&id) {
        Ok(Some(record)) => record,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => {
            error!(task_id = %id, error = %err, "failed to read task record");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read task");
        }
    };

    if !record.status.is_terminal() {
        return (
            StatusCode::ACCEPTED,
            Json(json!({
                "task_id": record.id,
                "status": record.status,
                "detail": "analysis has not completed yet",
            })),
        )
            .into_response();
    }

    match record.status {
        TaskStatus::Completed => Json(json!({
            "task_id": record.id,
            "status": record.status,
            "results": record.results,
        }))
        .into_response(),
        _ => Json(json!({
            "task_id": record.id,
            "status": record.status,
            "error_message": record.error_message,
        }))
        .into_response(),
    }
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    /// The receiver keeps the queue open; tests hold it for their
    /// duration.
    fn test_state() -> (AppState, tokio::sync::mpsc::Receiver<ReviewJob>) {
        let store = TaskStore::open_in_memory().unwrap();
        let (queue, rx) = WorkQueue::new(8);
        let state = AppState {
            store,
            queue,
            progress: ProgressBoard::default(),
        };
        (state, rx)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_creates_pending_task() {
        let (state, mut rx) = test_state();
        let app = router(state.clone());
        let request = post_json(
            "/analyze-pr",
            r#"{"repo_url": "https://github.com/org/repo", "pr_number": 7}"#,
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        let task_id = body["task_id"].as_str().unwrap();
        let record = state.store.get(task_id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.task_id, task_id);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_repo_url() {
        let (state, _rx) = test_state();
        let app = router(state.clone());
        let request = post_json(
            "/analyze-pr",
            r#"{"repo_url": "not-a-url", "pr_number": 7}"#,
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_unknown_task_is_not_found() {
        let (state, _rx) = test_state();
        let app = router(state);
        let request = Request::builder()
            .uri("/status/no-such-task")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_reports_pending() {
        let (state, _rx) = test_state();
        let record = state.store.create("https://github.com/org/repo", 7).unwrap();
        let app = router(state);
        let request = Request::builder()
            .uri(format!("/status/{}", record.id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert!(body.get("progress").is_none());
    }

    #[tokio::test]
    async fn test_status_includes_progress_while_processing() {
        let (state, _rx) = test_state();
        let record = state.store.create("https://github.com/org/repo", 7).unwrap();
        state.store.mark_processing(&record.id).unwrap();
        state.progress.update(&record.id, 30, "fetching files");

        let app = router(state);
        let request = Request::builder()
            .uri(format!("/status/{}", record.id))
            .body(Body::empty())
            .unwrap();
        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["status"], "processing");
        assert_eq!(body["progress"]["percent"], 30);
    }

    #[tokio::test]
    async fn test_results_before_completion_is_accepted() {
        let (state, _rx) = test_state();
        let record = state.store.create("https://github.com/org/repo", 7).unwrap();
        let app = router(state);
        let request = Request::builder()
            .uri(format!("/results/{}", record.id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn test_results_after_failure_reports_error() {
        let (state, _rx) = test_state();
        let record = state.store.create("https://github.com/org/repo", 7).unwrap();
        state.store.mark_processing(&record.id).unwrap();
        state.store.fail(&record.id, "metadata fetch failed").unwrap();

        let app = router(state);
        let request = Request::builder()
            .uri(format!("/results/{}", record.id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error_message"], "metadata fetch failed");
    }

    #[tokio::test]
    async fn test_results_after_completion_returns_payload() {
        let (state, _rx) = test_state();
        let record = state.store.create("https://github.com/org/repo", 7).unwrap();
        state.store.mark_processing(&record.id).unwrap();
        let results = crate::review::AnalysisResult {
            files: vec![],
            summary: crate::review::Summary::from_reports(&[], &Default::default()),
            recommendations: vec!["Code looks good! No major issues detected".to_string()],
        };
        state.store.complete(&record.id, &results).unwrap();

        let app = router(state);
        let request = Request::builder()
            .uri(format!("/results/{}", record.id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["results"]["summary"]["total_files"], 0);
        assert!(body.get("error_message").is_none());
    }
}

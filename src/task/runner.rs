//! The asynchronous execution boundary.
//!
//! The gateway records a PENDING task and enqueues a [`ReviewJob`]; the
//! worker loop dequeues jobs and drives each one through the state
//! machine. All slow, failing network work (hosting API, model capability)
//! happens here, never in the request path.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};

use super::{TaskError, TaskStore};
use crate::github::{self, ChangeHost, ChangedFile, GithubError, PullRequestInfo, RepoRef};
use crate::review::{AnalysisResult, ReviewFile, Reviewer};

/// One unit of queued work.
#[derive(Debug, Clone)]
pub struct ReviewJob {
    pub task_id: String,
    pub repo_url: String,
    pub pr_number: u64,
    /// Per-submission credential; falls back to the configured token.
    pub github_token: Option<String>,
}

#[derive(Debug, Error)]
#[error("work queue is closed")]
pub struct QueueClosed;

/// Sending half of the work queue. The transport is a bounded in-process
/// channel; the contract is just enqueue plus a worker that dequeues and
/// executes.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<ReviewJob>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (WorkQueue, mpsc::Receiver<ReviewJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (WorkQueue { tx }, rx)
    }

    pub async fn enqueue(&self, job: ReviewJob) -> Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|_| QueueClosed)
    }
}

/// Advisory progress snapshot for a running task. Never persisted; only
/// terminal results are durable.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub percent: u8,
    pub status: String,
}

/// In-memory progress notifications, keyed by task id.
#[derive(Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<Mutex<HashMap<String, Progress>>>,
}

impl ProgressBoard {
    pub fn update(&self, task_id: &str, percent: u8, status: &str) {
        if let Ok(mut board) = self.inner.lock() {
            board.insert(
                task_id.to_string(),
                Progress {
                    percent,
                    status: status.to_string(),
                },
            );
        }
    }

    pub fn get(&self, task_id: &str) -> Option<Progress> {
        self.inner.lock().ok()?.get(task_id).cloned()
    }

    pub fn clear(&self, task_id: &str) {
        if let Ok(mut board) = self.inner.lock() {
            board.remove(task_id);
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

type HostFactory = Box<dyn Fn(Option<String>) -> Arc<dyn ChangeHost> + Send + Sync>;

/// Executes review jobs against the task store. Exactly one runner owns
/// any given task record after creation.
pub struct TaskRunner {
    store: TaskStore,
    reviewer: Reviewer,
    progress: ProgressBoard,
    default_token: Option<String>,
    host_factory: HostFactory,
}

impl TaskRunner {
    pub fn new(
        store: TaskStore,
        reviewer: Reviewer,
        progress: ProgressBoard,
        default_token: Option<String>,
    ) -> Self {
        Self {
            store,
            reviewer,
            progress,
            default_token,
            host_factory: Box::new(|token| Arc::new(github::GithubClient::new(token))),
        }
    }

    /// Replace the hosting client constructor. Used by tests to run jobs
    /// against a stub host.
    #[cfg(test)]
    pub fn with_host_factory(mut self, factory: HostFactory) -> Self {
        self.host_factory = factory;
        self
    }

    /// Run one job through the state machine. A failure is recorded on
    /// the task record first and then returned to the caller, so the
    /// execution framework can still apply its own retry or alerting
    /// policy.
    pub async fn execute(&self, job: &ReviewJob) -> Result<(), RunError> {
        self.store.mark_processing(&job.task_id)?;
        info!(task_id = %job.task_id, repo = %job.repo_url, pr = job.pr_number, "task processing");

        let outcome = self.analyze(job).await;
        self.progress.clear(&job.task_id);

        match outcome {
            Ok(results) => {
                // The record must still reach a terminal state when the
                // COMPLETED write fails.
                if let Err(err) = self.store.complete(&job.task_id, &results) {
                    if let Err(store_err) = self.store.fail(&job.task_id, &err.to_string()) {
                        error!(task_id = %job.task_id, error = %store_err, "failed to record task failure");
                    }
                    return Err(err.into());
                }
                info!(task_id = %job.task_id, issues = results.summary.total_issues, "task completed");
                Ok(())
            }
            Err(err) => {
                if let Err(store_err) = self.store.fail(&job.task_id, &err.to_string()) {
                    error!(task_id = %job.task_id, error = %store_err, "failed to record task failure");
                }
                Err(err)
            }
        }
    }

    async fn analyze(&self, job: &ReviewJob) -> Result<AnalysisResult, RunError> {
        let repo = github::parse_repo_url(&job.repo_url)?;
        let token = job.github_token.clone().or_else(|| self.default_token.clone());
        let host = (self.host_factory)(token);

        // Metadata and file-list failures are fatal for the whole task.
        let pr = host.get_pull_request(&repo, job.pr_number).await?;
        info!(title = %pr.title, "retrieved PR metadata");
        let changed = host.list_changed_files(&repo, job.pr_number).await?;
        info!(files = changed.len(), "retrieved changed file list");

        let files = collect_review_files(host.as_ref(), &repo, &pr, changed).await;
        self.progress
            .update(&job.task_id, 30, "Files retrieved, starting analysis");

        let results = self.reviewer.review_all(&files).await;
        self.progress
            .update(&job.task_id, 90, "Analysis complete, saving results");

        Ok(results)
    }
}

/// Fetch content for each changed file and build the review inputs.
/// Removed files are skipped; a per-file fetch failure degrades that file
/// to empty content with an attached error note instead of failing the
/// task.
pub async fn collect_review_files(
    host: &dyn ChangeHost,
    repo: &RepoRef,
    pr: &PullRequestInfo,
    changed: Vec<ChangedFile>,
) -> Vec<ReviewFile> {
    let mut files = Vec::new();
    for entry in changed {
        if entry.status == "removed" {
            continue;
        }

        let mut content = String::new();
        let mut fetch_error = None;
        match host.get_file_content(repo, &entry.path, &pr.head_sha).await {
            Ok(text) => content = text,
            Err(err) => {
                warn!(path = %entry.path, error = %err, "failed to fetch file content");
                fetch_error = Some(err.to_string());
            }
        }

        files.push(ReviewFile {
            language: github::detect_language(&entry.path).to_string(),
            path: entry.path,
            content,
            patch: entry.patch,
            fetch_error,
        });
    }
    files
}

/// Worker loop: dequeue, execute, repeat until the queue closes. Job
/// failures are logged here; the durable record already carries the
/// cause.
pub async fn run(mut rx: mpsc::Receiver<ReviewJob>, runner: TaskRunner) {
    info!("task worker started");
    while let Some(job) = rx.recv().await {
        let task_id = job.task_id.clone();
        if let Err(err) = runner
            .execute(&job)
            .instrument(info_span!("task", task_id = %task_id))
            .await
        {
            error!(task_id = %task_id, error = %err, "task execution failed");
        }
    }
    info!("task worker stopped");
}

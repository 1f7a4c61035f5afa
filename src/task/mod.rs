//! Durable task state: the only component with persistent side effects.
//!
//! A task record moves through PENDING -> PROCESSING -> {COMPLETED |
//! FAILED}. Terminal states are final, and each terminal transition is a
//! single atomic row update, so `results` and `error_message` are never
//! observed partially written. The gateway creates records; after creation
//! only the task runner mutates them.

pub mod runner;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::review::AnalysisResult;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_tasks (
    id            TEXT PRIMARY KEY,
    repo_url      TEXT NOT NULL,
    pr_number     INTEGER NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    results       TEXT,
    error_message TEXT
);
";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("database operation failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode or decode results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("task not found: {id}")]
    NotFound { id: String },

    #[error("invalid status transition for task {id}")]
    InvalidTransition { id: String },

    #[error("invalid status value: {value}")]
    InvalidStatus { value: String },

    #[error("invalid timestamp value: {value}")]
    InvalidTimestamp { value: String },

    #[error("task store lock poisoned")]
    LockPoisoned,
}

/// Lifecycle state of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<TaskStatus, TaskError> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable task record.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: String,
    pub repo_url: String,
    pub pr_number: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only when status is Completed.
    pub results: Option<AnalysisResult>,
    /// Set only when status is Failed.
    pub error_message: Option<String>,
}

/// SQLite-backed task store. Cheap to clone; all clones share one
/// connection guarded by a mutex.
#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    pub fn open(path: &str) -> Result<TaskStore, TaskError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(SCHEMA)?;
        Ok(TaskStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<TaskStore, TaskError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(TaskStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn.lock().map_err(|_| TaskError::LockPoisoned)
    }

    /// Create a new PENDING record with a fresh opaque id.
    pub fn create(&self, repo_url: &str, pr_number: u64) -> Result<TaskRecord, TaskError> {
        let now = Utc::now();
        let record = TaskRecord {
            id: Uuid::new_v4().to_string(),
            repo_url: repo_url.to_string(),
            pr_number,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            results: None,
            error_message: None,
        };

        self.conn()?.execute(
            "INSERT INTO analysis_tasks (id, repo_url, pr_number, status, created_at, updated_at, results, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL)",
            rusqlite::params![
                record.id,
                record.repo_url,
                record.pr_number as i64,
                record.status.as_str(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, repo_url, pr_number, status, created_at, updated_at, results, error_message
                 FROM analysis_tasks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, repo_url, pr_number, status, created_at, updated_at, results, error_message)) =
            row
        else {
            return Ok(None);
        };

        let results = match results {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(Some(TaskRecord {
            id,
            repo_url,
            pr_number: pr_number as u64,
            status: TaskStatus::parse(&status)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            results,
            error_message,
        }))
    }

    /// PENDING -> PROCESSING. Rejected for any other current status.
    pub fn mark_processing(&self, id: &str) -> Result<(), TaskError> {
        let changed = self.conn()?.execute(
            "UPDATE analysis_tasks SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            rusqlite::params![
                TaskStatus::Processing.as_str(),
                Utc::now().to_rfc3339(),
                id,
                TaskStatus::Pending.as_str(),
            ],
        )?;
        self.check_transition(changed, id)
    }

    /// PROCESSING -> COMPLETED, recording results in the same row update.
    pub fn complete(&self, id: &str, results: &AnalysisResult) -> Result<(), TaskError> {
        let encoded = serde_json::to_string(results)?;
        let changed = self.conn()?.execute(
            "UPDATE analysis_tasks
             SET status = ?1, updated_at = ?2, results = ?3, error_message = NULL
             WHERE id = ?4 AND status = ?5",
            rusqlite::params![
                TaskStatus::Completed.as_str(),
                Utc::now().to_rfc3339(),
                encoded,
                id,
                TaskStatus::Processing.as_str(),
            ],
        )?;
        self.check_transition(changed, id)
    }

    /// PROCESSING -> FAILED, recording the cause in the same row update.
    pub fn fail(&self, id: &str, error_message: &str) -> Result<(), TaskError> {
        let changed = self.conn()?.execute(
            "UPDATE analysis_tasks
             SET status = ?1, updated_at = ?2, error_message = ?3, results = NULL
             WHERE id = ?4 AND status = ?5",
            rusqlite::params![
                TaskStatus::Failed.as_str(),
                Utc::now().to_rfc3339(),
                error_message,
                id,
                TaskStatus::Processing.as_str(),
            ],
        )?;
        self.check_transition(changed, id)
    }

    fn check_transition(&self, changed: usize, id: &str) -> Result<(), TaskError> {
        if changed == 1 {
            return Ok(());
        }
        // Distinguish a missing row from a transition guard rejection.
        match self.get(id)? {
            None => Err(TaskError::NotFound { id: id.to_string() }),
            Some(_) => Err(TaskError::InvalidTransition { id: id.to_string() }),
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TaskError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TaskError::InvalidTimestamp {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Summary;
    use std::collections::BTreeSet;

    fn sample_results() -> AnalysisResult {
        AnalysisResult {
            files: vec![],
            summary: Summary::from_reports(&[], &BTreeSet::new()),
            recommendations: vec!["Code looks good! No major issues detected".to_string()],
        }
    }

    #[test]
    fn test_create_starts_pending() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.results.is_none());
        assert!(record.error_message.is_none());
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_get_round_trips_record() {
        let store = TaskStore::open_in_memory().unwrap();
        let created = store.create("https://github.com/org/repo", 7).unwrap();
        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.repo_url, created.repo_url);
        assert_eq!(fetched.pr_number, 7);
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = TaskStore::open_in_memory().unwrap();
        assert!(store.get("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let store = TaskStore::open_in_memory().unwrap();
        let a = store.create("https://github.com/org/repo", 1).unwrap();
        let b = store.create("https://github.com/org/repo", 1).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_full_lifecycle_to_completed() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();

        store.mark_processing(&record.id).unwrap();
        let processing = store.get(&record.id).unwrap().unwrap();
        assert_eq!(processing.status, TaskStatus::Processing);

        store.complete(&record.id, &sample_results()).unwrap();
        let completed = store.get(&record.id).unwrap().unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
        assert!(completed.results.is_some());
        assert!(completed.error_message.is_none());
        assert!(completed.updated_at >= completed.created_at);
    }

    #[test]
    fn test_full_lifecycle_to_failed() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();
        store.mark_processing(&record.id).unwrap();
        store.fail(&record.id, "metadata fetch failed").unwrap();

        let failed = store.get(&record.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("metadata fetch failed"));
        assert!(failed.results.is_none());
    }

    #[test]
    fn test_no_transition_out_of_terminal_state() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();
        store.mark_processing(&record.id).unwrap();
        store.complete(&record.id, &sample_results()).unwrap();

        assert!(matches!(
            store.fail(&record.id, "too late"),
            Err(TaskError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.mark_processing(&record.id),
            Err(TaskError::InvalidTransition { .. })
        ));
        let record = store.get(&record.id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();
        assert!(matches!(
            store.complete(&record.id, &sample_results()),
            Err(TaskError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_transition_on_missing_task_is_not_found() {
        let store = TaskStore::open_in_memory().unwrap();
        assert!(matches!(
            store.mark_processing("ghost"),
            Err(TaskError::NotFound { .. })
        ));
    }

    #[test]
    fn test_updated_at_is_non_decreasing() {
        let store = TaskStore::open_in_memory().unwrap();
        let record = store.create("https://github.com/org/repo", 7).unwrap();
        store.mark_processing(&record.id).unwrap();
        let processing = store.get(&record.id).unwrap().unwrap();
        assert!(processing.updated_at >= record.updated_at);

        store.complete(&record.id, &sample_results()).unwrap();
        let completed = store.get(&record.id).unwrap().unwrap();
        assert!(completed.updated_at >= processing.updated_at);
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}

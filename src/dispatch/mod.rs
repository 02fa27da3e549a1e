//! Durable job queue and worker pool
//!
//! Requests are enqueued into a `JobQueue`, claimed one at a time by workers
//! and run through the same `Engine::fetch` pipeline as direct fetches. A job
//! moves through `waiting -> active -> completed | failed`. Failed attempts go
//! back to `waiting` with exponential backoff until the job's attempt budget is
//! spent; after that the job is `failed` for good and carries a
//! `queue-exhausted` error.

mod schema;
mod sqlite;
mod worker;

pub use sqlite::SqliteJobQueue;
pub use worker::WorkerPool;

use crate::model::{FetchError, FetchRequest, FetchResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the queue itself (not by the jobs it runs)
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(i64),

    #[error("Job {id} is {actual}, expected {expected}")]
    InvalidState {
        id: i64,
        actual: JobStatus,
        expected: JobStatus,
    },

    #[error("Request rejected: {0}")]
    Rejected(FetchError),

    #[error("Queue lock poisoned")]
    Poisoned,

    #[error("Corrupt job row: {0}")]
    Corrupt(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A queued fetch request and its bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: i64,
    pub request: FetchRequest,
    pub status: JobStatus,

    /// Attempts started so far (incremented on claim)
    pub attempts: u32,
    pub max_attempts: u32,

    /// Earliest time the job may be claimed
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub last_error: Option<FetchError>,
    pub result: Option<FetchResult>,
}

/// Job counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStatus {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed
    }

    /// True when nothing is waiting or running
    pub fn is_drained(&self) -> bool {
        self.waiting == 0 && self.active == 0
    }
}

/// Storage for queued fetch jobs
///
/// Implementations must make `claim_next` atomic: a waiting job is handed to
/// exactly one caller.
pub trait JobQueue: Send + Sync {
    /// Adds a request; invalid requests are rejected before they are stored
    fn enqueue(&self, request: &FetchRequest) -> QueueResult<i64>;

    /// Moves the oldest claimable waiting job to `active`
    fn claim_next(&self) -> QueueResult<Option<Job>>;

    /// Marks an active job completed and stores its result
    fn complete(&self, id: i64, result: &FetchResult) -> QueueResult<()>;

    /// Records a failed attempt and returns the job's new status
    ///
    /// Returns `Waiting` when the job was requeued with backoff, `Failed` when
    /// its budget is spent or the error cannot be retried.
    fn fail(&self, id: i64, error: &FetchError) -> QueueResult<JobStatus>;

    fn get(&self, id: i64) -> QueueResult<Job>;

    fn status(&self) -> QueueResult<QueueStatus>;

    /// Returns jobs claimed more than `older_than` ago to `waiting`
    ///
    /// Jobs that had already spent their budget are failed instead.
    fn recover_stale(&self, older_than: Duration) -> QueueResult<usize>;
}

//! SQLite job queue
//!
//! One connection behind a mutex serves every worker in the process. Claims run
//! in an immediate transaction so several processes can share one database file.

use crate::config::QueueConfig;
use crate::dispatch::schema::initialize_schema;
use crate::dispatch::{Job, JobQueue, JobStatus, QueueError, QueueResult, QueueStatus};
use crate::model::{FetchError, FetchErrorKind, FetchRequest, FetchResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const JOB_COLUMNS: &str = "id, request, status, attempts, max_attempts, available_at, \
                           created_at, updated_at, last_error, result";

/// `JobQueue` backed by a SQLite database file
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
    config: QueueConfig,
}

impl SqliteJobQueue {
    /// Opens (or creates) the queue database at `path`
    pub fn open(path: &Path, config: &QueueConfig) -> QueueResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(config: &QueueConfig) -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueError::Poisoned)
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, request: &FetchRequest) -> QueueResult<i64> {
        request.validate().map_err(QueueError::Rejected)?;

        let now = now_millis();
        let body = serde_json::to_string(request)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (url, request, status, attempts, max_attempts, available_at, \
             created_at, updated_at) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5, ?5)",
            params![
                request.url,
                body,
                JobStatus::Waiting.to_db_string(),
                self.config.max_attempts,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::debug!("Enqueued job {} for {}", id, request.url);
        Ok(id)
    }

    fn claim_next(&self) -> QueueResult<Option<Job>> {
        let mut conn = self.lock()?;
        let now = now_millis();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM jobs WHERE status = ?1 AND available_at <= ?2 \
                 ORDER BY available_at, id LIMIT 1",
                params![JobStatus::Waiting.to_db_string(), now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET status = ?1, attempts = attempts + 1, claimed_at = ?2, \
             updated_at = ?2 WHERE id = ?3",
            params![JobStatus::Active.to_db_string(), now, id],
        )?;
        tx.commit()?;

        load(&conn, id).map(Some)
    }

    fn complete(&self, id: i64, result: &FetchResult) -> QueueResult<()> {
        let body = serde_json::to_string(result)?;
        let conn = self.lock()?;

        let updated = conn.execute(
            "UPDATE jobs SET status = ?1, result = ?2, updated_at = ?3 \
             WHERE id = ?4 AND status = ?5",
            params![
                JobStatus::Completed.to_db_string(),
                body,
                now_millis(),
                id,
                JobStatus::Active.to_db_string()
            ],
        )?;

        if updated == 0 {
            let job = load(&conn, id)?;
            return Err(QueueError::InvalidState {
                id,
                actual: job.status,
                expected: JobStatus::Active,
            });
        }
        Ok(())
    }

    fn fail(&self, id: i64, error: &FetchError) -> QueueResult<JobStatus> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let job = load(&tx, id)?;
        if job.status != JobStatus::Active {
            return Err(QueueError::InvalidState {
                id,
                actual: job.status,
                expected: JobStatus::Active,
            });
        }

        let now = now_millis();
        let (status, recorded, available_at) = if !error.kind.is_retryable() {
            (JobStatus::Failed, error.clone(), now)
        } else if job.attempts >= job.max_attempts {
            (JobStatus::Failed, exhausted(&job, error), now)
        } else {
            let delay = self.config.backoff_for_attempt(job.attempts);
            (JobStatus::Waiting, error.clone(), now + delay.as_millis() as i64)
        };

        tx.execute(
            "UPDATE jobs SET status = ?1, last_error = ?2, available_at = ?3, updated_at = ?4 \
             WHERE id = ?5",
            params![
                status.to_db_string(),
                serde_json::to_string(&recorded)?,
                available_at,
                now,
                id
            ],
        )?;
        tx.commit()?;

        match status {
            JobStatus::Waiting => tracing::warn!(
                "Job {} attempt {}/{} failed, requeued: {}",
                id,
                job.attempts,
                job.max_attempts,
                error.message
            ),
            _ => tracing::error!("Job {} failed permanently: {}", id, recorded),
        }

        Ok(status)
    }

    fn get(&self, id: i64) -> QueueResult<Job> {
        let conn = self.lock()?;
        load(&conn, id)
    }

    fn status(&self) -> QueueResult<QueueStatus> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut status = QueueStatus::default();
        for row in rows {
            let (name, count) = row?;
            let count = count as usize;
            match JobStatus::from_db_string(&name) {
                Some(JobStatus::Waiting) => status.waiting = count,
                Some(JobStatus::Active) => status.active = count,
                Some(JobStatus::Completed) => status.completed = count,
                Some(JobStatus::Failed) => status.failed = count,
                None => return Err(QueueError::Corrupt(format!("unknown status '{}'", name))),
            }
        }
        Ok(status)
    }

    fn recover_stale(&self, older_than: Duration) -> QueueResult<usize> {
        let mut conn = self.lock()?;
        let now = now_millis();
        let cutoff = now - older_than.as_millis() as i64;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stale: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM jobs WHERE status = ?1 AND claimed_at <= ?2")?;
            let ids = stmt.query_map(params![JobStatus::Active.to_db_string(), cutoff], |row| {
                row.get(0)
            })?;
            ids.collect::<Result<_, _>>()?
        };

        for &id in &stale {
            let job = load(&tx, id)?;
            if job.attempts >= job.max_attempts {
                let lost = FetchError::new(
                    FetchErrorKind::Network,
                    job.request.url.as_str(),
                    "worker lost during final attempt",
                );
                tx.execute(
                    "UPDATE jobs SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                    params![
                        JobStatus::Failed.to_db_string(),
                        serde_json::to_string(&exhausted(&job, &lost))?,
                        now,
                        id
                    ],
                )?;
            } else {
                tx.execute(
                    "UPDATE jobs SET status = ?1, available_at = ?2, updated_at = ?2 WHERE id = ?3",
                    params![JobStatus::Waiting.to_db_string(), now, id],
                )?;
            }
        }
        tx.commit()?;

        if !stale.is_empty() {
            tracing::info!("Recovered {} stale job(s)", stale.len());
        }
        Ok(stale.len())
    }
}

/// The error a job carries once its attempt budget is spent
fn exhausted(job: &Job, last: &FetchError) -> FetchError {
    let mut error = FetchError::new(
        FetchErrorKind::QueueExhausted,
        job.request.url.as_str(),
        format!("gave up after {} attempt(s), last: {}", job.attempts, last.message),
    );
    error.attempted = last.attempted.clone();
    error.attempts = job.attempts;
    error
}

fn load(conn: &Connection, id: i64) -> QueueResult<Job> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            JobRow::read,
        )
        .optional()?
        .ok_or(QueueError::NotFound(id))?;
    row.into_job()
}

/// Raw column values; JSON columns are decoded outside the row callback
struct JobRow {
    id: i64,
    request: String,
    status: String,
    attempts: u32,
    max_attempts: u32,
    available_at: i64,
    created_at: i64,
    updated_at: i64,
    last_error: Option<String>,
    result: Option<String>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request: row.get(1)?,
            status: row.get(2)?,
            attempts: row.get(3)?,
            max_attempts: row.get(4)?,
            available_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            last_error: row.get(8)?,
            result: row.get(9)?,
        })
    }

    fn into_job(self) -> QueueResult<Job> {
        let status = JobStatus::from_db_string(&self.status)
            .ok_or_else(|| QueueError::Corrupt(format!("unknown status '{}'", self.status)))?;

        Ok(Job {
            id: self.id,
            request: serde_json::from_str(&self.request)?,
            status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            available_at: from_millis(self.available_at)?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            last_error: self
                .last_error
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            result: self.result.as_deref().map(serde_json::from_str).transpose()?,
        })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> QueueResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| QueueError::Corrupt(format!("timestamp out of range: {}", ms)))
}

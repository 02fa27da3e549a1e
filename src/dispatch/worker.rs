use crate::config::QueueConfig;
use crate::dispatch::{JobQueue, JobStatus, QueueResult};
use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Workers draining a `JobQueue` through an `Engine`
///
/// Every worker claims one job at a time. Cancelling stops the polling; a job
/// already claimed still runs to completion and is recorded.
pub struct WorkerPool {
    engine: Engine,
    queue: Arc<dyn JobQueue>,
    workers: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(engine: Engine, queue: Arc<dyn JobQueue>, config: &QueueConfig) -> Self {
        Self {
            engine,
            queue,
            workers: config.workers.max(1),
            poll_interval: config.poll_interval(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns the workers onto the current runtime
    pub fn start(&self) {
        tracing::info!("Starting {} queue worker(s)", self.workers);
        for worker_id in 0..self.workers {
            let engine = self.engine.clone();
            let queue = Arc::clone(&self.queue);
            let cancel = self.cancel.clone();
            let poll_interval = self.poll_interval;
            self.tracker.spawn(async move {
                worker_loop(worker_id, engine, queue, poll_interval, cancel).await;
            });
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the workers and waits for in-flight jobs to be recorded
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Queue workers stopped");
    }

    /// Claims and runs a single job; `None` when nothing was claimable
    pub async fn run_once(&self) -> QueueResult<Option<(i64, JobStatus)>> {
        process_next(&self.engine, self.queue.as_ref()).await
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: Engine,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!("Worker {} started", worker_id);

    while !cancel.is_cancelled() {
        let idle = match process_next(&engine, queue.as_ref()).await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                tracing::error!("Worker {}: queue error: {}", worker_id, e);
                true
            }
        };

        if idle {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    tracing::debug!("Worker {} stopped", worker_id);
}

async fn process_next(
    engine: &Engine,
    queue: &dyn JobQueue,
) -> QueueResult<Option<(i64, JobStatus)>> {
    let Some(job) = queue.claim_next()? else {
        return Ok(None);
    };

    tracing::debug!(
        "Processing job {} ({}), attempt {}/{}",
        job.id,
        job.request.url,
        job.attempts,
        job.max_attempts
    );

    let status = match engine.fetch(job.request).await {
        Ok(result) => {
            queue.complete(job.id, &result)?;
            tracing::info!("Job {} completed via {}", job.id, result.method);
            JobStatus::Completed
        }
        Err(e) => queue.fail(job.id, &e)?,
    };

    Ok(Some((job.id, status)))
}

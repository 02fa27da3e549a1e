//! Admission control for fetch pipelines
//!
//! This module handles:
//! - Global concurrency limiting via a fair (FIFO) semaphore
//! - Per-host politeness delays, raised by robots.txt Crawl-delay
//! - Deadlines covering both the wait for a slot and the task itself
//! - Proxy rotation for requests without an explicit proxy
//! - Counters for observability (`SchedulerStats`)

mod pacer;
mod proxy;

pub use pacer::HostPacer;
pub use proxy::ProxyRotator;

use crate::config::{EngineConfig, ProxyConfig};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Why a task did not run to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Overdue {
    #[error("deadline passed while waiting for a slot")]
    Admission,
    #[error("task exceeded its deadline")]
    Execution,
    #[error("scheduler is closed")]
    Closed,
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks waiting for a slot or their host's turn
    pub waiting: usize,
    /// Tasks running now
    pub active: usize,
    pub completed: usize,
    /// Tasks that returned an error or missed their deadline
    pub failed: usize,
    /// Highest `active` ever observed
    pub peak_active: usize,
}

#[derive(Debug, Default)]
struct Counters {
    waiting: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    peak_active: AtomicUsize,
}

/// Decrements a gauge when dropped, so cancelled tasks are accounted for
struct GaugeGuard<'a>(&'a AtomicUsize);

impl<'a> GaugeGuard<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounds how many pipelines run at once and how fast each host is hit
pub struct Scheduler {
    slots: Arc<Semaphore>,
    concurrency: usize,
    pacer: HostPacer,
    proxies: ProxyRotator,
    counters: Counters,
}

impl Scheduler {
    pub fn new(concurrency: usize, politeness_delay: Duration, proxies: ProxyRotator) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            pacer: HostPacer::new(politeness_delay),
            proxies,
            counters: Counters::default(),
        }
    }

    pub fn from_config(engine: &EngineConfig, proxy: &ProxyConfig) -> Self {
        Self::new(
            engine.concurrency,
            engine.politeness_delay(),
            ProxyRotator::from_urls(&proxy.urls, Duration::from_secs(proxy.rotate_interval_secs)),
        )
    }

    /// Runs `task` once `host` may be contacted again and a slot is free
    ///
    /// A task is one outbound request. Waiting and execution share one
    /// `deadline`. When it fires the task future is dropped, which cancels
    /// only this task. No slot is held while waiting for the host's turn.
    ///
    /// The outer error reports scheduling failures; the inner result is the
    /// task's own.
    pub async fn run<T, E, Fut>(
        &self,
        host: &str,
        deadline: Instant,
        task: Fut,
    ) -> Result<Result<T, E>, Overdue>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = self.admit_and_run(host, deadline, task).await;
        let counter = match &outcome {
            Ok(Ok(_)) => &self.counters.completed,
            _ => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn admit_and_run<T, E, Fut>(
        &self,
        host: &str,
        deadline: Instant,
        task: Fut,
    ) -> Result<Result<T, E>, Overdue>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = {
            let _waiting = GaugeGuard::enter(&self.counters.waiting);
            self.admit(host, deadline).await?
        };

        let _active = GaugeGuard::enter(&self.counters.active);
        let now_active = self.counters.active.load(Ordering::SeqCst);
        self.counters
            .peak_active
            .fetch_max(now_active, Ordering::SeqCst);

        let result = tokio::time::timeout_at(deadline, task)
            .await
            .map_err(|_| Overdue::Execution);
        drop(permit);
        result
    }

    /// Waits for the host's turn, then a slot, then claims the turn
    ///
    /// When another task takes the turn while this one waits for a slot, the
    /// slot is handed back and the wait starts over.
    async fn admit(&self, host: &str, deadline: Instant) -> Result<OwnedSemaphorePermit, Overdue> {
        loop {
            let turn = self.pacer.next_turn(host);
            if turn > deadline {
                tracing::debug!("Politeness delay for {} outlasts the deadline", host);
                return Err(Overdue::Admission);
            }
            tokio::time::sleep_until(turn).await;

            let permit = match tokio::time::timeout_at(
                deadline,
                Arc::clone(&self.slots).acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(Overdue::Closed),
                Err(_) => {
                    tracing::debug!("No slot for {} before its deadline", host);
                    return Err(Overdue::Admission);
                }
            };

            if self.pacer.try_claim(host) {
                return Ok(permit);
            }
        }
    }

    /// Waits for and claims the host's turn without taking a slot
    ///
    /// Used for lightweight requests outside `run`, such as content sniffing.
    pub async fn pace(&self, host: &str, deadline: Instant) -> bool {
        self.pacer.wait_turn(host, deadline).await
    }

    /// Raises the politeness delay for a host (robots.txt Crawl-delay)
    pub fn set_crawl_delay(&self, host: &str, delay: Duration) {
        self.pacer.set_crawl_delay(host, delay);
    }

    /// Rotation state for requests without their own proxy
    pub fn proxies(&self) -> &ProxyRotator {
        &self.proxies
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            waiting: self.counters.waiting.load(Ordering::SeqCst),
            active: self.counters.active.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            peak_active: self.counters.peak_active.load(Ordering::SeqCst),
        }
    }
}

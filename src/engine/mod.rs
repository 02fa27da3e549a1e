//! The fetch pipeline
//!
//! `Engine::fetch` runs one request end to end:
//!
//! 1. Validate the request (fails fast, no network)
//! 2. Look up the canonical URL in the result cache
//! 3. On a miss, join or lead the single in-flight run for that URL
//! 4. The strategy selector picks the first method
//! 5. Rounds of (chosen method, other method) with backoff between rounds;
//!    every attempt is admitted by the scheduler on its own
//! 7. The raw page is normalized and cached
//! 8. Extraction rules run against the (possibly cached) raw content
//! 9. Fresh results go to the result sink

mod builder;

pub use builder::EngineBuilder;

use crate::cache::{cache_key, ResultCache, SingleFlight};
use crate::config::{Config, EngineConfig};
use crate::extract::extract;
use crate::fetch::{parse_body, Attempt, Fetcher, RawPage, StaticFetcher};
use crate::model::{FetchError, FetchMethod, FetchRequest, FetchResult, Performance};
use crate::output::ResultSink;
use crate::renderer::BrowserPool;
use crate::scheduler::{Overdue, Scheduler, SchedulerStats};
use crate::strategy::StrategySelector;
use crate::url::host_key;
use crate::HarvestError;
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// A shared run's result and whether it came from the network
type FlightOutcome = Result<(FetchResult, bool), FetchError>;

/// Adaptive content-acquisition engine
///
/// Cheap to clone; clones share the cache, scheduler and browser.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    cache: ResultCache,
    flights: SingleFlight<FlightOutcome>,
    scheduler: Arc<Scheduler>,
    selector: StrategySelector,
    http: Arc<StaticFetcher>,
    static_fetcher: Arc<dyn Fetcher>,
    rendered_fetcher: Arc<dyn Fetcher>,
    pool: Arc<BrowserPool>,
    rendering_enabled: bool,
    sink: Arc<dyn ResultSink>,
}

impl Engine {
    /// Engine with the default components for `config`
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Fetches a page, or returns a typed terminal error
    ///
    /// Concurrent requests for the same canonical URL share one network run;
    /// each still gets its own extraction pass.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, FetchError> {
        let url = request.validate()?;
        let key = cache_key(url.as_str())
            .map_err(|e| FetchError::validation(&request.url, e.to_string()))?;

        if let Some(cached) = self.inner.cache.get(&key) {
            tracing::debug!("Cache hit for {}", key);
            return Ok(finish(cached, &request, true));
        }

        let inner = Arc::clone(&self.inner);
        let run_request = request.clone();
        let run_key = key.clone();
        let (outcome, leader) = self
            .inner
            .flights
            .run(&key, move || {
                async move { inner.acquire(url, run_request, run_key).await }.boxed()
            })
            .await;

        let (result, fresh) = outcome?;
        let result = finish(result, &request, !fresh);
        if leader && fresh {
            if let Err(e) = self.inner.sink.store(&result) {
                tracing::warn!("Result sink rejected {}: {}", result.url, e);
            }
        }
        Ok(result)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.scheduler.stats()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The static HTTP fetcher; its clients are reused for robots.txt
    pub fn http(&self) -> &Arc<StaticFetcher> {
        &self.inner.http
    }

    /// Flushes the sink and shuts the browser down if it was started
    pub async fn shutdown(&self) {
        if let Err(e) = self.inner.sink.flush() {
            tracing::warn!("Failed to flush result sink: {}", e);
        }
        if let Err(e) = self.inner.pool.shutdown().await {
            tracing::warn!("Failed to shut down browser: {}", e);
        }
    }
}

impl Inner {
    /// One network run for a cache miss; the result is cached on success
    ///
    /// A run that finished between the caller's cache miss and this flight
    /// starting is answered from the cache.
    async fn acquire(&self, url: Url, request: FetchRequest, key: String) -> FlightOutcome {
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Cache filled while joining for {}", key);
            return Ok((cached, false));
        }

        let timeout = Duration::from_millis(
            request
                .timeout_ms
                .unwrap_or(self.config.default_timeout_ms),
        );
        let rounds = 1 + request.retries.unwrap_or(self.config.default_retries);
        let deadline = Instant::now() + self.pipeline_budget(timeout, rounds);

        let result = self
            .run_rounds(&url, &request, timeout, rounds, deadline)
            .await?;

        self.cache.put(key, result.clone(), self.config.cache_ttl());
        Ok((result, true))
    }

    /// Upper bound on a whole run: every attempt plus every backoff, and as
    /// much again for admission
    fn pipeline_budget(&self, timeout: Duration, rounds: u32) -> Duration {
        let attempts = timeout.saturating_mul(2 * rounds);
        let backoff: Duration = (1..=rounds).map(|r| self.config.backoff_for_round(r)).sum();
        (attempts + backoff).saturating_mul(2)
    }

    fn methods(&self, first: FetchMethod) -> Vec<FetchMethod> {
        let mut methods = vec![first];
        if first == FetchMethod::Static && !self.rendering_enabled {
            return methods;
        }
        methods.push(first.other());
        methods
    }

    fn fetcher(&self, method: FetchMethod) -> &dyn Fetcher {
        match method {
            FetchMethod::Static => self.static_fetcher.as_ref(),
            FetchMethod::Rendered => self.rendered_fetcher.as_ref(),
        }
    }

    /// The fallback policy
    ///
    /// A round tries the chosen method, then the other one. Validation errors
    /// end the run at once; anything else moves on to the next attempt. Each
    /// attempt waits for the host's turn and a scheduler slot; backoff sleeps
    /// hold neither.
    async fn run_rounds(
        &self,
        url: &Url,
        request: &FetchRequest,
        timeout: Duration,
        rounds: u32,
        deadline: Instant,
    ) -> Result<FetchResult, FetchError> {
        let started = Instant::now();
        let host = host_key(url);
        let first = self.selector.select(url, request.method, deadline).await;
        let methods = self.methods(first);

        let attempt = Attempt {
            timeout,
            proxy: request
                .proxy
                .clone()
                .or_else(|| self.scheduler.proxies().current().cloned()),
        };

        let mut attempted = Vec::new();
        let mut last_error: Option<FetchError> = None;

        for round in 1..=rounds {
            let backoff = self.config.backoff_for_round(round);
            if !backoff.is_zero() {
                tracing::warn!(
                    "Retrying {} (round {}/{}) after {:?}",
                    url,
                    round,
                    rounds,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            for &method in &methods {
                attempted.push(method);
                tracing::debug!("Attempt {} for {} via {}", attempted.len(), url, method);

                let fetch = self.fetcher(method).fetch(url, request, &attempt);
                let outcome = match self.scheduler.run(&host, deadline, fetch).await {
                    Ok(outcome) => outcome,
                    Err(overdue) => {
                        if overdue == Overdue::Admission {
                            attempted.pop();
                        }
                        tracing::warn!("Giving up on {}: {}", url, overdue);
                        let message = match last_error {
                            Some(e) => format!("{}, last: {}", overdue, e.message),
                            None => overdue.to_string(),
                        };
                        return Err(FetchError::timeout(url.as_str(), message)
                            .with_history(attempted));
                    }
                };

                match outcome {
                    Ok(raw) => {
                        if attempted.len() > 1 {
                            tracing::info!(
                                "Fetched {} via {} after {} attempts",
                                url,
                                method,
                                attempted.len()
                            );
                        }
                        return Ok(normalize(
                            url,
                            raw,
                            method,
                            attempted.len() as u32,
                            started.elapsed(),
                        ));
                    }
                    Err(e) if !e.kind.is_retryable() => {
                        return Err(e.with_history(attempted));
                    }
                    Err(e) => {
                        tracing::warn!("{} fetch of {} failed: {}", method, url, e.message);
                        last_error = Some(e);
                    }
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| FetchError::network(url.as_str(), "no fetch attempted"));
        Err(FetchError {
            message: format!("all attempts failed, last: {}", error.message),
            ..error
        }
        .with_history(attempted))
    }
}

/// Builds the cacheable result of a successful attempt
///
/// Extraction output is left empty; it is computed per request.
fn normalize(
    url: &Url,
    raw: RawPage,
    method: FetchMethod,
    attempts: u32,
    elapsed: Duration,
) -> FetchResult {
    let base = Url::parse(&raw.final_url).unwrap_or_else(|_| url.clone());
    let parsed = parse_body(&raw.body, raw.content_type.as_deref(), &base);

    FetchResult {
        url: url.to_string(),
        final_url: raw.final_url,
        method,
        status_code: raw.status_code,
        content_type: raw.content_type,
        raw: raw.body,
        text: parsed.text,
        markdown: parsed.markdown,
        links: parsed.links,
        images: parsed.images,
        metadata: parsed.metadata,
        fields: Default::default(),
        warnings: Vec::new(),
        screenshot_path: raw.screenshot_path,
        performance: Performance {
            load_time_ms: elapsed.as_millis() as u64,
            attempts,
            method,
            proxy: raw.proxy,
            from_cache: false,
        },
        fetched_at: Utc::now(),
    }
}

/// Applies the request's view to a shared result
fn finish(mut result: FetchResult, request: &FetchRequest, from_cache: bool) -> FetchResult {
    let extraction = extract(&result.raw, result.content_type.as_deref(), &request.rules);
    result.fields = extraction.fields;
    result.warnings = extraction.warnings;
    result.url = request.url.clone();

    if !request.extract_links {
        result.links.clear();
    }
    if !request.extract_images {
        result.images.clear();
    }
    result.performance.from_cache = from_cache;
    result
}

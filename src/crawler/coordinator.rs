//! Crawl orchestration
//!
//! The loop keeps the frontier and visited set to itself. Page fetches run as
//! tasks in a `JoinSet`; the loop tops the set up to the scheduler ceiling,
//! reaps one completion at a time and expands its links into the frontier.

use crate::crawler::{CrawlConfig, CrawlFilter, CrawlReport, CrawlState};
use crate::engine::Engine;
use crate::model::{FetchError, FetchResult};
use crate::robots::RobotsCache;
use crate::url::{canonicalize_url, host_key};
use crate::{ConfigError, HarvestError};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

type PageOutcome = (Url, u32, Result<FetchResult, FetchError>);

/// Breadth-first crawler driving an `Engine`
pub struct Crawler {
    engine: Engine,
    stop: CancellationToken,
}

impl Crawler {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            stop: CancellationToken::new(),
        }
    }

    /// Stops admitting new pages; fetches already in flight still finish
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Token that stops the crawl when cancelled (e.g. from a ctrl-c handler)
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Crawls from `config.seed` until the frontier runs dry, `max_pages`
    /// results are collected, or the crawler is stopped
    ///
    /// Per-page fetch failures are recorded in the report, not returned.
    pub async fn crawl(&self, config: CrawlConfig) -> Result<CrawlReport, HarvestError> {
        if config.max_pages == 0 {
            return Err(ConfigError::Validation("max_pages must be at least 1".to_string()).into());
        }

        let seed = canonicalize_url(&config.seed)?;
        let filter = CrawlFilter::new(&config, &seed)?;
        let robots = if config.respect_robots {
            Some(RobotsCache::new(self.engine.http().client(None)?))
        } else {
            None
        };
        let agent = self.engine.http().user_agent().crawler_name.clone();
        let width = self.engine.scheduler().concurrency().max(1);

        tracing::info!(
            "Starting crawl of {} (max_pages={}, max_depth={})",
            seed,
            config.max_pages,
            config.max_depth
        );

        let start_time = Instant::now();
        let mut state = CrawlState::new();
        let mut in_flight: JoinSet<PageOutcome> = JoinSet::new();
        let mut results: Vec<FetchResult> = Vec::new();
        let mut failures: Vec<(String, FetchError)> = Vec::new();
        let mut completed = 0usize;

        match filter.check(&seed, 0) {
            Ok(()) => {
                state.push(seed.clone(), 0);
            }
            Err(skip) => tracing::warn!("Seed {} filtered out: {:?}", seed, skip),
        }

        loop {
            // Admit pages while there is budget and a free slot
            while !self.stop.is_cancelled()
                && in_flight.len() < width
                && in_flight.len() + results.len() < config.max_pages
            {
                let Some((url, depth)) = state.pop() else {
                    break;
                };
                if state.is_visited(&url) {
                    continue;
                }

                if let Some(robots) = &robots {
                    let policy = robots.policy_for(&url).await;
                    if !policy.is_allowed(&url, &agent) {
                        tracing::info!("URL {} disallowed by robots.txt", url);
                        continue;
                    }
                    if let Some(delay) = policy.crawl_delay(&agent) {
                        self.engine
                            .scheduler()
                            .set_crawl_delay(&host_key(&url), delay);
                    }
                }

                state.mark_visited(&url);
                tracing::debug!("Dispatching {} at depth {}", url, depth);

                let engine = self.engine.clone();
                let mut request = config.request.clone();
                request.url = url.to_string();
                request.extract_links = true;
                in_flight.spawn(async move {
                    let outcome = engine.fetch(request).await;
                    (url, depth, outcome)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            completed += 1;

            match joined {
                Ok((_, depth, Ok(result))) => {
                    let links = result.links.clone();
                    results.push(result);

                    if depth < config.max_depth && results.len() < config.max_pages {
                        let added = expand(&mut state, &filter, &links, depth + 1);
                        tracing::debug!("Queued {} new links at depth {}", added, depth + 1);
                    }
                }
                Ok((url, _, Err(e))) => {
                    tracing::error!("Error processing {}: {}", url, e);
                    failures.push((url.to_string(), e));
                }
                Err(e) => {
                    tracing::error!("Crawl task failed: {}", e);
                }
            }

            if completed % 10 == 0 {
                let rate = completed as f64 / start_time.elapsed().as_secs_f64();
                tracing::info!(
                    "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                    completed,
                    state.frontier_len(),
                    rate
                );
            }
        }

        let stopped = self.stop.is_cancelled();
        let frontier_exhausted = state.frontier_is_empty();

        tracing::info!(
            "Crawl completed: {} pages fetched, {} failed in {:?}",
            results.len(),
            failures.len(),
            start_time.elapsed()
        );

        Ok(CrawlReport {
            seed: seed.to_string(),
            results,
            failures,
            visited: state.visited_len(),
            frontier_exhausted,
            stopped,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

/// Pushes every new, filter-passing link at `depth`; returns how many were queued
fn expand(state: &mut CrawlState, filter: &CrawlFilter, links: &[String], depth: u32) -> usize {
    let mut added = 0;
    for link in links {
        let url = match canonicalize_url(link) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Failed to normalize URL {}: {}", link, e);
                continue;
            }
        };
        if state.is_known(&url) {
            continue;
        }
        match filter.check(&url, depth) {
            Ok(()) => {
                if state.push(url, depth) {
                    added += 1;
                }
            }
            Err(skip) => tracing::trace!("Skipping {}: {:?}", url, skip),
        }
    }
    added
}

//! Breadth-first crawling on top of the fetch pipeline
//!
//! A crawl starts at a seed URL (depth 0) and walks outbound links level by
//! level. Every page goes through `Engine::fetch`, so crawls share the cache,
//! the scheduler's concurrency ceiling and the per-host politeness pacer with
//! direct fetches.

mod coordinator;
mod filter;
mod state;

pub use coordinator::Crawler;
pub use filter::{CrawlFilter, Skip};
pub use state::CrawlState;

use crate::model::{FetchError, FetchRequest, FetchResult};
use serde::Serialize;

/// Bounds and filters for one crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed: String,

    /// Upper bound on successful results
    pub max_pages: usize,

    /// Links found on pages at this depth are not followed
    pub max_depth: u32,

    pub same_domain_only: bool,

    /// Extra hosts in scope when `same_domain_only` is set (`*.example.com` allowed)
    pub allowed_domains: Vec<String>,

    /// Regexes a non-seed URL must match at least one of (empty = all)
    pub include_patterns: Vec<String>,

    /// Regexes that exclude a URL outright
    pub exclude_patterns: Vec<String>,

    pub respect_robots: bool,

    /// Template for every page request; its `url` is replaced per page
    pub request: FetchRequest,
}

impl CrawlConfig {
    pub fn new(seed: impl Into<String>) -> Self {
        let seed = seed.into();
        Self {
            request: FetchRequest::new(seed.clone()),
            seed,
            max_pages: 100,
            max_depth: 2,
            same_domain_only: true,
            allowed_domains: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            respect_robots: true,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn same_domain_only(mut self, same_domain_only: bool) -> Self {
        self.same_domain_only = same_domain_only;
        self
    }

    pub fn allow_domain(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_domains.push(pattern.into());
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn respect_robots(mut self, respect_robots: bool) -> Self {
        self.respect_robots = respect_robots;
        self
    }

    pub fn with_request(mut self, request: FetchRequest) -> Self {
        self.request = request;
        self
    }
}

/// Outcome of a crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub seed: String,

    /// Successful results in completion order
    pub results: Vec<FetchResult>,

    /// Pages whose fetch failed terminally, as `(url, error)`
    pub failures: Vec<(String, FetchError)>,

    /// URLs admitted to the pipeline
    pub visited: usize,

    /// True when the crawl ended because nothing was left to visit
    pub frontier_exhausted: bool,

    /// True when `Crawler::stop` ended the crawl early
    pub stopped: bool,

    pub elapsed_ms: u64,
}

impl CrawlReport {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

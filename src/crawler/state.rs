use std::collections::{HashSet, VecDeque};
use url::Url;

/// Frontier and visited set of one crawl
///
/// URLs are keyed by their canonical form. A URL is `queued` from the moment
/// it is pushed until the crawl ends, so the same link found on many pages is
/// only enqueued once.
#[derive(Debug, Default)]
pub struct CrawlState {
    frontier: VecDeque<(Url, u32)>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `url` at `depth`; false if it was seen before
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        if self.is_known(&url) {
            return false;
        }
        self.queued.insert(url.as_str().to_string());
        self.frontier.push_back((url, depth));
        true
    }

    pub fn pop(&mut self) -> Option<(Url, u32)> {
        self.frontier.pop_front()
    }

    /// Records `url` as admitted; false if it already was
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(url.as_str().to_string())
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    pub fn is_known(&self, url: &Url) -> bool {
        self.queued.contains(url.as_str()) || self.visited.contains(url.as_str())
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn frontier_is_empty(&self) -> bool {
        self.frontier.is_empty()
    }
}

use crate::model::ProxyDescriptor;
use std::time::{Duration, Instant};

/// Time-based proxy rotation
///
/// The current proxy advances every `interval`, cycling through the list.
#[derive(Debug, Clone)]
pub struct ProxyRotator {
    proxies: Vec<ProxyDescriptor>,
    interval: Duration,
    started: Instant,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<ProxyDescriptor>, interval: Duration) -> Self {
        Self {
            proxies,
            interval,
            started: Instant::now(),
        }
    }

    /// Builds a rotator from proxy URLs
    pub fn from_urls(urls: &[String], interval: Duration) -> Self {
        Self::new(
            urls.iter().map(|u| ProxyDescriptor::new(u.clone())).collect(),
            interval,
        )
    }

    /// The proxy in effect now, if any are configured
    pub fn current(&self) -> Option<&ProxyDescriptor> {
        self.at(self.started.elapsed())
    }

    fn at(&self, elapsed: Duration) -> Option<&ProxyDescriptor> {
        if self.proxies.is_empty() {
            return None;
        }
        let interval_ms = self.interval.as_millis().max(1);
        let index = (elapsed.as_millis() / interval_ms) as usize % self.proxies.len();
        self.proxies.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }
}

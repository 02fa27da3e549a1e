//! Per-host robots.txt cache
//!
//! Each host's robots.txt is fetched once and kept for 24 hours. A missing
//! file (4xx) or an unreachable host allows everything.

use super::RobotsPolicy;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

/// How long a fetched robots.txt stays valid
const ROBOTS_TTL_HOURS: i64 = 24;

/// Cached robots.txt for one host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub policy: Arc<RobotsPolicy>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(policy: RobotsPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            fetched_at: Utc::now(),
        }
    }

    /// True once the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(ROBOTS_TTL_HOURS)
    }
}

/// Fetches and remembers robots.txt per origin
pub struct RobotsCache {
    client: Client,
    entries: DashMap<String, CachedRobots>,
}

impl RobotsCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            entries: DashMap::new(),
        }
    }

    /// The policy governing `url`, fetching robots.txt on first use
    pub async fn policy_for(&self, url: &Url) -> Arc<RobotsPolicy> {
        let origin = url.origin().ascii_serialization();

        if let Some(entry) = self.entries.get(&origin) {
            if !entry.is_stale() {
                return Arc::clone(&entry.policy);
            }
        }

        let policy = self.fetch(&origin).await;
        let entry = CachedRobots::new(policy);
        let policy = Arc::clone(&entry.policy);
        self.entries.insert(origin, entry);
        policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn fetch(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);

        let response = match self
            .client
            .get(&robots_url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("robots.txt unreachable at {}: {}", robots_url, e);
                return RobotsPolicy::allow_all();
            }
        };

        if !response.status().is_success() {
            tracing::debug!("No robots.txt at {} ({})", robots_url, response.status());
            return RobotsPolicy::allow_all();
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!("Loaded robots.txt from {}", robots_url);
                RobotsPolicy::from_content(&body)
            }
            Err(e) => {
                tracing::debug!("Failed to read robots.txt at {}: {}", robots_url, e);
                RobotsPolicy::allow_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fresh_entry_not_stale() {
        assert!(!CachedRobots::new(RobotsPolicy::allow_all()).is_stale());
    }

    #[test]
    fn test_entry_stale_after_a_day() {
        let mut entry = CachedRobots::new(RobotsPolicy::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(25);
        assert!(entry.is_stale());

        entry.fetched_at = Utc::now() - Duration::hours(23);
        assert!(!entry.is_stale());
    }

    #[tokio::test]
    async fn test_policy_fetched_once_per_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = RobotsCache::new(Client::new());
        let open = Url::parse(&format!("{}/public", server.uri())).unwrap();
        let closed = Url::parse(&format!("{}/private/x", server.uri())).unwrap();

        assert!(cache.policy_for(&open).await.is_allowed(&open, "TestBot"));
        assert!(!cache.policy_for(&closed).await.is_allowed(&closed, "TestBot"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = RobotsCache::new(Client::new());
        let url = Url::parse(&format!("{}/anything", server.uri())).unwrap();
        assert!(cache.policy_for(&url).await.is_allowed(&url, "TestBot"));
    }
}

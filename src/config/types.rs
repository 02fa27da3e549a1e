use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Fetch pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Maximum number of fetch pipelines running at once
    pub concurrency: usize,

    /// Minimum time between request starts to the same host (milliseconds)
    pub politeness_delay_ms: u64,

    /// How long a fetched page stays in the result cache (seconds)
    pub cache_ttl_secs: u64,

    /// Per-attempt deadline when a request does not set one (milliseconds)
    pub default_timeout_ms: u64,

    /// Retry rounds when a request does not set its own budget
    pub default_retries: u32,

    /// Backoff before the second round; doubles every round (milliseconds)
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff (milliseconds)
    pub backoff_max_ms: u64,

    /// Maximum redirects followed by a static fetch
    pub max_redirects: usize,

    /// Sniff ambiguous URLs before choosing a method
    pub sniff: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            politeness_delay_ms: 250,
            cache_ttl_secs: 3600,
            default_timeout_ms: 30_000,
            default_retries: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            max_redirects: 10,
            sniff: true,
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    /// Backoff slept before retry round `round` (1-based, round 1 has none)
    pub fn backoff_for_round(&self, round: u32) -> Duration {
        if round <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(round - 2).unwrap_or(u64::MAX);
        let ms = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.backoff_max_ms))
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Allow rendered fetches at all
    pub enabled: bool,

    /// Chromium binary; searched on PATH when unset
    pub executable: Option<PathBuf>,

    /// Maximum concurrently open browser pages
    pub max_contexts: usize,

    /// Where screenshots are written
    pub screenshot_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: None,
            max_contexts: 4,
            screenshot_dir: PathBuf::from("./screenshots"),
        }
    }
}

/// Proxy rotation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Proxies rotated among for requests without an explicit proxy
    pub urls: Vec<String>,

    /// How long each proxy stays current (seconds)
    pub rotate_interval_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            rotate_interval_secs: 300,
        }
    }
}

/// Distributed job queue configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Path to the SQLite queue database
    pub database_path: String,

    /// Attempts before a job is marked failed
    pub max_attempts: u32,

    /// Workers spawned by `sumi-harvest worker`
    pub workers: usize,

    /// Idle wait between polls of an empty queue (milliseconds)
    pub poll_interval_ms: u64,

    /// Requeue delay after the first failure; doubles per attempt (milliseconds)
    pub backoff_base_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: "./harvest-queue.db".to_string(),
            max_attempts: 5,
            workers: 2,
            poll_interval_ms: 1000,
            backoff_base_ms: 2000,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Requeue delay after the `attempt`-th failed attempt (1-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << shift))
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// JSON-lines file finished results are appended to
    pub results_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = EngineConfig {
            backoff_base_ms: 100,
            backoff_max_ms: 350,
            ..EngineConfig::default()
        };
        assert_eq!(config.backoff_for_round(1), Duration::ZERO);
        assert_eq!(config.backoff_for_round(2), Duration::from_millis(100));
        assert_eq!(config.backoff_for_round(3), Duration::from_millis(200));
        assert_eq!(config.backoff_for_round(4), Duration::from_millis(350));
        assert_eq!(config.backoff_for_round(80), Duration::from_millis(350));
    }

    #[test]
    fn test_queue_backoff_doubles() {
        let config = QueueConfig {
            backoff_base_ms: 1000,
            ..QueueConfig::default()
        };
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        assert_eq!(
            ua.header_value(),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }
}

//! Fetch method selection
//!
//! Static fetching is cheap and correct for most of the web; rendering is
//! reserved for pages whose content only exists after client-side scripts
//! run. Selection is layered:
//!
//! 1. A forced preference always wins.
//! 2. URL heuristics (extensions, documentation hosts, SPA routes).
//! 3. Sniffing: HEAD for the content type, then a truncated GET sniffed for
//!    client-framework mount points. Verdicts are memoized per host.
//! 4. Default to static; the fallback policy recovers if that was wrong.

use crate::fetch::StaticFetcher;
use crate::model::{FetchMethod, MethodPreference};
use crate::scheduler::Scheduler;
use crate::url::{host_key, is_route_fragment};
use dashmap::DashMap;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Bytes of the document read when sniffing
pub const SNIFF_BYTES: usize = 32 * 1024;

const SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

const STATIC_EXTENSIONS: &[&str] = &[".html", ".htm", ".md", ".txt", ".pdf", ".xml", ".json"];

const STATIC_HOST_PREFIXES: &[&str] = &["docs.", "blog.", "wiki."];

const SPA_ROUTE_PREFIXES: &[&str] = &["/app/", "/dashboard/", "/#/"];

/// Mount points and data attributes left by client-side frameworks
const FRAMEWORK_MARKERS: &[&str] = &[
    r#"id="root""#,
    r#"id="app""#,
    r#"id="__next""#,
    "__NEXT_DATA__",
    "__NUXT__",
    "data-reactroot",
    "ng-version",
    "data-server-rendered",
    "data-v-app",
];

/// Bundler output names such as `main.3f9a1c2b.js`
static BUNDLE_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9_-]+\.[0-9a-f]{8,}\.(?:js|mjs)$").expect("hardcoded regex pattern is valid")
});

/// Classifies a URL from its shape alone
///
/// Returns `None` when the URL carries no signal either way.
pub fn heuristic(url: &Url) -> Option<FetchMethod> {
    let path = url.path().to_ascii_lowercase();

    if BUNDLE_HASH.is_match(&path) {
        return Some(FetchMethod::Rendered);
    }

    if let Some(fragment) = url.fragment() {
        if is_route_fragment(fragment) {
            return Some(FetchMethod::Rendered);
        }
    }

    if SPA_ROUTE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix) || path == prefix.trim_end_matches('/'))
    {
        return Some(FetchMethod::Rendered);
    }

    if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Some(FetchMethod::Static);
    }

    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    if STATIC_HOST_PREFIXES
        .iter()
        .any(|prefix| host.starts_with(prefix) || host.contains(&format!(".{}", prefix)))
    {
        return Some(FetchMethod::Static);
    }

    None
}

/// True when the markup looks like a client-rendered application shell
pub fn has_framework_marker(html: &str) -> bool {
    FRAMEWORK_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Picks the fetch method for a URL
///
/// Sniffing requests observe the scheduler's per-host politeness delay.
pub struct StrategySelector {
    http: Arc<StaticFetcher>,
    scheduler: Arc<Scheduler>,
    sniff_enabled: bool,
    verdicts: DashMap<String, FetchMethod>,
}

impl StrategySelector {
    pub fn new(http: Arc<StaticFetcher>, scheduler: Arc<Scheduler>, sniff_enabled: bool) -> Self {
        Self {
            http,
            scheduler,
            sniff_enabled,
            verdicts: DashMap::new(),
        }
    }

    /// Returns the method to try first
    ///
    /// A sniff that cannot get its host's turn before `deadline` is skipped.
    pub async fn select(
        &self,
        url: &Url,
        preference: MethodPreference,
        deadline: Instant,
    ) -> FetchMethod {
        if let Some(forced) = preference.forced() {
            return forced;
        }

        if let Some(method) = heuristic(url) {
            tracing::debug!("Heuristic picked {} for {}", method, url);
            return method;
        }

        if !self.sniff_enabled {
            return FetchMethod::Static;
        }

        let host = host_key(url);
        if let Some(method) = self.verdicts.get(&host) {
            return *method;
        }

        let method = self.sniff(url, &host, deadline).await;
        tracing::debug!("Sniff picked {} for host {}", method, host);
        self.verdicts.insert(host, method);
        method
    }

    /// Memoized sniff verdict for a host, if any
    pub fn cached_verdict(&self, host: &str) -> Option<FetchMethod> {
        self.verdicts.get(host).map(|m| *m)
    }

    async fn sniff(&self, url: &Url, host: &str, deadline: Instant) -> FetchMethod {
        let client = match self.http.client(None) {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("Sniff client unavailable: {}", e);
                return FetchMethod::Static;
            }
        };

        if !self.scheduler.pace(host, deadline).await {
            return FetchMethod::Static;
        }
        match client.head(url.clone()).timeout(SNIFF_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_ascii_lowercase);
                if let Some(ct) = content_type {
                    if !ct.contains("html") {
                        return FetchMethod::Static;
                    }
                }
            }
            // Servers that reject HEAD still get sniffed
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Sniff HEAD failed for {}: {}", url, e);
                return FetchMethod::Static;
            }
        }

        if !self.scheduler.pace(host, deadline).await {
            return FetchMethod::Static;
        }
        match read_prefix(&client, url).await {
            Some(prefix) if has_framework_marker(&prefix) => FetchMethod::Rendered,
            _ => FetchMethod::Static,
        }
    }
}

/// Reads at most `SNIFF_BYTES` of the document
async fn read_prefix(client: &reqwest::Client, url: &Url) -> Option<String> {
    let mut response = client
        .get(url.clone())
        .timeout(SNIFF_TIMEOUT)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    let mut buffer = Vec::with_capacity(SNIFF_BYTES);
    while buffer.len() < SNIFF_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(_) => break,
        }
    }
    buffer.truncate(SNIFF_BYTES);
    Some(String::from_utf8_lossy(&buffer).into_owned())
}

//! Static HTTP fetcher
//!
//! Plain GET with the crawler user agent, custom headers and auth, a redirect
//! budget and an optional proxy. One reqwest client is built per distinct
//! proxy and reused for the lifetime of the fetcher.

use super::{Attempt, Fetcher, RawPage};
use crate::config::UserAgentConfig;
use crate::model::{FetchError, FetchErrorKind, FetchMethod, FetchRequest, ProxyDescriptor};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Key of the direct (no proxy) client in the client map
const DIRECT: &str = "";

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `max_redirects` - Redirect hops followed before giving up
/// * `proxy` - Upstream proxy, if any
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::fetch::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), 10, None).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    max_redirects: usize,
    proxy: Option<&ProxyDescriptor>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(max_redirects))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy.to_reqwest()?);
    }

    builder.build()
}

/// Fetcher for `FetchMethod::Static`
pub struct StaticFetcher {
    user_agent: UserAgentConfig,
    max_redirects: usize,
    clients: DashMap<String, Client>,
}

impl StaticFetcher {
    pub fn new(user_agent: UserAgentConfig, max_redirects: usize) -> Self {
        Self {
            user_agent,
            max_redirects,
            clients: DashMap::new(),
        }
    }

    /// Client for `proxy`, built on first use
    pub fn client(&self, proxy: Option<&ProxyDescriptor>) -> Result<Client, reqwest::Error> {
        let key = proxy.map_or(DIRECT, |p| p.url.as_str());
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.user_agent, self.max_redirects, proxy)?;
        Ok(self
            .clients
            .entry(key.to_string())
            .or_insert(client)
            .clone())
    }

    /// Number of distinct clients built so far
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn user_agent(&self) -> &UserAgentConfig {
        &self.user_agent
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Static
    }

    /// Fetches a URL once
    ///
    /// # Error classification
    ///
    /// | Condition | Kind |
    /// |-----------|------|
    /// | Non-2xx final status | `http{status}` |
    /// | Redirect budget exhausted | `http{0}` |
    /// | Deadline exceeded | `timeout` |
    /// | DNS, connect, TLS, reset | `network` |
    async fn fetch(
        &self,
        url: &Url,
        request: &FetchRequest,
        attempt: &Attempt,
    ) -> Result<RawPage, FetchError> {
        let client = self
            .client(attempt.proxy.as_ref())
            .map_err(|e| FetchError::network(url.as_str(), format!("client setup failed: {}", e)))?;

        let mut builder = client.get(url.clone()).timeout(attempt.timeout);
        for (name, value) in request.outgoing_headers() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::new(
                FetchErrorKind::Http {
                    status: status.as_u16(),
                },
                url.as_str(),
                format!("server answered {}", status),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        tracing::debug!(
            "Static fetch of {} -> {} ({} bytes)",
            url,
            status.as_u16(),
            body.len()
        );

        Ok(RawPage {
            final_url,
            status_code: Some(status.as_u16()),
            content_type,
            body,
            screenshot_path: None,
            proxy: attempt.proxy.as_ref().map(|p| p.url.clone()),
        })
    }
}

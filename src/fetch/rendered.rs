//! Headless-browser fetcher
//!
//! Leases a page from the [`BrowserPool`], navigates, optionally waits for a
//! selector, then reads the live DOM. The lease is released on every exit
//! path; an attempt cancelled by its deadline drops the lease, which closes
//! the page in the background.

use super::{Attempt, Fetcher, RawPage};
use crate::model::{FetchError, FetchErrorKind, FetchMethod, FetchRequest};
use crate::renderer::{BrowserPool, NavigationTimeout, RenderContext};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Interval between `wait_for` selector checks
const WAIT_FOR_POLL: Duration = Duration::from_millis(100);

/// Fetcher for `FetchMethod::Rendered`
pub struct RenderedFetcher {
    pool: Arc<BrowserPool>,
    screenshot_dir: PathBuf,
}

impl RenderedFetcher {
    pub fn new(pool: Arc<BrowserPool>, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            screenshot_dir: screenshot_dir.into(),
        }
    }

    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    async fn render(
        &self,
        url: &Url,
        request: &FetchRequest,
        deadline: Instant,
    ) -> Result<RawPage, FetchError> {
        let mut lease = self
            .pool
            .lease()
            .await
            .map_err(|e| crash(url, "browser unavailable", e))?;

        let outcome = async {
            let page = lease
                .page()
                .map_err(|e| crash(url, "browser page lost", e))?;
            self.drive(page, url, request, deadline).await
        }
        .await;

        lease.release().await;
        outcome
    }

    async fn drive(
        &self,
        page: &mut dyn RenderContext,
        url: &Url,
        request: &FetchRequest,
        deadline: Instant,
    ) -> Result<RawPage, FetchError> {
        page.set_extra_headers(&request.outgoing_headers())
            .await
            .map_err(|e| crash(url, "failed to set headers", e))?;

        let nav = page
            .navigate(url.as_str(), remaining_ms(deadline))
            .await
            .map_err(|e| classify_navigation(url, e))?;

        if let Some(status) = nav.status.filter(|s| *s >= 400) {
            return Err(FetchError::new(
                FetchErrorKind::Http { status },
                url.as_str(),
                format!("server answered {}", status),
            ));
        }

        if let Some(selector) = &request.wait_for {
            wait_for_selector(page, url, selector, deadline).await?;
        }

        let body = page
            .get_html()
            .await
            .map_err(|e| crash(url, "failed to read DOM", e))?;

        let final_url = match page.get_url().await {
            Ok(current) if !current.is_empty() => current,
            _ => nav.final_url,
        };

        let screenshot_path = if request.screenshot {
            let png = page
                .screenshot()
                .await
                .map_err(|e| crash(url, "screenshot failed", e))?;
            Some(self.write_screenshot(url, &png).await?)
        } else {
            None
        };

        tracing::debug!(
            "Rendered {} in {}ms ({} bytes)",
            url,
            nav.load_time_ms,
            body.len()
        );

        Ok(RawPage {
            final_url,
            status_code: nav.status,
            content_type: Some("text/html".to_string()),
            body,
            screenshot_path,
            // Pages share one browser process; per-request proxies are not applied.
            proxy: None,
        })
    }

    async fn write_screenshot(&self, url: &Url, png: &[u8]) -> Result<PathBuf, FetchError> {
        let path = screenshot_path(&self.screenshot_dir, url);
        let io_err = |e: std::io::Error| {
            FetchError::new(
                FetchErrorKind::RenderCrash,
                url.as_str(),
                format!("failed to write screenshot {}: {}", path.display(), e),
            )
        };
        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .map_err(io_err)?;
        tokio::fs::write(&path, png).await.map_err(io_err)?;
        Ok(path)
    }
}

#[async_trait]
impl Fetcher for RenderedFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Rendered
    }

    async fn fetch(
        &self,
        url: &Url,
        request: &FetchRequest,
        attempt: &Attempt,
    ) -> Result<RawPage, FetchError> {
        let deadline = Instant::now() + attempt.timeout;

        match tokio::time::timeout_at(deadline, self.render(url, request, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                FetchErrorKind::RenderTimeout,
                url.as_str(),
                format!("render exceeded {}ms", attempt.timeout.as_millis()),
            )),
        }
    }
}

fn crash(url: &Url, context: &str, error: anyhow::Error) -> FetchError {
    FetchError::new(
        FetchErrorKind::RenderCrash,
        url.as_str(),
        format!("{}: {:#}", context, error),
    )
}

/// Maps a navigation failure to a fetch error kind
///
/// Chromium reports network failures as `net::ERR_*`.
fn classify_navigation(url: &Url, error: anyhow::Error) -> FetchError {
    if error.downcast_ref::<NavigationTimeout>().is_some() {
        return FetchError::new(FetchErrorKind::RenderTimeout, url.as_str(), error.to_string());
    }
    let message = format!("{:#}", error);
    if message.contains("net::ERR_") {
        FetchError::network(url.as_str(), message)
    } else {
        FetchError::new(FetchErrorKind::RenderCrash, url.as_str(), message)
    }
}

async fn wait_for_selector(
    page: &mut dyn RenderContext,
    url: &Url,
    selector: &str,
    deadline: Instant,
) -> Result<(), FetchError> {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!("document.querySelector({}) !== null", quoted);

    loop {
        match page.execute_js(&script).await {
            Ok(serde_json::Value::Bool(true)) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(crash(url, "wait_for check failed", e)),
        }

        if Instant::now() + WAIT_FOR_POLL >= deadline {
            return Err(FetchError::new(
                FetchErrorKind::RenderTimeout,
                url.as_str(),
                format!("selector '{}' never appeared", selector),
            ));
        }
        tokio::time::sleep(WAIT_FOR_POLL).await;
    }
}

fn remaining_ms(deadline: Instant) -> u64 {
    deadline
        .saturating_duration_since(Instant::now())
        .as_millis()
        .max(1) as u64
}

/// `<dir>/<host>-<timestamp>.png`
fn screenshot_path(dir: &Path, url: &Url) -> PathBuf {
    let host: String = url
        .host_str()
        .unwrap_or("page")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    dir.join(format!(
        "{}-{}.png",
        host,
        Utc::now().format("%Y%m%dT%H%M%S%.3f")
    ))
}

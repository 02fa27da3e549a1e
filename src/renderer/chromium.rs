//! Chromium-based renderer using chromiumoxide

use super::{NavigationResult, NavigationTimeout, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const HANDLER_DRAIN: Duration = Duration::from_secs(5);

/// Environment variable naming an explicit Chromium binary
pub const CHROMIUM_PATH_ENV: &str = "SUMI_CHROMIUM_PATH";

/// Finds the Chromium binary
///
/// Order: `SUMI_CHROMIUM_PATH`, then the usual binary names on `PATH`, then the
/// standard macOS install location.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium instance
///
/// The browser is taken out on [`Renderer::shutdown`]; later contexts fail.
pub struct ChromiumRenderer {
    browser: RwLock<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launches headless Chromium
    ///
    /// `executable` overrides discovery via [`find_chromium`].
    pub async fn launch(executable: Option<&Path>, user_agent: &str) -> Result<Self> {
        let chrome_path = match executable {
            Some(path) => path.to_path_buf(),
            None => find_chromium().context("Chromium not found; set browser.executable")?,
        };

        tracing::info!("Launching headless Chromium from {}", chrome_path.display());

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: RwLock::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        let handler = self.handler.get_mut().map(Option::take).unwrap_or(None);
        if let Some(handler) = handler {
            handler.abort();
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let browser = self.browser.read().await;
        let Some(browser) = browser.as_ref() else {
            bail!("renderer has been shut down");
        };
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };

        browser.close().await.context("failed to close Chromium")?;
        browser.wait().await.context("failed to reap Chromium process")?;

        let handler = self
            .handler
            .lock()
            .map_err(|_| anyhow::anyhow!("browser handler lock poisoned"))?
            .take();
        if let Some(mut handler) = handler {
            if tokio::time::timeout(HANDLER_DRAIN, &mut handler).await.is_err() {
                handler.abort();
            }
        }

        tracing::info!("Chromium shut down");
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<()> {
        if headers.is_empty() {
            return Ok(());
        }
        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(map),
            )))
            .await
            .context("failed to set extra headers")?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    // chromiumoxide does not surface the document status here
                    status: None,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => Err(NavigationTimeout(timeout_ms).into()),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to read page HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .context("failed to capture screenshot")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

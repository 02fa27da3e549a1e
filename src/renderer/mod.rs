//! Browser abstraction for rendered fetches
//!
//! `Renderer` and `RenderContext` hide the browser engine (Chromium via
//! chromiumoxide) so the fetch pipeline and its tests never depend on a real
//! browser. `BrowserPool` owns one renderer and hands out bounded page leases.

pub mod chromium;
mod pool;

pub use chromium::{find_chromium, ChromiumRenderer};
pub use pool::{BrowserPool, PageLease};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects and client-side navigation
    pub final_url: String,
    /// Main document status, when the driver exposes it
    pub status: Option<u16>,
    pub load_time_ms: u64,
}

/// Navigation exceeded its deadline
///
/// Returned (inside `anyhow::Error`) by `RenderContext::navigate` so callers
/// can tell a slow page from a broken browser.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("navigation timed out after {0}ms")]
pub struct NavigationTimeout(pub u64);

/// A browser engine that can create rendering contexts
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab)
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab)
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Headers added to every request the page makes
    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<()>;
    /// Navigate and wait for the load to settle
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Serialized live DOM
    async fn get_html(&self) -> Result<String>;
    async fn get_url(&self) -> Result<String>;
    /// Full-page PNG
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Renderer used when the browser is disabled or missing
///
/// Every rendered fetch fails with `render-crash`; static fetches are
/// unaffected.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available, static-only mode"))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_renderer_refuses_contexts() {
        let renderer = NoopRenderer;
        assert!(renderer.new_context().await.is_err());
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.unwrap();
    }

    #[test]
    fn test_navigation_timeout_downcast() {
        let err: anyhow::Error = NavigationTimeout(1500).into();
        assert_eq!(err.downcast_ref::<NavigationTimeout>().map(|t| t.0), Some(1500));
        assert_eq!(err.to_string(), "navigation timed out after 1500ms");
    }
}

//! Shared fixtures for the integration tests

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sumi_harvest::config::Config;
use sumi_harvest::renderer::{NavigationResult, RenderContext, Renderer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration tuned for fast, deterministic tests
///
/// No politeness delay, no content sniffing, no browser and a single round per fetch.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.politeness_delay_ms = 0;
    config.engine.default_retries = 0;
    config.engine.default_timeout_ms = 5_000;
    config.engine.backoff_base_ms = 1;
    config.engine.backoff_max_ms = 5;
    config.engine.sniff = false;
    config.browser.enabled = false;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

/// A minimal HTML document with a title and anchors
pub fn html_page(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!("<a href=\"{}\">{}</a>\n", l, l))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>\n{}</body></html>",
        title, title, anchors
    )
}

/// Mounts an HTML page at `route`
pub async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/html"),
        )
        .mount(server)
        .await;
}

/// Renderer whose pages always serve one fixed document
pub struct FixedRenderer {
    html: String,
    pub opened: Arc<AtomicUsize>,
    pub open: Arc<AtomicUsize>,
}

impl FixedRenderer {
    pub fn new(html: &str) -> Arc<Self> {
        Arc::new(Self {
            html: html.to_string(),
            opened: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for FixedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixedPage {
            html: self.html.clone(),
            url: String::new(),
            open: Arc::clone(&self.open),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

struct FixedPage {
    html: String,
    url: String,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for FixedPage {
    async fn set_extra_headers(&mut self, _headers: &[(String, String)]) -> Result<()> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.url = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: Some(200),
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Bool(true))
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

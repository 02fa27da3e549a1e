//! Fetchers: one per `FetchMethod`
//!
//! A fetcher performs a single attempt and returns the raw page. Choosing a
//! method, retrying and falling back belong to the engine; turning the raw
//! page into a `FetchResult` belongs to [`parser`].

pub mod http;
pub mod parser;
pub mod rendered;

pub use http::{build_http_client, StaticFetcher};
pub use parser::{parse_body, parse_html, ParsedPage};
pub use rendered::RenderedFetcher;

use crate::model::{FetchError, FetchMethod, FetchRequest, ProxyDescriptor};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Per-attempt parameters decided by the engine
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Deadline for this attempt
    pub timeout: Duration,
    /// Request proxy, or the rotated proxy when the request has none
    pub proxy: Option<ProxyDescriptor>,
}

/// What one successful attempt produced, before normalization
#[derive(Debug, Clone)]
pub struct RawPage {
    pub final_url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub body: String,
    pub screenshot_path: Option<PathBuf>,
    /// Proxy actually used
    pub proxy: Option<String>,
}

/// A single-attempt page fetcher
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn method(&self) -> FetchMethod;

    async fn fetch(
        &self,
        url: &Url,
        request: &FetchRequest,
        attempt: &Attempt,
    ) -> Result<RawPage, FetchError>;
}

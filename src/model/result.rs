use super::FetchMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Document-level metadata, when derivable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

/// Timing and provenance of a fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Wall-clock time of the whole pipeline run, including retries
    pub load_time_ms: u64,
    /// Number of fetch attempts across all rounds
    pub attempts: u32,
    pub method: FetchMethod,
    /// Proxy URL used for the successful attempt
    pub proxy: Option<String>,
    /// Served from the result cache without a network operation
    pub from_cache: bool,
}

/// A rule that fell back to its default
///
/// Reported alongside a successful result; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub rule: String,
    pub message: String,
}

/// Normalized output of a successful fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL as requested
    pub url: String,
    /// URL after redirects or client-side navigation
    pub final_url: String,
    /// Method that produced this content
    pub method: FetchMethod,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    /// Body as returned by the server, or the serialized rendered DOM
    pub raw: String,
    /// Visible text with whitespace collapsed
    pub text: String,
    /// Markdown rendering of the main document
    pub markdown: String,
    /// Absolute, deduplicated outbound links
    pub links: Vec<String>,
    /// Absolute, deduplicated image references
    pub images: Vec<String>,
    pub metadata: PageMetadata,
    /// Output of the request's extraction rules
    pub fields: BTreeMap<String, Value>,
    pub warnings: Vec<ExtractionWarning>,
    pub screenshot_path: Option<PathBuf>,
    pub performance: Performance,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }

    /// True when every extraction rule matched
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

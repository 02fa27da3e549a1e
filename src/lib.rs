//! Sumi-Harvest: an adaptive content-acquisition engine
//!
//! This crate fetches remote pages by the cheapest method that works (plain HTTP
//! or a headless browser), falls back when that fails, crawls link graphs under
//! depth and domain constraints, and turns raw responses into structured, cached,
//! rate-limited results.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod dispatch;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod output;
pub mod renderer;
pub mod robots;
pub mod scheduler;
pub mod strategy;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] model::FetchError),

    #[error("Queue error: {0}")]
    Queue(#[from] dispatch::QueueError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlConfig, CrawlReport, Crawler};
pub use engine::Engine;
pub use model::{
    ExtractionRule, FetchError, FetchErrorKind, FetchMethod, FetchRequest, FetchResult,
    MethodPreference,
};
pub use url::{canonicalize_url, extract_domain};

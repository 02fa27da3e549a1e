use super::FetchMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FetchErrorKind {
    /// DNS, connect, TLS or reset
    Network,
    /// Non-2xx status after the redirect budget; status 0 when the budget ran out
    Http { status: u16 },
    /// Per-attempt deadline exceeded
    Timeout,
    /// Browser navigation or wait condition exceeded the deadline
    RenderTimeout,
    /// Browser unavailable, crashed, or the page could not be read
    RenderCrash,
    /// Malformed request, rejected before any network activity
    Validation,
    /// Distributed job exceeded its attempt budget
    QueueExhausted,
}

impl FetchErrorKind {
    /// Whether the fallback/retry policy applies to this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation | Self::QueueExhausted)
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Self::RenderTimeout | Self::RenderCrash)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Http { status } => write!(f, "http {}", status),
            Self::Timeout => f.write_str("timeout"),
            Self::RenderTimeout => f.write_str("render-timeout"),
            Self::RenderCrash => f.write_str("render-crash"),
            Self::Validation => f.write_str("validation"),
            Self::QueueExhausted => f.write_str("queue-exhausted"),
        }
    }
}

/// Typed fetch failure
///
/// Terminal errors carry enough context (URL, attempted methods, attempt count)
/// to diagnose a failure without server-side logs.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} error for {url} after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    /// Methods tried, in order
    pub attempted: Vec<FetchMethod>,
    pub attempts: u32,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            attempted: Vec::new(),
            attempts: 0,
            message: message.into(),
        }
    }

    pub fn validation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Validation, url, message)
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, url, message)
    }

    pub fn timeout(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, url, message)
    }

    /// Records a single attempt with `method`
    pub fn attempted_with(mut self, method: FetchMethod) -> Self {
        self.attempted = vec![method];
        self.attempts = 1;
        self
    }

    /// Replaces the attempt history (used when the retry budget is exhausted)
    pub fn with_history(mut self, attempted: Vec<FetchMethod>) -> Self {
        self.attempts = attempted.len() as u32;
        self.attempted = attempted;
        self
    }

    /// Classifies a reqwest error
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url, "request timed out")
        } else if let Some(status) = error.status() {
            Self::new(FetchErrorKind::Http { status: status.as_u16() }, url, error.to_string())
        } else if error.is_redirect() {
            Self::new(FetchErrorKind::Http { status: 0 }, url, "redirect budget exhausted")
        } else {
            Self::network(url, error.to_string())
        }
    }
}

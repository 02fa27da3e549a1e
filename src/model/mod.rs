//! Request/response contracts of the acquisition engine
//!
//! - `FetchRequest`: what a caller asks for
//! - `FetchResult`: normalized content plus extraction output and timings
//! - `ExtractionRule`: declarative field extraction
//! - `FetchError`: the typed terminal error

mod error;
mod request;
mod result;
mod rule;

pub use error::{FetchError, FetchErrorKind};
pub use request::{AuthDescriptor, FetchRequest, ProxyDescriptor};
pub use result::{ExtractionWarning, FetchResult, PageMetadata, Performance};
pub use rule::{ExtractionRule, Locator, Transform};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a page is acquired
///
/// This is a closed set; every variant has exactly one fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    /// Plain HTTP GET, no script execution
    Static,
    /// Headless browser, post-JavaScript DOM
    Rendered,
}

impl FetchMethod {
    /// The method tried when this one fails
    pub fn other(self) -> Self {
        match self {
            Self::Static => Self::Rendered,
            Self::Rendered => Self::Static,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's method preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPreference {
    Static,
    Rendered,
    /// Let the strategy selector decide
    #[default]
    Auto,
}

impl MethodPreference {
    /// Returns the method when the caller forced one
    pub fn forced(self) -> Option<FetchMethod> {
        match self {
            Self::Static => Some(FetchMethod::Static),
            Self::Rendered => Some(FetchMethod::Rendered),
            Self::Auto => None,
        }
    }
}

impl std::str::FromStr for MethodPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "rendered" | "dynamic" => Ok(Self::Rendered),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown fetch method '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_method() {
        assert_eq!(FetchMethod::Static.other(), FetchMethod::Rendered);
        assert_eq!(FetchMethod::Rendered.other(), FetchMethod::Static);
    }

    #[test]
    fn test_preference_forced() {
        assert_eq!(MethodPreference::Auto.forced(), None);
        assert_eq!(
            MethodPreference::Rendered.forced(),
            Some(FetchMethod::Rendered)
        );
    }

    #[test]
    fn test_preference_from_str() {
        assert_eq!("STATIC".parse(), Ok(MethodPreference::Static));
        assert_eq!("auto".parse(), Ok(MethodPreference::Auto));
        assert!("websocket".parse::<MethodPreference>().is_err());
    }

    #[test]
    fn test_method_serde_lowercase() {
        let json = serde_json::to_string(&FetchMethod::Rendered).unwrap();
        assert_eq!(json, "\"rendered\"");
    }
}

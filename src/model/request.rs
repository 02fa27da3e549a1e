use super::{ExtractionRule, FetchError, MethodPreference};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Upstream proxy for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    /// Proxy URL, e.g. `http://10.0.0.1:3128`
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyDescriptor {
    /// Schemes the HTTP client can tunnel through
    pub const SCHEMES: &'static [&'static str] = &["http", "https"];

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Builds the reqwest proxy for this descriptor
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        let proxy = reqwest::Proxy::all(&self.url)?;
        Ok(match (&self.username, &self.password) {
            (Some(user), pass) => proxy.basic_auth(user, pass.as_deref().unwrap_or("")),
            _ => proxy,
        })
    }
}

/// Credentials attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthDescriptor {
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
    /// Arbitrary header, e.g. an API key
    Header {
        name: String,
        value: String,
    },
}

impl AuthDescriptor {
    /// The header this credential produces
    pub fn header(&self) -> (String, String) {
        match self {
            Self::Basic { username, password } => {
                let raw = format!("{}:{}", username, password.as_deref().unwrap_or(""));
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                ("Authorization".to_string(), format!("Basic {}", encoded))
            }
            Self::Bearer { token } => ("Authorization".to_string(), format!("Bearer {}", token)),
            Self::Header { name, value } => (name.clone(), value.clone()),
        }
    }
}

/// A request to acquire one URL
///
/// `timeout_ms` and `retries` fall back to the engine defaults when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,

    #[serde(default)]
    pub method: MethodPreference,

    /// Per-attempt deadline in milliseconds; must be > 0
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Extra rounds after the first (static + rendered) round
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub proxy: Option<ProxyDescriptor>,

    #[serde(default)]
    pub auth: Option<AuthDescriptor>,

    #[serde(default)]
    pub rules: Vec<ExtractionRule>,

    #[serde(default = "default_true")]
    pub extract_links: bool,

    #[serde(default)]
    pub extract_images: bool,

    /// Persist a screenshot of the rendered page
    #[serde(default)]
    pub screenshot: bool,

    /// CSS selector a rendered fetch waits for before reading the DOM
    #[serde(default)]
    pub wait_for: Option<String>,
}

fn default_true() -> bool {
    true
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: MethodPreference::Auto,
            timeout_ms: None,
            retries: None,
            headers: BTreeMap::new(),
            proxy: None,
            auth: None,
            rules: Vec::new(),
            extract_links: true,
            extract_images: false,
            screenshot: false,
            wait_for: None,
        }
    }

    pub fn with_method(mut self, method: MethodPreference) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyDescriptor) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_auth(mut self, auth: AuthDescriptor) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_rule(mut self, rule: ExtractionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_images(mut self, extract_images: bool) -> Self {
        self.extract_images = extract_images;
        self
    }

    pub fn with_screenshot(mut self, screenshot: bool) -> Self {
        self.screenshot = screenshot;
        self
    }

    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    /// Checks the request before any network activity
    ///
    /// Returns the parsed target URL on success.
    pub fn validate(&self) -> Result<Url, FetchError> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| FetchError::validation(&self.url, format!("malformed URL: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FetchError::validation(
                &self.url,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::validation(&self.url, "URL has no host"));
        }

        if self.timeout_ms == Some(0) {
            return Err(FetchError::validation(&self.url, "timeout must be > 0"));
        }

        for (name, value) in &self.headers {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(FetchError::validation(
                    &self.url,
                    format!("invalid header name '{}'", name),
                ));
            }
            if reqwest::header::HeaderValue::from_str(value).is_err() {
                return Err(FetchError::validation(
                    &self.url,
                    format!("invalid value for header '{}'", name),
                ));
            }
        }

        if let Some(proxy) = &self.proxy {
            let Ok(proxy_url) = Url::parse(&proxy.url) else {
                return Err(FetchError::validation(
                    &self.url,
                    format!("malformed proxy URL '{}'", proxy.url),
                ));
            };
            if !ProxyDescriptor::SCHEMES.contains(&proxy_url.scheme()) {
                return Err(FetchError::validation(
                    &self.url,
                    format!("unsupported proxy scheme '{}'", proxy_url.scheme()),
                ));
            }
        }

        if self.rules.iter().any(|r| r.name.trim().is_empty()) {
            return Err(FetchError::validation(&self.url, "extraction rule without a name"));
        }

        Ok(url)
    }

    /// Custom headers plus the auth header, in send order
    pub fn outgoing_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(auth) = &self.auth {
            headers.push(auth.header());
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FetchErrorKind;

    #[test]
    fn test_valid_request() {
        let url = FetchRequest::new("https://example.test/a").validate().unwrap();
        assert_eq!(url.host_str(), Some("example.test"));
    }

    #[test]
    fn test_relative_url_rejected() {
        let err = FetchRequest::new("/relative").validate().unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Validation);
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let err = FetchRequest::new("file:///etc/passwd").validate().unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Validation);
    }

    #[test]
    fn test_socks_proxy_rejected() {
        let request = FetchRequest::new("https://example.com/")
            .with_proxy(ProxyDescriptor::new("socks5://proxy.test:1080"));
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Validation);

        let request = FetchRequest::new("https://example.com/")
            .with_proxy(ProxyDescriptor::new("http://proxy.test:3128"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut req = FetchRequest::new("https://example.test/");
        req.timeout_ms = Some(0);
        assert_eq!(req.validate().unwrap_err().kind, FetchErrorKind::Validation);
    }

    #[test]
    fn test_bad_header_rejected() {
        let req = FetchRequest::new("https://example.test/").with_header("bad header", "x");
        assert_eq!(req.validate().unwrap_err().kind, FetchErrorKind::Validation);
    }

    #[test]
    fn test_basic_auth_header() {
        let auth = AuthDescriptor::Basic {
            username: "user".to_string(),
            password: Some("pass".to_string()),
        };
        assert_eq!(
            auth.header(),
            ("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string())
        );
    }

    #[test]
    fn test_outgoing_headers_include_auth() {
        let req = FetchRequest::new("https://example.test/")
            .with_header("X-Trace", "1")
            .with_auth(AuthDescriptor::Bearer {
                token: "t0k".to_string(),
            });
        let headers = req.outgoing_headers();
        assert_eq!(headers.len(), 2);
        assert!(headers.contains(&("Authorization".to_string(), "Bearer t0k".to_string())));
    }

    #[test]
    fn test_deserialize_minimal_job_payload() {
        let req: FetchRequest = serde_json::from_str(r#"{"url":"https://a.test/"}"#).unwrap();
        assert!(req.extract_links);
        assert_eq!(req.method, MethodPreference::Auto);
        assert!(req.rules.is_empty());
    }
}

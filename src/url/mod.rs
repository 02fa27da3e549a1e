//! URL handling module for Sumi-Harvest
//!
//! Canonicalization (cache keys and crawl identity), host extraction, and the
//! domain scope used by the crawler.

mod normalize;
mod scope;

pub use normalize::{canonicalize_url, is_route_fragment};
pub use scope::{matches_wildcard, DomainScope};

use url::Url;

/// Extracts the lowercase host from a URL
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8443/post").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Host plus explicit port, used to key per-host politeness state
///
/// Two servers on one machine but different ports are distinct origins.
pub fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host.to_lowercase(), port),
        (Some(host), None) => host.to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain_ignores_port_and_path() {
        let url = Url::parse("https://EXAMPLE.com:8080/path?q=1#f").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_host_key_includes_explicit_port() {
        let url = Url::parse("http://127.0.0.1:4000/a").unwrap();
        assert_eq!(host_key(&url), "127.0.0.1:4000");

        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(host_key(&url), "example.com");
    }
}

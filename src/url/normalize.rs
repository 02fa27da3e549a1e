use crate::{UrlError, UrlResult};
use url::Url;

/// List of tracking query parameters to remove during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Canonicalizes a URL for use as a cache key and crawl identity
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Only `http` and `https` are accepted
/// 3. Lowercase the scheme and host (the `url` crate does this on parse)
/// 4. Strip the default port for the scheme
/// 5. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 6. Remove the fragment, unless it is a client-side route (`#!/inbox`,
///    `#/settings`), which names a distinct page
/// 7. Remove tracking query parameters
/// 8. Sort remaining query parameters alphabetically
/// 9. Remove empty query string (trailing ?)
///
/// Request headers and extraction rules are never part of the canonical form.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::canonicalize_url;
///
/// let url = canonicalize_url("HTTP://Docs.Example.COM:80/guide/").unwrap();
/// assert_eq!(url.as_str(), "http://docs.example.com/guide");
/// ```
pub fn canonicalize_url(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingDomain),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    // `Url` drops ports equal to the scheme default while parsing.

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    if !url.fragment().is_some_and(is_route_fragment) {
        url.set_fragment(None);
    }

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &filtered_params {
                serializer.append_pair(k, v);
            }
            url.set_query(Some(&serializer.finish()));
        }
    }

    Ok(url)
}

/// Hash-bang and `#/` fragments select a view in single-page applications
pub fn is_route_fragment(fragment: &str) -> bool {
    fragment.starts_with('!') || fragment.starts_with('/')
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

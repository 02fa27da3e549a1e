use url::Url;

/// Decides which hosts a crawl may enter
///
/// A scope is anchored on the seed host. When `same_domain_only` is set, only
/// the seed host and hosts matching one of the `allowed` patterns are in scope.
/// Patterns are either exact hosts (`docs.example.com`) or wildcards
/// (`*.example.com`, which also matches the bare `example.com`).
#[derive(Debug, Clone)]
pub struct DomainScope {
    seed_host: String,
    allowed: Vec<String>,
    same_domain_only: bool,
}

impl DomainScope {
    pub fn new(seed: &Url, allowed: &[String], same_domain_only: bool) -> Self {
        Self {
            seed_host: seed.host_str().unwrap_or_default().to_lowercase(),
            allowed: allowed.iter().map(|p| p.to_lowercase()).collect(),
            same_domain_only,
        }
    }

    /// Returns true if `url` may be added to the frontier
    pub fn contains(&self, url: &Url) -> bool {
        if !self.same_domain_only {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();

        host == self.seed_host || self.allowed.iter().any(|p| matches_wildcard(p, &host))
    }

    pub fn seed_host(&self) -> &str {
        &self.seed_host
    }
}

/// Checks if a host matches an exact or `*.` wildcard pattern
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => candidate == base || candidate.ends_with(&format!(".{}", base)),
        None => candidate == pattern,
    }
}

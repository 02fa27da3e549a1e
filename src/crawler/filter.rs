use crate::crawler::CrawlConfig;
use crate::url::DomainScope;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Why a URL was kept out of the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    TooDeep,
    OffDomain,
    Excluded,
    NotIncluded,
}

/// Depth, domain and pattern checks applied before a URL is enqueued
#[derive(Debug, Clone)]
pub struct CrawlFilter {
    scope: DomainScope,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    max_depth: u32,
}

impl CrawlFilter {
    pub fn new(config: &CrawlConfig, seed: &Url) -> Result<Self, ConfigError> {
        Ok(Self {
            scope: DomainScope::new(seed, &config.allowed_domains, config.same_domain_only),
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
            max_depth: config.max_depth,
        })
    }

    /// Checks `url` found at `depth`; include patterns do not apply to the seed
    pub fn check(&self, url: &Url, depth: u32) -> Result<(), Skip> {
        if depth > self.max_depth {
            return Err(Skip::TooDeep);
        }
        if !self.scope.contains(url) {
            return Err(Skip::OffDomain);
        }

        let candidate = url.as_str();
        if self.exclude.iter().any(|re| re.is_match(candidate)) {
            return Err(Skip::Excluded);
        }
        if depth > 0
            && !self.include.is_empty()
            && !self.include.iter().any(|re| re.is_match(candidate))
        {
            return Err(Skip::NotIncluded);
        }

        Ok(())
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e))))
        .collect()
}

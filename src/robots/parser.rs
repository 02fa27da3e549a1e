//! Robots.txt rules
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; Crawl-delay,
//! which that crate does not expose, is read here.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Rules from one host's robots.txt
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Raw robots.txt content; empty means allow all
    content: String,
}

impl RobotsPolicy {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Policy used when robots.txt is missing or unreachable
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether `agent` may fetch `url`
    pub fn is_allowed(&self, url: &Url, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url.as_str())
    }

    /// Crawl-delay for `agent`
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// User-agent lines share one group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let agent = agent.to_ascii_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_ascii_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Some(delay) = value
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d >= 0.0)
                        .map(Duration::from_secs_f64)
                    else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        specific = specific.or(Some(delay));
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = wildcard.or(Some(delay));
                    }
                }
                _ => in_rules = true,
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://example.test{}", path)).unwrap()
    }

    #[test]
    fn test_allow_all() {
        let robots = RobotsPolicy::allow_all();
        assert!(robots.is_allowed(&url("/any/path"), "TestBot"));
        assert!(robots.is_allowed(&url("/admin"), "TestBot"));
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed(&url("/"), "TestBot"));
        assert!(!robots.is_allowed(&url("/admin"), "TestBot"));
        assert!(!robots.is_allowed(&url("/admin/users"), "TestBot"));
    }

    #[test]
    fn test_allow_overrides_longer_match() {
        let robots =
            RobotsPolicy::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed(&url("/private"), "TestBot"));
        assert!(robots.is_allowed(&url("/private/public"), "TestBot"));
    }

    #[test]
    fn test_specific_agent_group() {
        let robots = RobotsPolicy::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(robots.is_allowed(&url("/page"), "GoodBot"));
        assert!(!robots.is_allowed(&url("/page"), "BadBot"));
    }

    #[test]
    fn test_garbage_allows_everything() {
        let robots = RobotsPolicy::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed(&url("/any/path"), "TestBot"));
    }

    #[test]
    fn test_crawl_delay_specific_beats_wildcard() {
        let robots = RobotsPolicy::from_content(
            "User-agent: *\nCrawl-delay: 10\n\nUser-agent: TestBot\nCrawl-delay: 2.5",
        );
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_millis(2500)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let robots =
            RobotsPolicy::from_content("User-agent: BotA\nUser-agent: BotB\nDisallow: /x\nCrawl-delay: 3");
        assert_eq!(robots.crawl_delay("bota"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_invalid_crawl_delay_ignored() {
        let robots = RobotsPolicy::from_content("User-agent: *\nCrawl-delay: soon");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }
}

//! Robots.txt policy parsing
//!
//! Allow/disallow questions are delegated to the robotstxt crate's matcher
//! (longest-matching directive wins). Crawl-delay and sitemap directives are
//! parsed by hand since the matcher does not expose them.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt policy for a single host
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// Raw robots.txt body (empty for a permissive policy)
    content: String,

    /// True when the policy allows everything unconditionally
    permissive: bool,

    /// Sitemap URLs declared in the file
    sitemaps: Vec<String>,
}

impl RobotsPolicy {
    /// Parses a robots.txt body into a policy
    pub fn from_body(content: &str) -> Self {
        let sitemaps = parse_sitemaps(content);
        Self {
            content: content.to_string(),
            permissive: false,
            sitemaps,
        }
    }

    /// Creates a permissive policy that allows every path
    ///
    /// Used when robots.txt is missing (404) or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            permissive: true,
            sitemaps: Vec::new(),
        }
    }

    /// Returns true for policies created with [`RobotsPolicy::allow_all`]
    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    /// Checks whether a path is allowed for the given user agent
    pub fn allowed(&self, path: &str, user_agent: &str) -> bool {
        if self.permissive || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, path)
    }

    /// Returns the crawl delay declared for the given user agent, if any
    ///
    /// A `Crawl-delay` directive applies to the user-agent group it appears
    /// in; a group matching the configured agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.permissive || self.content.is_empty() {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();
        let mut current_agents: Vec<String> = Vec::new();
        let mut last_was_agent = false;
        let mut wildcard_delay: Option<f64> = None;
        let mut agent_delay: Option<f64> = None;

        for line in self.content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                last_was_agent = false;
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines form one group
                    if !last_was_agent {
                        current_agents.clear();
                    }
                    current_agents.push(value.to_lowercase());
                    last_was_agent = true;
                }
                "crawl-delay" => {
                    last_was_agent = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    if current_agents
                        .iter()
                        .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        agent_delay = Some(delay);
                    } else if current_agents.iter().any(|ua| ua == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
                _ => {
                    last_was_agent = false;
                }
            }
        }

        agent_delay
            .or(wildcard_delay)
            .map(Duration::from_secs_f64)
    }

    /// Returns the sitemap URLs declared in the robots.txt
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Collects `Sitemap:` directives, which apply file-wide regardless of
/// user-agent groups
fn parse_sitemaps(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let (key, value) = trimmed.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("sitemap") {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            } else {
                None
            }
        })
        .collect()
}

//! Robots.txt handling module
//!
//! Fetching, parsing, and caching of per-host robots.txt policies, plus the
//! crawl-delay arithmetic the host fetchers use between requests.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::RobotsPolicy;

use std::time::Duration;

/// Computes the effective crawl delay for a host
///
/// The robots-declared delay can raise the configured default but never
/// lower it, and the result is clamped to the configured maximum so a
/// hostile `Crawl-delay: 86400` cannot park a fetcher for a day.
pub fn effective_delay(
    policy: &RobotsPolicy,
    user_agent: &str,
    default_delay: Duration,
    max_delay: Duration,
) -> Duration {
    policy
        .crawl_delay(user_agent)
        .unwrap_or(default_delay)
        .max(default_delay)
        .min(max_delay)
}

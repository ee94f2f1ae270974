//! Robots.txt policy cache
//!
//! Per-process cache of parsed robots.txt policies, keyed by host. Entries
//! are bounded by an LRU capacity and expire by TTL. Connection failures are
//! cached with a shorter TTL than answered requests so unreachable hosts are
//! retried sooner.

use crate::robots::RobotsPolicy;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached policy with its freshness window
#[derive(Debug, Clone)]
struct CachedPolicy {
    policy: Arc<RobotsPolicy>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedPolicy {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Fetches and caches per-host robots.txt policies
///
/// Nested hosts maintain independent entries: `a.b.com`, `b.com`, and
/// `other.b.com` each fetch and cache their own robots.txt.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
    unreachable_ttl: Duration,
    entries: Mutex<LruCache<String, CachedPolicy>>,
}

impl RobotsCache {
    /// Creates a cache backed by the given HTTP client
    pub fn new(
        client: reqwest::Client,
        user_agent: String,
        capacity: usize,
        ttl: Duration,
        unreachable_ttl: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            user_agent,
            ttl,
            unreachable_ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the robots policy for a host, fetching it on a cache miss
    ///
    /// Never fails: a missing (404), unparseable, or unreachable robots.txt
    /// yields a permissive policy. The network fetch happens outside the
    /// cache lock.
    pub async fn policy_for(&self, scheme: &str, host: &str) -> Arc<RobotsPolicy> {
        if let Some(entry) = self.entries.lock().get(host) {
            if entry.is_fresh() {
                return entry.policy.clone();
            }
        }

        let (policy, ttl) = self.fetch(scheme, host).await;
        let policy = Arc::new(policy);
        self.entries.lock().put(
            host.to_string(),
            CachedPolicy {
                policy: policy.clone(),
                fetched_at: Instant::now(),
                ttl,
            },
        );
        policy
    }

    /// The user agent the cache fetches and evaluates policies with
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn fetch(&self, scheme: &str, host: &str) -> (RobotsPolicy, Duration) {
        let robots_url = format!("{}://{}/robots.txt", scheme, host);
        tracing::debug!("Fetching robots.txt from {}", robots_url);

        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => (RobotsPolicy::from_body(&body), self.ttl),
                Err(e) => {
                    tracing::debug!("Failed to read robots.txt body for {}: {}", host, e);
                    (RobotsPolicy::allow_all(), self.ttl)
                }
            },
            Ok(response) => {
                tracing::debug!(
                    "robots.txt not found for {} (status {}), allowing all",
                    host,
                    response.status()
                );
                (RobotsPolicy::allow_all(), self.ttl)
            }
            Err(e) => {
                // No answer from the host at all; retry sooner than a 404
                tracing::debug!("Failed to fetch robots.txt for {}: {}, allowing all", host, e);
                (RobotsPolicy::allow_all(), self.unreachable_ttl)
            }
        }
    }
}

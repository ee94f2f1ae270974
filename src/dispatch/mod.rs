//! Dispatcher module: segment generation
//!
//! A single task per process that keeps the fetch managers fed. Each round
//! it releases claims whose owners have gone quiet, then promotes a bounded
//! set of links into the segment of every idle domain, making those domains
//! claimable. The only synchronization with fetchers is the datastore's
//! atomic claim primitive.

use crate::config::Config;
use crate::storage::{DispatchStore, LinkState};
use crate::url::CrawlUrl;
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counters from one dispatch round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Domains whose segment was populated this round
    pub domains_dispatched: usize,

    /// Links promoted into segments this round
    pub links_dispatched: usize,

    /// Stale claims forcibly released this round
    pub claims_released: usize,
}

/// Periodic segment generator; see module docs
pub struct Dispatcher {
    config: Arc<Config>,
    store: Arc<dyn DispatchStore>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, store: Arc<dyn DispatchStore>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled when the dispatcher is asked to stop
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals the scan loop to exit after the current round
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Runs dispatch rounds until stopped
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Dispatcher starting, interval {:?}, segment size {}",
            self.config.dispatcher.dispatch_interval(),
            self.config.dispatcher.segment_size
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.generate_once().await {
                Ok(stats) if stats.domains_dispatched > 0 || stats.claims_released > 0 => {
                    tracing::debug!(
                        "Dispatched {} links across {} domains, released {} stale claims",
                        stats.links_dispatched,
                        stats.domains_dispatched,
                        stats.claims_released
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Dispatch round failed: {}", e);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.dispatcher.dispatch_interval()) => {}
            }
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    /// Performs one dispatch round: stale-claim recovery, then segment
    /// generation for every idle domain
    pub async fn generate_once(&self) -> Result<DispatchStats> {
        let mut stats = DispatchStats::default();

        let released = self
            .store
            .expire_stale_claims(self.config.dispatcher.claim_timeout())
            .await?;
        stats.claims_released = released.len();
        for domain in &released {
            tracing::warn!("Released stale claim on {}", domain);
        }

        for record in self.store.tracked_domains().await? {
            // Only idle domains get a fresh segment: unclaimed, not excluded,
            // and nothing left over from the previous round
            if record.excluded || record.claim_token.is_some() || record.queued_links > 0 {
                continue;
            }

            let states = self.store.link_states(&record.domain).await?;
            let segment = select_segment(states, self.config.dispatcher.segment_size);
            if segment.is_empty() {
                continue;
            }

            stats.domains_dispatched += 1;
            stats.links_dispatched += segment.len();
            self.store.write_segment(&record.domain, segment).await?;
        }

        Ok(stats)
    }
}

/// Picks up to `limit` links for a segment
///
/// Selection order: links flagged get-now, then links never crawled, then
/// previously crawled links stalest first.
fn select_segment(states: Vec<LinkState>, limit: usize) -> Vec<CrawlUrl> {
    let mut get_now = Vec::new();
    let mut never = Vec::new();
    let mut crawled = Vec::new();

    for state in states {
        let mut url = state.url;
        url.last_crawled = state.last_crawl;

        if state.get_now {
            get_now.push(url);
        } else if state.last_crawl.is_none() {
            never.push(url);
        } else {
            crawled.push((state.last_crawl, url));
        }
    }

    crawled.sort_by_key(|(at, _)| *at);

    get_now
        .into_iter()
        .chain(never)
        .chain(crawled.into_iter().map(|(_, url)| url))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Normalizer;
    use chrono::{TimeZone, Utc};

    fn state(url: &str, last_crawl: Option<i64>, get_now: bool) -> LinkState {
        LinkState {
            url: Normalizer::default().parse(url).unwrap(),
            last_crawl: last_crawl.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
            get_now,
        }
    }

    fn urls(segment: &[CrawlUrl]) -> Vec<&str> {
        segment.iter().map(|u| u.as_str()).collect()
    }

    #[test]
    fn test_get_now_first_then_never_then_stalest() {
        let segment = select_segment(
            vec![
                state("http://a.com/old", Some(1_000), false),
                state("http://a.com/new", None, false),
                state("http://a.com/now", Some(5_000), true),
                state("http://a.com/older", Some(500), false),
            ],
            10,
        );

        assert_eq!(
            urls(&segment),
            vec![
                "http://a.com/now",
                "http://a.com/new",
                "http://a.com/older",
                "http://a.com/old",
            ]
        );
    }

    #[test]
    fn test_segment_is_bounded() {
        let states = (0..20)
            .map(|i| state(&format!("http://a.com/page{}", i), None, false))
            .collect();
        let segment = select_segment(states, 5);
        assert_eq!(segment.len(), 5);
    }

    #[test]
    fn test_selected_links_carry_last_crawl_time() {
        let segment = select_segment(vec![state("http://a.com/old", Some(1_000), false)], 10);
        assert_eq!(
            segment[0].last_crawled,
            Some(Utc.timestamp_opt(1_000, 0).unwrap())
        );
    }

    #[test]
    fn test_empty_states_empty_segment() {
        assert!(select_segment(Vec::new(), 10).is_empty());
    }
}

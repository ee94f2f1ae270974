//! In-memory reference datastore
//!
//! Process-local implementation of the datastore traits, used by the CLI's
//! default wiring and by the test suite. It honors the same contract a
//! shared wide-column backend would: claims are test-and-set under a single
//! write lock, link history is append-only, and the add-new-domains policy
//! gates unknown domains.

use crate::storage::{
    Datastore, DispatchStore, DomainRecord, FetchResults, LinkFinder, LinkHistoryEntry, LinkInfo,
    LinkKey, LinkState, StorageError, StorageResult,
};
use crate::url::CrawlUrl;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
struct StoredLink {
    url: CrawlUrl,
    history: Vec<LinkHistoryEntry>,
}

impl StoredLink {
    fn latest(&self) -> Option<&LinkHistoryEntry> {
        self.history
            .iter()
            .max_by_key(|entry| entry.crawl_time.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC))
    }
}

#[derive(Debug, Default)]
struct Inner {
    domains: HashMap<String, DomainRecord>,
    links: HashMap<LinkKey, StoredLink>,
    segments: HashMap<String, Vec<CrawlUrl>>,
}

/// In-memory datastore; see module docs
pub struct MemoryDatastore {
    claim_token: Uuid,
    add_new_domains: bool,
    inner: RwLock<Inner>,
}

impl MemoryDatastore {
    /// Creates an empty datastore
    ///
    /// `add_new_domains` controls whether `store_parsed_url` may create
    /// domain records for previously unseen registrable domains.
    pub fn new(add_new_domains: bool) -> Self {
        Self {
            claim_token: Uuid::new_v4(),
            add_new_domains,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Inserts a seed link, creating its domain record regardless of the
    /// add-new-domains policy
    pub fn add_seed(&self, url: CrawlUrl) {
        let mut inner = self.inner.write();
        let domain = url.domain_plus_one();
        inner
            .domains
            .entry(domain.clone())
            .or_insert_with(|| DomainRecord::new(&domain));
        Self::insert_link(&mut inner, url, true);
    }

    /// Number of tracked domains
    pub fn domain_count(&self) -> usize {
        self.inner.read().domains.len()
    }

    /// Number of tracked links
    pub fn link_count(&self) -> usize {
        self.inner.read().links.len()
    }

    fn insert_link(inner: &mut Inner, url: CrawlUrl, get_now: bool) {
        let key = LinkKey::from_url(&url);
        if inner.links.contains_key(&key) {
            return;
        }
        if let Some(record) = inner.domains.get_mut(&key.domain) {
            record.total_links += 1;
        }
        inner.links.insert(
            key,
            StoredLink {
                url,
                history: vec![LinkHistoryEntry::never_crawled(get_now)],
            },
        );
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn claim_new_host(&self) -> StorageResult<Option<String>> {
        let mut inner = self.inner.write();

        let best = {
            let mut candidates: Vec<(&String, i32)> = inner
                .domains
                .iter()
                .filter(|(_, record)| record.claimable())
                .map(|(name, record)| (name, record.priority))
                .collect();
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            candidates.first().map(|(name, _)| (*name).clone())
        };
        let Some(domain) = best else {
            return Ok(None);
        };

        let record = inner
            .domains
            .get_mut(&domain)
            .ok_or_else(|| StorageError::UnknownDomain(domain.clone()))?;
        record.claim_token = Some(self.claim_token);
        record.claim_time = Some(Utc::now());
        record.dispatched = false;

        Ok(Some(domain))
    }

    async fn unclaim_host(&self, domain: &str) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner.segments.remove(domain);
        if let Some(record) = inner.domains.get_mut(domain) {
            record.claim_token = None;
            record.claim_time = None;
            record.queued_links = 0;
        }
        Ok(())
    }

    async fn links_for_host(&self, domain: &str) -> StorageResult<mpsc::Receiver<CrawlUrl>> {
        let links = self
            .inner
            .read()
            .segments
            .get(domain)
            .cloned()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(links.len().max(1));
        for link in links {
            // The channel was sized to hold the whole segment
            let _ = tx.send(link).await;
        }
        Ok(rx)
    }

    async fn store_url_fetch_results(&self, results: &FetchResults) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let key = LinkKey::from_url(&results.url);
        let entry = LinkHistoryEntry::from_results(results);

        match inner.links.get_mut(&key) {
            Some(stored) => {
                stored.url.last_crawled = Some(results.fetched_at);
                stored.history.push(entry);
            }
            None => {
                // A fetched link should already exist; be lenient and track it
                if let Some(record) = inner.domains.get_mut(&key.domain) {
                    record.total_links += 1;
                }
                let mut url = results.url.clone();
                url.last_crawled = Some(results.fetched_at);
                inner.links.insert(
                    key,
                    StoredLink {
                        url,
                        history: vec![entry],
                    },
                );
            }
        }
        Ok(())
    }

    async fn store_parsed_url(
        &self,
        link: &CrawlUrl,
        _source: Option<&FetchResults>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let domain = link.domain_plus_one();

        if !inner.domains.contains_key(&domain) {
            if !self.add_new_domains {
                tracing::debug!("Dropping link to untracked domain {}: {}", domain, link);
                return Ok(());
            }
            inner
                .domains
                .insert(domain.clone(), DomainRecord::new(&domain));
        }

        Self::insert_link(&mut inner, link.clone(), false);
        Ok(())
    }

    async fn keep_alive(&self) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        for record in inner.domains.values_mut() {
            if record.claim_token == Some(self.claim_token) {
                record.claim_time = Some(now);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchStore for MemoryDatastore {
    async fn tracked_domains(&self) -> StorageResult<Vec<DomainRecord>> {
        Ok(self.inner.read().domains.values().cloned().collect())
    }

    async fn link_states(&self, domain: &str) -> StorageResult<Vec<LinkState>> {
        Ok(self
            .inner
            .read()
            .links
            .iter()
            .filter(|(key, _)| key.domain == domain)
            .map(|(_, stored)| LinkState {
                url: stored.url.clone(),
                last_crawl: stored.latest().and_then(|entry| entry.crawl_time),
                get_now: stored.latest().map(|entry| entry.get_now).unwrap_or(false),
            })
            .collect())
    }

    async fn write_segment(&self, domain: &str, links: Vec<CrawlUrl>) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let record = inner
            .domains
            .get_mut(domain)
            .ok_or_else(|| StorageError::UnknownDomain(domain.to_string()))?;
        record.queued_links = links.len() as u64;
        record.dispatched = !links.is_empty();
        inner.segments.insert(domain.to_string(), links);
        Ok(())
    }

    async fn expire_stale_claims(&self, older_than: Duration) -> StorageResult<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut inner = self.inner.write();
        let mut released = Vec::new();

        let stale: Vec<String> = inner
            .domains
            .values()
            .filter(|record| {
                record.claim_token.is_some()
                    && record.claim_time.map(|t| t < cutoff).unwrap_or(true)
            })
            .map(|record| record.domain.clone())
            .collect();

        for domain in stale {
            let has_segment = inner
                .segments
                .get(&domain)
                .map(|segment| !segment.is_empty())
                .unwrap_or(false);
            if let Some(record) = inner.domains.get_mut(&domain) {
                record.claim_token = None;
                record.claim_time = None;
                // A half-drained segment stays claimable so it can finish
                record.dispatched = has_segment;
                released.push(domain);
            }
        }

        Ok(released)
    }
}

#[async_trait]
impl LinkFinder for MemoryDatastore {
    async fn find_link(
        &self,
        url: &CrawlUrl,
        include_body: bool,
    ) -> StorageResult<Option<LinkInfo>> {
        let inner = self.inner.read();
        let key = LinkKey::from_url(url);

        let Some(stored) = inner.links.get(&key) else {
            return Ok(None);
        };
        let Some(latest) = stored.latest() else {
            return Ok(None);
        };

        Ok(Some(LinkInfo {
            url: stored.url.as_str().to_string(),
            crawl_time: latest.crawl_time,
            status: latest.status,
            error: latest.error.clone(),
            robots_excluded: latest.robots_excluded,
            redirected_to: latest.redirected_to.clone(),
            get_now: latest.get_now,
            mime_type: latest.mime_type.clone(),
            fnv_fingerprint: latest.fnv_fingerprint,
            headers: latest.headers.clone(),
            body: include_body.then(|| latest.body.clone()).flatten(),
        }))
    }
}

//! Datastore traits and error types
//!
//! The fetch side and the dispatch side see the store through two separate
//! traits: host fetchers only claim, stream, and write; the dispatcher only
//! scans and populates segments. A backend implements both against the same
//! underlying tables.

use crate::storage::{DomainRecord, FetchResults, LinkInfo, LinkState};
use crate::url::CrawlUrl;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by datastore backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Datastore backend error: {0}")]
    Backend(String),

    #[error("Domain not tracked: {0}")]
    UnknownDomain(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The fetch-side datastore contract
///
/// This is the only interface the fetch manager and host fetchers depend on.
/// All cross-process synchronization happens through it; in particular
/// [`Datastore::claim_new_host`] must be atomic, so two concurrent callers
/// never receive the same domain.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Atomically claims one dispatched domain, marking it non-claimable for
    /// other fetchers until [`Datastore::unclaim_host`] releases it.
    ///
    /// Returns `None` when no domain is currently available.
    async fn claim_new_host(&self) -> StorageResult<Option<String>>;

    /// Releases a claim and clears the domain's segment. Link history is not
    /// disturbed.
    async fn unclaim_host(&self, domain: &str) -> StorageResult<()>;

    /// Streams the segment for a claimed domain
    ///
    /// The returned channel is a finite, non-restartable sequence: it yields
    /// each segment link once and then closes.
    async fn links_for_host(&self, domain: &str) -> StorageResult<mpsc::Receiver<CrawlUrl>>;

    /// Appends a fetch attempt to the link's history
    async fn store_url_fetch_results(&self, results: &FetchResults) -> StorageResult<()>;

    /// Records a newly discovered link
    ///
    /// Idempotent. When the link's registrable domain is not yet tracked and
    /// the add-new-domains policy forbids new domains, the link is silently
    /// dropped. `source` is the fetch that discovered the link, or `None`
    /// for seeds.
    async fn store_parsed_url(
        &self,
        link: &CrawlUrl,
        source: Option<&FetchResults>,
    ) -> StorageResult<()>;

    /// Optional heartbeat refreshing the claim time of every domain held by
    /// this process, so a live fetcher is not mistaken for a crashed one.
    async fn keep_alive(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// The dispatch-side datastore contract
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Returns a snapshot of every tracked domain record
    async fn tracked_domains(&self) -> StorageResult<Vec<DomainRecord>>;

    /// Returns the dispatch-relevant state of every link under a domain
    async fn link_states(&self, domain: &str) -> StorageResult<Vec<LinkState>>;

    /// Replaces the domain's segment with the given links and marks the
    /// domain dispatched (claimable)
    async fn write_segment(&self, domain: &str, links: Vec<CrawlUrl>) -> StorageResult<()>;

    /// Forcibly releases every claim older than `older_than`, returning the
    /// affected domains
    async fn expire_stale_claims(&self, older_than: Duration) -> StorageResult<Vec<String>>;
}

/// Lookup interface for link inspection, kept outside [`Datastore`] because
/// only the `readlink` command needs it
#[async_trait]
pub trait LinkFinder: Send + Sync {
    /// Returns the latest recorded state of a link, optionally including the
    /// stored body
    async fn find_link(
        &self,
        url: &CrawlUrl,
        include_body: bool,
    ) -> StorageResult<Option<LinkInfo>>;
}

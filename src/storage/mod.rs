//! Storage module: the datastore contract and its record types
//!
//! The crawler core never talks to a concrete database; it speaks to the
//! [`Datastore`] and [`DispatchStore`] traits defined here. The in-memory
//! backend in this module is the reference implementation used by the CLI
//! and the test suite; production deployments supply their own backend
//! against a shared wide-column store.

mod memory;
pub mod schema;
mod traits;

pub use memory::MemoryDatastore;
pub use traits::{Datastore, DispatchStore, LinkFinder, StorageError, StorageResult};

use crate::url::CrawlUrl;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

/// Per-registrable-domain record
#[derive(Debug, Clone)]
pub struct DomainRecord {
    /// The registrable domain this record describes
    pub domain: String,

    /// Excluded domains are never dispatched or claimed
    pub excluded: bool,

    /// Optional operator-facing reason for the exclusion
    pub exclude_reason: Option<String>,

    /// Alias to the domain this one mirrors. Informational only; no fetch
    /// or dispatch path consumes it.
    pub mirror_of: Option<String>,

    /// Total links known for this domain
    pub total_links: u64,

    /// Links currently sitting in the domain's segment
    pub queued_links: u64,

    /// Token of the fetcher currently owning this domain; None when unclaimed
    pub claim_token: Option<Uuid>,

    /// When the current claim was taken; None when unclaimed
    pub claim_time: Option<DateTime<Utc>>,

    /// Dispatch priority; higher first
    pub priority: i32,

    /// True when the domain's segment is populated and claimable
    pub dispatched: bool,
}

impl DomainRecord {
    /// Creates a fresh, unclaimed record for a domain
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            excluded: false,
            exclude_reason: None,
            mirror_of: None,
            total_links: 0,
            queued_links: 0,
            claim_token: None,
            claim_time: None,
            priority: 0,
            dispatched: false,
        }
    }

    /// Returns true when this domain can be handed to a fetcher
    pub fn claimable(&self) -> bool {
        self.dispatched && !self.excluded && self.claim_token.is_none()
    }
}

/// Primary key of a link in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub domain: String,
    pub subdomain: String,
    pub path: String,
    pub protocol: String,
}

impl LinkKey {
    /// Derives the storage key from a canonical URL
    pub fn from_url(url: &CrawlUrl) -> Self {
        Self {
            domain: url.domain_plus_one(),
            subdomain: url.subdomain(),
            path: url.request_uri(),
            protocol: url.scheme().to_string(),
        }
    }
}

/// One fetch attempt in a link's append-only history
///
/// The entry with the greatest crawl time is the link's current state; an
/// entry with `crawl_time: None` is the initial not-yet-crawled row.
#[derive(Debug, Clone, Default)]
pub struct LinkHistoryEntry {
    pub crawl_time: Option<DateTime<Utc>>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub robots_excluded: bool,
    pub redirected_to: Option<String>,
    pub get_now: bool,
    pub mime_type: Option<String>,
    pub fnv_fingerprint: i64,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl LinkHistoryEntry {
    /// The row written when a link is first discovered
    pub fn never_crawled(get_now: bool) -> Self {
        Self {
            get_now,
            ..Default::default()
        }
    }

    /// Builds a history row from a completed fetch attempt
    pub fn from_results(results: &FetchResults) -> Self {
        Self {
            crawl_time: Some(results.fetched_at),
            status: results.status,
            error: results.fetch_error.clone(),
            robots_excluded: results.excluded_by_robots,
            redirected_to: results
                .redirected_from
                .last()
                .map(|u| u.as_str().to_string()),
            get_now: false,
            mime_type: results.mime_type.clone(),
            fnv_fingerprint: results.fnv_fingerprint,
            headers: results.headers.clone(),
            body: results.body.clone(),
        }
    }
}

/// Dispatch-relevant view of one link, as read by the segment generator
#[derive(Debug, Clone)]
pub struct LinkState {
    pub url: CrawlUrl,
    pub last_crawl: Option<DateTime<Utc>>,
    pub get_now: bool,
}

/// Latest known state of a link, as printed by `readlink`
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub url: String,
    pub crawl_time: Option<DateTime<Utc>>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub robots_excluded: bool,
    pub redirected_to: Option<String>,
    pub get_now: bool,
    pub mime_type: Option<String>,
    pub fnv_fingerprint: i64,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// The outcome of fetching one link, as handed to the datastore and handler
#[derive(Debug, Clone)]
pub struct FetchResults {
    /// The link as requested; redirects do not change it
    pub url: CrawlUrl,

    /// Each URL the fetch was redirected through, in order, ending with the
    /// URL that produced the final response
    pub redirected_from: Vec<Url>,

    /// HTTP status of the final response; None when the exchange never
    /// completed
    pub status: Option<u16>,

    /// Response headers of the final response
    pub headers: Vec<(String, String)>,

    /// Main mime type from Content-Type, when present
    pub mime_type: Option<String>,

    /// Response body, when one was read and retained
    pub body: Option<String>,

    /// FNV-64 fingerprint of the received body bytes, interpreted as signed
    pub fnv_fingerprint: i64,

    /// Transport or policy error description, when the fetch failed
    pub fetch_error: Option<String>,

    /// True when robots.txt disallowed the link and no request was made
    pub excluded_by_robots: bool,

    /// Meta robots directives observed in the page
    pub meta_noindex: bool,
    pub meta_nofollow: bool,

    /// When the fetch attempt happened
    pub fetched_at: DateTime<Utc>,
}

impl FetchResults {
    /// Starts a result for a link about to be fetched
    pub fn new(url: CrawlUrl) -> Self {
        Self {
            url,
            redirected_from: Vec::new(),
            status: None,
            headers: Vec::new(),
            mime_type: None,
            body: None,
            fnv_fingerprint: 0,
            fetch_error: None,
            excluded_by_robots: false,
            meta_noindex: false,
            meta_nofollow: false,
            fetched_at: Utc::now(),
        }
    }

    /// Builds a result for a fetch that failed before completing
    pub fn with_error(url: CrawlUrl, error: impl Into<String>) -> Self {
        let mut results = Self::new(url);
        results.fetch_error = Some(error.into());
        results
    }

    /// Builds a result for a link refused by robots.txt
    pub fn robots_excluded(url: CrawlUrl) -> Self {
        let mut results = Self::new(url);
        results.excluded_by_robots = true;
        results
    }

    /// The URL that produced the final response: the last redirect hop, or
    /// the request URL when no redirect happened
    pub fn final_url(&self) -> &Url {
        self.redirected_from
            .last()
            .unwrap_or_else(|| self.url.as_url())
    }

    /// Looks up a response header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Computes the 64-bit FNV-1 hash of a byte slice, as a signed value
///
/// Used for content change detection and deduplication hints only.
pub fn fnv1_64(bytes: &[u8]) -> i64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for &b in bytes {
        hash = hash.wrapping_mul(PRIME);
        hash ^= u64::from(b);
    }
    hash as i64
}

//! URL handling module for trawler
//!
//! This module provides the canonical URL model used throughout the crawler,
//! along with normalization, registrable-domain extraction, and the
//! include/exclude link filter.

mod domain;
mod matcher;
mod normalize;

pub use domain::{domain_plus_one, subdomain_of};
pub use matcher::LinkFilter;
pub use normalize::{Normalizer, DEFAULT_PURGE_SIDS};

use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// A canonical absolute HTTP(S) URL, optionally annotated with the time it
/// was last crawled.
///
/// `CrawlUrl` values are only constructed through [`Normalizer`], so every
/// instance is already in canonical form: lowercase scheme and host, punycoded
/// IDN, default port elided, fragment dropped, session-identifier parameters
/// stripped, and query keys sorted.
///
/// Two `CrawlUrl`s are equal iff their canonical string forms are equal; the
/// crawl timestamp does not participate in equality.
#[derive(Debug, Clone)]
pub struct CrawlUrl {
    url: Url,

    /// When this link was last fetched; `None` means never crawled.
    pub last_crawled: Option<DateTime<Utc>>,
}

impl CrawlUrl {
    /// Wraps an already-canonicalized URL. Only the normalizer calls this.
    pub(crate) fn from_canonical(url: Url) -> Self {
        Self {
            url,
            last_crawled: None,
        }
    }

    /// Returns the underlying parsed URL
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Returns the canonical string form
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the URL scheme ("http" or "https")
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Returns the host portion of the URL
    ///
    /// Canonical URLs always carry a host, so this never returns an empty
    /// string for a value produced by the normalizer.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Returns the registrable domain of this URL's host: the public suffix
    /// plus one label (e.g. `foo.co.uk` for `www.foo.co.uk`).
    ///
    /// Hosts with no recognizable public suffix (IP literals, `localhost`)
    /// are returned unchanged.
    pub fn domain_plus_one(&self) -> String {
        domain::domain_plus_one(self.host())
    }

    /// Returns the subdomain labels in front of the registrable domain, or an
    /// empty string when the host is the registrable domain itself.
    pub fn subdomain(&self) -> String {
        domain::subdomain_of(self.host(), &self.domain_plus_one())
    }

    /// Returns the host with its explicit port, when one is present
    ///
    /// This is the key politeness and robots caching operate on: two sites
    /// on different ports of one host keep separate policies and delays.
    pub fn authority(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// Returns the path plus query string, as sent on the request line
    pub fn request_uri(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// Sets the last-crawled timestamp, builder style
    pub fn with_last_crawled(mut self, at: DateTime<Utc>) -> Self {
        self.last_crawled = Some(at);
        self
    }
}

impl PartialEq for CrawlUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for CrawlUrl {}

impl std::hash::Hash for CrawlUrl {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.as_str().hash(state);
    }
}

impl fmt::Display for CrawlUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

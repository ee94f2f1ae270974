use crate::url::DEFAULT_PURGE_SIDS;
use serde::Deserialize;
use std::time::Duration;

/// Process-wide configuration, constructed once at startup
///
/// Every section may be omitted from the TOML file; missing fields take the
/// defaults below. Durations are integer milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub dispatcher: DispatcherConfig,
    pub robots: RobotsConfig,
    pub datastore: DatastoreConfig,
    pub handler: HandlerConfig,
}

/// Fetch manager and host fetcher behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetcherConfig {
    /// Number of concurrent host fetchers
    pub num_fetchers: usize,

    /// User agent sent on every request and matched against robots.txt
    pub user_agent: String,

    /// Total HTTP timeout covering connect, first byte, and body (ms)
    pub http_timeout_ms: u64,

    /// Maximum redirect hops to follow for one link
    pub max_redirects: u32,

    /// Hard cap on response body bytes
    pub max_content_size_bytes: u64,

    /// Content-Type values worth downloading
    pub accept_formats: Vec<String>,

    /// Politeness delay used when robots.txt declares none (ms)
    pub default_crawl_delay_ms: u64,

    /// Upper bound on any crawl delay, however large robots.txt asks (ms)
    pub max_crawl_delay_ms: u64,

    /// Refuse to fetch hosts resolving to loopback/private/multicast space
    pub blacklist_private_ips: bool,

    /// Honor `<meta name="robots" content="noindex">`
    pub honor_meta_noindex: bool,

    /// Honor `<meta name="robots" content="nofollow">`
    pub honor_meta_nofollow: bool,

    /// Session-identifier parameter names purged during URL normalization
    pub purge_sid_list: Vec<String>,

    /// Regex patterns a link path must match to be kept (empty = keep all)
    pub include_link_patterns: Vec<String>,

    /// Regex patterns that drop a link path; wins over includes
    pub exclude_link_patterns: Vec<String>,

    /// Sleep between claim attempts when no domain is available (ms)
    pub claim_backoff_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            num_fetchers: 10,
            user_agent: format!("Trawler/{}", env!("CARGO_PKG_VERSION")),
            http_timeout_ms: 30_000,
            max_redirects: 10,
            max_content_size_bytes: 20 * 1024 * 1024,
            accept_formats: vec!["text/html".to_string(), "text/plain".to_string()],
            default_crawl_delay_ms: 1_000,
            max_crawl_delay_ms: 300_000,
            blacklist_private_ips: true,
            honor_meta_noindex: true,
            honor_meta_nofollow: false,
            purge_sid_list: DEFAULT_PURGE_SIDS.iter().map(|s| s.to_string()).collect(),
            include_link_patterns: Vec::new(),
            exclude_link_patterns: Vec::new(),
            claim_backoff_ms: 1_000,
        }
    }
}

impl FetcherConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn default_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.default_crawl_delay_ms)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.max_crawl_delay_ms)
    }

    pub fn claim_backoff(&self) -> Duration {
        Duration::from_millis(self.claim_backoff_ms)
    }
}

/// Dispatcher behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DispatcherConfig {
    /// Maximum links promoted into a domain's segment per round
    pub segment_size: usize,

    /// Pause between dispatch scans (ms)
    pub dispatch_interval_ms: u64,

    /// Claims older than this are presumed crashed and released (ms)
    pub claim_timeout_ms: u64,

    /// Whether extraction may introduce previously unseen domains
    pub add_new_domains: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            segment_size: 500,
            dispatch_interval_ms: 10_000,
            claim_timeout_ms: 3_600_000,
            add_new_domains: false,
        }
    }
}

impl DispatcherConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }
}

/// Robots.txt cache sizing and freshness
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RobotsConfig {
    /// Maximum hosts kept in the cache
    pub cache_capacity: usize,

    /// Freshness window for fetched policies (ms)
    pub cache_ttl_ms: u64,

    /// Shorter freshness window when the host was unreachable (ms)
    pub unreachable_ttl_ms: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10_000,
            cache_ttl_ms: 3_600_000,
            unreachable_ttl_ms: 300_000,
        }
    }
}

impl RobotsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn unreachable_ttl(&self) -> Duration {
        Duration::from_millis(self.unreachable_ttl_ms)
    }
}

/// Datastore identity and bootstrap
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatastoreConfig {
    /// Keyspace substituted into the emitted schema
    pub keyspace: String,

    /// Replication factor substituted into the emitted schema
    pub replication_factor: u32,

    /// Seed URLs loaded into the in-memory backend at startup
    pub seeds: Vec<String>,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            keyspace: "trawler".to_string(),
            replication_factor: 3,
            seeds: Vec::new(),
        }
    }
}

/// Reference handler output
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HandlerConfig {
    /// Directory the page-writing handler mirrors fetched bodies into
    pub output_dir: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            output_dir: "./pages".to_string(),
        }
    }
}

//! Shared fixtures for the integration tests: a scriptable datastore that
//! records every call the fetch manager makes, and a recording handler.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trawler::config::Config;
use trawler::handler::Handler;
use trawler::storage::{Datastore, FetchResults, StorageResult};
use trawler::url::{CrawlUrl, Normalizer};
use trawler::FetchManager;

pub fn parse(url: &str) -> CrawlUrl {
    Normalizer::default().parse(url).unwrap()
}

/// Config suitable for loopback test servers: private IPs allowed, no
/// politeness delay unless a test opts back in
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.fetcher.blacklist_private_ips = false;
    config.fetcher.default_crawl_delay_ms = 0;
    config.fetcher.claim_backoff_ms = 50;
    config.fetcher.num_fetchers = 2;
    config.dispatcher.add_new_domains = true;
    config
}

/// Everything the fetch manager told the datastore
#[derive(Default)]
pub struct RecordedCalls {
    pub stored_results: Vec<FetchResults>,
    /// (discovered link, URL of the page it came from)
    pub parsed_urls: Vec<(CrawlUrl, Option<String>)>,
    pub links_queried: Vec<String>,
    pub unclaimed: Vec<String>,
}

/// Datastore scripted with a claim queue and per-domain segments, recording
/// every write for later assertions
#[derive(Default)]
pub struct ScriptedDatastore {
    claims: Mutex<VecDeque<String>>,
    segments: Mutex<HashMap<String, Vec<CrawlUrl>>>,
    pub calls: Mutex<RecordedCalls>,
}

impl ScriptedDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a domain for one claim, with the links its segment will yield
    pub fn script_host(&self, domain: &str, links: Vec<CrawlUrl>) {
        self.claims.lock().push_back(domain.to_string());
        self.segments.lock().insert(domain.to_string(), links);
    }

    pub fn stored_results(&self) -> Vec<FetchResults> {
        self.calls.lock().stored_results.clone()
    }

    pub fn parsed_urls(&self) -> Vec<(CrawlUrl, Option<String>)> {
        self.calls.lock().parsed_urls.clone()
    }

    pub fn unclaimed(&self) -> Vec<String> {
        self.calls.lock().unclaimed.clone()
    }

    pub fn links_queried(&self) -> Vec<String> {
        self.calls.lock().links_queried.clone()
    }
}

#[async_trait]
impl Datastore for ScriptedDatastore {
    async fn claim_new_host(&self) -> StorageResult<Option<String>> {
        Ok(self.claims.lock().pop_front())
    }

    async fn unclaim_host(&self, domain: &str) -> StorageResult<()> {
        self.calls.lock().unclaimed.push(domain.to_string());
        Ok(())
    }

    async fn links_for_host(&self, domain: &str) -> StorageResult<mpsc::Receiver<CrawlUrl>> {
        self.calls.lock().links_queried.push(domain.to_string());
        let links = self
            .segments
            .lock()
            .get(domain)
            .cloned()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(links.len().max(1));
        for link in links {
            let _ = tx.send(link).await;
        }
        Ok(rx)
    }

    async fn store_url_fetch_results(&self, results: &FetchResults) -> StorageResult<()> {
        self.calls.lock().stored_results.push(results.clone());
        Ok(())
    }

    async fn store_parsed_url(
        &self,
        link: &CrawlUrl,
        source: Option<&FetchResults>,
    ) -> StorageResult<()> {
        self.calls
            .lock()
            .parsed_urls
            .push((link.clone(), source.map(|r| r.url.as_str().to_string())));
        Ok(())
    }
}

/// Handler that remembers every result it was given
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<FetchResults>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FetchResults> {
        self.calls.lock().clone()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|r| r.url.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle_response(&self, results: &FetchResults) {
        self.calls.lock().push(results.clone());
    }
}

/// Runs a fetch manager against the scripted datastore for `duration`, then
/// stops it and waits for a clean shutdown
pub async fn run_fetcher(
    config: Config,
    datastore: Arc<ScriptedDatastore>,
    handler: Arc<RecordingHandler>,
    duration: Duration,
) {
    let manager = Arc::new(FetchManager::new(Arc::new(config), datastore, handler));

    let runner = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    tokio::time::sleep(duration).await;
    manager.stop();
    runner
        .await
        .expect("manager task panicked")
        .expect("manager returned an error");
}

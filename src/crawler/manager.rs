//! Fetch manager
//!
//! Owns the pool of concurrent host fetchers. The main loop claims domains
//! from the datastore and hands each to a free worker; when the datastore
//! has nothing to offer, the loop backs off briefly and retries. Stopping
//! cancels the shared token, lets every worker finish its current request,
//! and returns only after all claims are released.

use crate::config::Config;
use crate::crawler::client::build_http_client;
use crate::crawler::fetcher::{crawl_host, FetchContext};
use crate::handler::Handler;
use crate::robots::RobotsCache;
use crate::storage::Datastore;
use crate::url::{LinkFilter, Normalizer};
use crate::Result;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Pool of host fetchers fed by `claim_new_host`
///
/// ```no_run
/// use std::sync::Arc;
/// use trawler::config::Config;
/// use trawler::handler::NoopHandler;
/// use trawler::storage::MemoryDatastore;
/// use trawler::FetchManager;
///
/// # async fn example() -> trawler::Result<()> {
/// let config = Arc::new(Config::default());
/// let datastore = Arc::new(MemoryDatastore::new(true));
/// let manager = Arc::new(FetchManager::new(config, datastore, Arc::new(NoopHandler)));
///
/// let runner = tokio::spawn({
///     let manager = manager.clone();
///     async move { manager.run().await }
/// });
/// manager.stop();
/// runner.await.unwrap()?;
/// # Ok(())
/// # }
/// ```
pub struct FetchManager {
    config: Arc<Config>,
    datastore: Arc<dyn Datastore>,
    handler: Arc<dyn Handler>,
    client: Option<Client>,
    cancel: CancellationToken,
}

impl FetchManager {
    /// Creates a manager that will build the default HTTP transport
    pub fn new(
        config: Arc<Config>,
        datastore: Arc<dyn Datastore>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            config,
            datastore,
            handler,
            client: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Supplies a custom HTTP transport instead of the default one
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Token cancelled when the manager is asked to stop
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals the manager to stop claiming and wind down
    ///
    /// In-flight host fetchers finish their current HTTP request and release
    /// their claims; [`FetchManager::run`] returns once all of them have.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Runs the claim loop until stopped
    pub async fn run(&self) -> Result<()> {
        let client = match &self.client {
            Some(client) => client.clone(),
            None => build_http_client(&self.config.fetcher)?,
        };

        let fetcher_cfg = &self.config.fetcher;
        let robots_cfg = &self.config.robots;
        let context = Arc::new(FetchContext {
            config: self.config.clone(),
            client: client.clone(),
            datastore: self.datastore.clone(),
            handler: self.handler.clone(),
            robots: Arc::new(RobotsCache::new(
                client,
                fetcher_cfg.user_agent.clone(),
                robots_cfg.cache_capacity,
                robots_cfg.cache_ttl(),
                robots_cfg.unreachable_ttl(),
            )),
            normalizer: Arc::new(Normalizer::new(&fetcher_cfg.purge_sid_list)),
            filter: Arc::new(LinkFilter::new(
                &fetcher_cfg.include_link_patterns,
                &fetcher_cfg.exclude_link_patterns,
            )?),
            cancel: self.cancel.clone(),
        });

        tracing::info!(
            "Fetch manager starting with {} fetchers",
            fetcher_cfg.num_fetchers
        );

        let slots = Arc::new(Semaphore::new(fetcher_cfg.num_fetchers));
        let mut workers: JoinSet<()> = JoinSet::new();
        workers.spawn(heartbeat(context.clone()));

        loop {
            // Reap finished workers so the set stays small
            while workers.try_join_next().is_some() {}

            if self.cancel.is_cancelled() {
                break;
            }

            // Block until a worker slot frees up before claiming
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.datastore.claim_new_host().await {
                Ok(Some(domain)) => {
                    let context = context.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        crawl_host(&context, &domain).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.claim_backoff().await;
                }
                Err(e) => {
                    tracing::warn!("claim_new_host failed: {}", e);
                    drop(permit);
                    self.claim_backoff().await;
                }
            }
        }

        tracing::info!("Fetch manager stopping, waiting for workers to unclaim");
        while workers.join_next().await.is_some() {}
        tracing::info!("Fetch manager stopped");
        Ok(())
    }

    async fn claim_backoff(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.fetcher.claim_backoff()) => {}
        }
    }
}

/// Periodically refreshes claim times so a busy fetcher is not mistaken for
/// a crashed one by the dispatcher's stale-claim recovery
async fn heartbeat(context: Arc<FetchContext>) {
    let interval = context.config.dispatcher.claim_timeout() / 3;
    loop {
        tokio::select! {
            _ = context.cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = context.datastore.keep_alive().await {
                    tracing::debug!("keep_alive failed: {}", e);
                }
            }
        }
    }
}

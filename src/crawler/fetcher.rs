//! Per-host fetcher
//!
//! One fetcher owns one claimed registrable domain at a time and walks its
//! segment: robots check, pattern filter, conditional GET, manual redirect
//! following, response policy, then the datastore writes and the handler
//! call. Requests to the same host are strictly serialized with the
//! effective crawl delay between them; each link is an independent unit of
//! work and no error unwinds past this loop.

use crate::config::Config;
use crate::crawler::client::{self, HostSafety};
use crate::crawler::parser;
use crate::handler::Handler;
use crate::robots::{self, RobotsCache};
use crate::storage::{fnv1_64, Datastore, FetchResults};
use crate::url::{CrawlUrl, LinkFilter, Normalizer};
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, LOCATION};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Shared context handed to every host fetcher worker
pub(crate) struct FetchContext {
    pub config: Arc<Config>,
    pub client: Client,
    pub datastore: Arc<dyn Datastore>,
    pub handler: Arc<dyn Handler>,
    pub robots: Arc<RobotsCache>,
    pub normalizer: Arc<Normalizer>,
    pub filter: Arc<LinkFilter>,
    pub cancel: CancellationToken,
}

/// Per-claim bookkeeping: when the last request to each host started, so the
/// crawl delay is measured from request start to request start
type DelayBook = HashMap<String, Instant>;

/// Crawls one claimed domain to segment exhaustion, then releases the claim
///
/// The claim is released on every exit path, including shutdown and private
/// address refusal.
pub(crate) async fn crawl_host(ctx: &FetchContext, domain: &str) {
    tracing::debug!("Claimed domain {}", domain);

    // Pre-check the claim host itself; a private or unresolvable domain is
    // skipped without ever querying its segment.
    if ctx.config.fetcher.blacklist_private_ips {
        match client::check_host(domain).await {
            HostSafety::Safe => {}
            HostSafety::Private => {
                tracing::warn!("Refusing {}: resolves to a private address", domain);
                unclaim(ctx, domain).await;
                return;
            }
            HostSafety::Unresolvable => {
                tracing::debug!("Skipping {}: did not resolve", domain);
                unclaim(ctx, domain).await;
                return;
            }
        }
    }

    let mut links = match ctx.datastore.links_for_host(domain).await {
        Ok(links) => links,
        Err(e) => {
            tracing::warn!("Failed reading segment for {}: {}", domain, e);
            unclaim(ctx, domain).await;
            return;
        }
    };

    let mut delays = DelayBook::new();
    let mut safety_cache: HashMap<String, HostSafety> = HashMap::new();

    while let Some(link) = links.recv().await {
        if ctx.cancel.is_cancelled() {
            break;
        }
        fetch_link(ctx, link, &mut delays, &mut safety_cache).await;
    }

    unclaim(ctx, domain).await;
    tracing::debug!("Released domain {}", domain);
}

async fn unclaim(ctx: &FetchContext, domain: &str) {
    if let Err(e) = ctx.datastore.unclaim_host(domain).await {
        tracing::error!("Failed to unclaim {}: {}", domain, e);
    }
}

/// Processes a single segment link through the full fetch pipeline
async fn fetch_link(
    ctx: &FetchContext,
    link: CrawlUrl,
    delays: &mut DelayBook,
    safety_cache: &mut HashMap<String, HostSafety>,
) {
    let host = link.host().to_string();
    let authority = link.authority();

    // Nested hosts within the claim can still point at private space
    if ctx.config.fetcher.blacklist_private_ips {
        let safety = match safety_cache.get(&host) {
            Some(safety) => *safety,
            None => {
                let safety = client::check_host(&host).await;
                safety_cache.insert(host.clone(), safety);
                safety
            }
        };
        if safety != HostSafety::Safe {
            let reason = match safety {
                HostSafety::Private => "host resolves to a private address",
                _ => "host did not resolve",
            };
            let results = FetchResults::with_error(link, reason);
            store_results(ctx, &results).await;
            return;
        }
    }

    // Robots applies per host, not per claim domain
    let policy = ctx.robots.policy_for(link.scheme(), &authority).await;
    let agent = &ctx.config.fetcher.user_agent;
    if !policy.allowed(&link.request_uri(), agent) {
        tracing::debug!("robots.txt excludes {}", link);
        let results = FetchResults::robots_excluded(link);
        store_results(ctx, &results).await;
        return;
    }

    // Filtered links are skipped without leaving a trace
    if !ctx.filter.accepts(&link.request_uri()) {
        tracing::debug!("Link filter drops {}", link);
        return;
    }

    let delay = robots::effective_delay(
        &policy,
        agent,
        ctx.config.fetcher.default_crawl_delay(),
        ctx.config.fetcher.max_crawl_delay(),
    );
    if let Some(last_start) = delays.get(&authority) {
        let elapsed = last_start.elapsed();
        if elapsed < delay {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay - elapsed) => {}
            }
        }
    }
    delays.insert(authority, Instant::now());

    let mut results = FetchResults::new(link.clone());
    let response = match send_with_redirects(ctx, &link, &mut results).await {
        SendOutcome::Response(response) => response,
        SendOutcome::Error(error) => {
            // Transport failures are recorded but never retried here; the
            // datastore is the retry authority.
            tracing::debug!("Fetch of {} failed: {}", link, error);
            results.fetch_error = Some(error);
            store_results(ctx, &results).await;
            return;
        }
        SendOutcome::Cancelled => return,
    };

    let status = response.status();
    results.status = Some(status.as_u16());
    results.headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    results.mime_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(main_mime_type);

    // A redirect target is a discovered link in its own right
    if let Some(final_hop) = results.redirected_from.last() {
        if let Ok(target) = ctx.normalizer.parse(final_hop.as_str()) {
            if ctx.filter.accepts(&target.request_uri()) {
                if let Err(e) = ctx.datastore.store_parsed_url(&target, Some(&results)).await {
                    tracing::warn!("Failed to store redirect target {}: {}", target, e);
                }
            }
        }
    }

    // 304 means our stored copy is current; nothing to read or parse
    if status.as_u16() == 304 {
        store_results(ctx, &results).await;
        ctx.handler.handle_response(&results).await;
        return;
    }

    let max_body = ctx.config.fetcher.max_content_size_bytes;

    // Trust a declared Content-Length enough to skip the download entirely
    let declared_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(length) = declared_length {
        if length > max_body {
            tracing::debug!("{} declares {} bytes, over the {} cap", link, length, max_body);
            store_results(ctx, &results).await;
            return;
        }
    }

    // Content types off the accept list are recorded but not downloaded
    if let Some(mime) = &results.mime_type {
        if !ctx
            .config
            .fetcher
            .accept_formats
            .iter()
            .any(|accepted| accepted == mime)
        {
            tracing::debug!("{} has unaccepted content type {}", link, mime);
            store_results(ctx, &results).await;
            return;
        }
    }

    let body = match read_body(ctx, response, max_body).await {
        ReadOutcome::Body(body) => body,
        ReadOutcome::TooLarge => {
            results.fetch_error = Some(format!("body exceeded {} bytes, fetch aborted", max_body));
            store_results(ctx, &results).await;
            return;
        }
        ReadOutcome::Error(error) => {
            results.fetch_error = Some(error);
            store_results(ctx, &results).await;
            return;
        }
        ReadOutcome::Cancelled => return,
    };

    results.fnv_fingerprint = fnv1_64(&body);
    let text = String::from_utf8_lossy(&body).into_owned();
    results.body = Some(text);

    // Only successful HTML responses feed the link graph
    let is_html = matches!(results.mime_type.as_deref(), None | Some("text/html"));
    if status.is_success() && is_html {
        extract_and_store(ctx, &mut results).await;
    }

    store_results(ctx, &results).await;

    let suppress_handler = ctx.config.fetcher.honor_meta_noindex && results.meta_noindex;
    if suppress_handler {
        tracing::debug!("meta noindex suppresses handler for {}", results.url);
    } else {
        ctx.handler.handle_response(&results).await;
    }
}

/// Parses outlinks from the fetched body and records the survivors
///
/// Every `store_parsed_url` call lands before the page's own result write,
/// so a reader observing the result sees all extracted links.
async fn extract_and_store(ctx: &FetchContext, results: &mut FetchResults) {
    let body = results.body.clone().unwrap_or_default();
    let base = results.final_url().clone();
    let extracted = parser::extract_links(&base, &body, &ctx.normalizer);

    results.meta_noindex = extracted.meta.noindex;
    results.meta_nofollow = extracted.meta.nofollow;

    if ctx.config.fetcher.honor_meta_nofollow && extracted.meta.nofollow {
        tracing::debug!("meta nofollow drops {} links from {}", extracted.links.len(), results.url);
        return;
    }

    for link in extracted.links {
        if !ctx.filter.accepts(&link.request_uri()) {
            continue;
        }
        if let Err(e) = ctx.datastore.store_parsed_url(&link, Some(results)).await {
            tracing::warn!("Failed to store parsed link {}: {}", link, e);
        }
    }
}

async fn store_results(ctx: &FetchContext, results: &FetchResults) {
    if let Err(e) = ctx.datastore.store_url_fetch_results(results).await {
        tracing::warn!("Failed to store fetch results for {}: {}", results.url, e);
    }
}

enum SendOutcome {
    Response(reqwest::Response),
    Error(String),
    Cancelled,
}

/// Issues the GET, following redirects manually up to the configured limit
/// and recording each hop in `results.redirected_from`
async fn send_with_redirects(
    ctx: &FetchContext,
    link: &CrawlUrl,
    results: &mut FetchResults,
) -> SendOutcome {
    let max_redirects = ctx.config.fetcher.max_redirects;
    let if_modified_since = link.last_crawled.map(format_rfc1123);

    let mut current: Url = link.as_url().clone();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(current.as_str().to_string());

    for _ in 0..=max_redirects {
        let mut request = ctx.client.get(current.as_str());
        if let Some(since) = &if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, since.as_str());
        }

        let sent = tokio::select! {
            _ = ctx.cancel.cancelled() => return SendOutcome::Cancelled,
            sent = request.send() => sent,
        };
        let response = match sent {
            Ok(response) => response,
            Err(e) => return SendOutcome::Error(describe_transport_error(&e)),
        };

        if !response.status().is_redirection() {
            return SendOutcome::Response(response);
        }

        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return SendOutcome::Error("redirect without Location header".to_string());
        };
        let next = match current.join(location.trim()) {
            Ok(next) => next,
            Err(e) => {
                return SendOutcome::Error(format!("invalid redirect URL {}: {}", location, e))
            }
        };
        if !visited.insert(next.as_str().to_string()) {
            return SendOutcome::Error(format!("redirect loop detected at {}", next));
        }

        tracing::debug!("Following redirect {} -> {}", current, next);
        results.redirected_from.push(next.clone());
        current = next;
    }

    SendOutcome::Error(format!("too many redirects (max {})", max_redirects))
}

enum ReadOutcome {
    Body(Vec<u8>),
    TooLarge,
    Error(String),
    Cancelled,
}

/// Streams the response body under the hard byte cap
async fn read_body(
    ctx: &FetchContext,
    mut response: reqwest::Response,
    max_bytes: u64,
) -> ReadOutcome {
    let mut body: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = ctx.cancel.cancelled() => return ReadOutcome::Cancelled,
            chunk = response.chunk() => chunk,
        };
        match chunk {
            Ok(Some(bytes)) => {
                if body.len() as u64 + bytes.len() as u64 > max_bytes {
                    return ReadOutcome::TooLarge;
                }
                body.extend_from_slice(&bytes);
            }
            Ok(None) => return ReadOutcome::Body(body),
            Err(e) => return ReadOutcome::Error(describe_transport_error(&e)),
        }
    }
}

/// Reduces a Content-Type header to its `type/subtype` part
fn main_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Formats a timestamp the way `If-Modified-Since` wants it (RFC 1123)
fn format_rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timeout: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

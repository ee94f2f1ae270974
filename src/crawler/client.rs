//! HTTP client construction and address safety checks
//!
//! The fetch manager builds this default transport when the embedding
//! application does not supply its own: redirects are disabled so the host
//! fetcher can follow them manually and record the chain.

use crate::config::FetcherConfig;
use reqwest::{redirect::Policy, Client};
use std::net::IpAddr;

/// Builds the default HTTP client from fetcher configuration
///
/// The configured timeout is a total budget covering connect, first byte,
/// and body read.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.http_timeout())
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of resolving a host before fetching it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSafety {
    /// Host resolves to publicly routable addresses only
    Safe,

    /// At least one resolved address is loopback, link-local, private, or
    /// multicast
    Private,

    /// Host did not resolve at all
    Unresolvable,
}

/// Resolves a host and classifies its addresses
///
/// Used when `blacklist-private-ips` is enabled, both for the claimed domain
/// before its segment is read and for individual link hosts.
pub async fn check_host(host: &str) -> HostSafety {
    let addrs = match tokio::net::lookup_host((host, 80u16)).await {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(_) => return HostSafety::Unresolvable,
    };

    if addrs.is_empty() {
        return HostSafety::Unresolvable;
    }
    if addrs.iter().any(|addr| is_private_ip(addr.ip())) {
        return HostSafety::Private;
    }
    HostSafety::Safe
}

/// True for addresses the crawler must never fetch from the public internet
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

//! Crawler module: fetching and parsing
//!
//! The fetch manager claims domains and drives a pool of per-host fetchers;
//! the parser turns fetched HTML into canonical outlinks. HTTP transport
//! construction lives here too so embedders can swap in their own client.

mod client;
mod fetcher;
mod manager;
mod parser;

pub use client::{build_http_client, is_private_ip, HostSafety};
pub use manager::FetchManager;
pub use parser::{extract_links, ExtractedPage, PageMeta};

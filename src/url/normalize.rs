//! URL normalization rules
//!
//! Every URL entering the link graph passes through [`Normalizer`], so the
//! datastore only ever sees one spelling of a given page.

use crate::url::CrawlUrl;
use crate::UrlError;
use url::Url;

/// Session-identifier parameters stripped by default during normalization
pub const DEFAULT_PURGE_SIDS: &[&str] = &["jsessionid", "phpsessid", "aspsessionid"];

/// Normalizes raw URL strings into canonical [`CrawlUrl`] values
///
/// # Normalization Steps
///
/// 1. Parse as an absolute URI; reject if the scheme is not http or https
/// 2. Lowercase scheme and host, punycode IDN hosts (done by the `url` crate)
/// 3. Elide default ports (80 for http, 443 for https)
/// 4. Drop the fragment
/// 5. Strip session identifiers from path parameters (`;name=value`) and
///    the query string, matching names case-insensitively
/// 6. Sort remaining query parameters by key, preserving the value order of
///    repeated keys
/// 7. Replace an empty path with `/`
///
/// The configured purge list replaces the default one wholesale, mirroring
/// the `purge-sid-list` config key.
#[derive(Debug, Clone)]
pub struct Normalizer {
    purge_sids: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_SIDS)
    }
}

impl Normalizer {
    /// Creates a normalizer with the given session-identifier names
    pub fn new<S: AsRef<str>>(purge_sids: &[S]) -> Self {
        Self {
            purge_sids: purge_sids
                .iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Parses an absolute URL string into canonical form
    ///
    /// Leading and trailing whitespace is trimmed first. Relative references
    /// are rejected; use [`Normalizer::resolve`] for hrefs found in pages.
    pub fn parse(&self, input: &str) -> Result<CrawlUrl, UrlError> {
        let url = Url::parse(input.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        self.canonicalize(url)
    }

    /// Resolves an href against a base URL, then normalizes the result
    ///
    /// This is the entry point for links extracted from HTML: hrefs are
    /// trimmed of surrounding whitespace before resolution, and both
    /// relative and absolute forms are accepted.
    pub fn resolve(&self, base: &Url, href: &str) -> Result<CrawlUrl, UrlError> {
        let href = href.trim();
        if href.is_empty() {
            return Err(UrlError::Malformed("empty href".to_string()));
        }
        let url = base
            .join(href)
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        self.canonicalize(url)
    }

    fn canonicalize(&self, mut url: Url) -> Result<CrawlUrl, UrlError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(UrlError::InvalidScheme(other.to_string())),
        }

        if url.host_str().is_none() {
            return Err(UrlError::MissingHost);
        }

        url.set_fragment(None);

        // Path parameters can carry session ids too (";jsessionid=...").
        let stripped = self.strip_path_sids(url.path());
        if stripped != url.path() {
            url.set_path(&stripped);
        }
        if url.path().is_empty() {
            url.set_path("/");
        }

        if url.query().is_some() {
            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !self.is_sid(key))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();

            // sort_by is stable, so repeated keys keep their value order
            pairs.sort_by(|a, b| a.0.cmp(&b.0));

            if pairs.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }

        Ok(CrawlUrl::from_canonical(url))
    }

    /// Removes `;name=value` path parameters whose name is on the purge list
    fn strip_path_sids(&self, path: &str) -> String {
        if !path.contains(';') {
            return path.to_string();
        }

        path.split('/')
            .map(|segment| {
                if !segment.contains(';') {
                    return segment.to_string();
                }
                let mut pieces = segment.split(';');
                let mut kept = vec![pieces.next().unwrap_or_default().to_string()];
                for param in pieces {
                    let name = param.split('=').next().unwrap_or(param);
                    if !self.is_sid(name) {
                        kept.push(param.to_string());
                    }
                }
                kept.join(";")
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn is_sid(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.purge_sids.iter().any(|sid| *sid == lower)
    }
}

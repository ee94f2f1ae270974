use psl::domain_str;

/// Returns the registrable domain for a host: the public suffix plus one
/// label, looked up in the embedded public-suffix table.
///
/// Hosts that have no recognizable public suffix (IP literals, `localhost`,
/// bare labels) are returned unchanged so they still form a usable claim key.
///
/// # Examples
///
/// ```
/// use trawler::url::domain_plus_one;
///
/// assert_eq!(domain_plus_one("www.foo.co.uk"), "foo.co.uk");
/// assert_eq!(domain_plus_one("sub.foo.com"), "foo.com");
/// assert_eq!(domain_plus_one("localhost"), "localhost");
/// ```
pub fn domain_plus_one(host: &str) -> String {
    // IP literals have no registrable domain; the suffix algorithm would
    // otherwise split them like dotted hostnames
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<std::net::IpAddr>().is_ok() {
        return host.to_string();
    }

    domain_str(host)
        .map(|d| d.to_string())
        .unwrap_or_else(|| host.to_string())
}

/// Returns the subdomain labels of `host` in front of `domain`, without the
/// joining dot. Returns an empty string when the host is the domain itself
/// or does not end with it.
pub fn subdomain_of(host: &str, domain: &str) -> String {
    host.strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or("")
        .to_string()
}

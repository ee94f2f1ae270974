//! Datastore schema emission
//!
//! The `schema` command prints the wide-column DDL for the three logical
//! tables the crawler persists (domain records, link history, segments) plus
//! the domains-to-crawl index, substituting schema-relevant configuration.

/// DDL template; `{keyspace}` and `{replication_factor}` are substituted
/// from configuration
const SCHEMA_TEMPLATE: &str = r#"-- trawler datastore schema
CREATE KEYSPACE IF NOT EXISTS {keyspace}
    WITH REPLICATION = { 'class': 'SimpleStrategy', 'replication_factor': {replication_factor} };

-- One record per registrable domain
CREATE TABLE IF NOT EXISTS {keyspace}.domain_info (
    domain text PRIMARY KEY,
    excluded boolean,
    exclude_reason text,
    mirror_of text,
    total_links bigint,
    queued_links bigint,
    claim_token uuid,
    claim_time timestamp,
    priority int,
    dispatched boolean
);

-- Append-only fetch history, newest attempt first
CREATE TABLE IF NOT EXISTS {keyspace}.links (
    domain text,
    subdomain text,
    path text,
    protocol text,
    crawl_time timestamp,
    status int,
    error text,
    robots_excluded boolean,
    redirected_to text,
    get_now boolean,
    mime text,
    fnv_fingerprint bigint,
    headers map<text, text>,
    body text,
    PRIMARY KEY ((domain, subdomain, path, protocol), crawl_time)
) WITH CLUSTERING ORDER BY (crawl_time DESC);

-- Links promoted for the current fetch round of each domain
CREATE TABLE IF NOT EXISTS {keyspace}.segments (
    domain text,
    subdomain text,
    path text,
    protocol text,
    PRIMARY KEY (domain, subdomain, path, protocol)
);

-- Claimable domains indexed by claim token and priority
CREATE TABLE IF NOT EXISTS {keyspace}.domains_to_crawl (
    claim_token uuid,
    priority int,
    domain text,
    claim_time timestamp,
    PRIMARY KEY (claim_token, priority, domain)
);
"#;

/// Renders the schema with the configured keyspace and replication factor
pub fn render_schema(keyspace: &str, replication_factor: u32) -> String {
    SCHEMA_TEMPLATE
        .replace("{keyspace}", keyspace)
        .replace("{replication_factor}", &replication_factor.to_string())
}

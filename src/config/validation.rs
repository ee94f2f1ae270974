use crate::config::types::{Config, DatastoreConfig, DispatcherConfig, FetcherConfig};
use crate::url::{LinkFilter, Normalizer};
use crate::ConfigError;

/// Validates the entire configuration
///
/// Configuration errors are fatal at startup, so everything that can be
/// rejected early is rejected here.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher(&config.fetcher)?;
    validate_dispatcher(&config.dispatcher)?;
    validate_datastore(config)?;
    Ok(())
}

fn validate_fetcher(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.num_fetchers < 1 || config.num_fetchers > 1000 {
        return Err(ConfigError::Validation(format!(
            "num-fetchers must be between 1 and 1000, got {}",
            config.num_fetchers
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.http_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "http-timeout-ms must be greater than zero".to_string(),
        ));
    }

    if config.max_content_size_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-content-size-bytes must be greater than zero".to_string(),
        ));
    }

    if config.accept_formats.is_empty() {
        return Err(ConfigError::Validation(
            "accept-formats cannot be empty".to_string(),
        ));
    }
    for format in &config.accept_formats {
        if !format.contains('/') {
            return Err(ConfigError::Validation(format!(
                "accept-formats entry '{}' is not a type/subtype mime type",
                format
            )));
        }
    }

    if config.max_crawl_delay_ms < config.default_crawl_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-crawl-delay-ms ({}) must be at least default-crawl-delay-ms ({})",
            config.max_crawl_delay_ms, config.default_crawl_delay_ms
        )));
    }

    // Compile once here so a bad pattern fails startup, not the first fetch
    LinkFilter::new(&config.include_link_patterns, &config.exclude_link_patterns)?;

    Ok(())
}

fn validate_dispatcher(config: &DispatcherConfig) -> Result<(), ConfigError> {
    if config.segment_size < 1 {
        return Err(ConfigError::Validation(
            "segment-size must be at least 1".to_string(),
        ));
    }

    if config.claim_timeout_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "claim-timeout-ms must be at least 1000, got {}",
            config.claim_timeout_ms
        )));
    }

    Ok(())
}

fn validate_datastore(config: &Config) -> Result<(), ConfigError> {
    validate_keyspace(&config.datastore)?;

    let normalizer = Normalizer::new(&config.fetcher.purge_sid_list);
    for seed in &config.datastore.seeds {
        normalizer
            .parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
    }

    Ok(())
}

fn validate_keyspace(config: &DatastoreConfig) -> Result<(), ConfigError> {
    if config.keyspace.is_empty() {
        return Err(ConfigError::Validation(
            "keyspace cannot be empty".to_string(),
        ));
    }

    if !config
        .keyspace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "keyspace '{}' may only contain alphanumerics and underscores",
            config.keyspace
        )));
    }

    if config.replication_factor < 1 {
        return Err(ConfigError::Validation(
            "replication-factor must be at least 1".to_string(),
        ));
    }

    Ok(())
}

//! Configuration module
//!
//! Loads the process-wide TOML configuration, applies defaults, and rejects
//! invalid settings at startup. The loaded [`Config`] is immutable and
//! shared by reference with every component.

mod parser;
mod types;
mod validation;

pub use parser::load_config;
pub use types::{
    Config, DatastoreConfig, DispatcherConfig, FetcherConfig, HandlerConfig, RobotsConfig,
};
pub use validation::validate;

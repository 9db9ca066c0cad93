//! Configuration module for Quote-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so an empty file describes the stock listing
//! endpoint with the standard crawl settings.
//!
//! # Example
//!
//! ```no_run
//! use quote_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Fetching {} pages at once", config.crawler.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, EndpointConfig, HttpConfig, StorageConfig, DEFAULT_PAGE_SIZE,
    PAGE_PLACEHOLDER,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, default_config_with_hash, load_config, load_config_with_hash,
    parse_config,
};
pub use validation::validate;

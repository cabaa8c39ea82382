//! Configuration module for Rally-Graph
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use rally_graph::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("rally.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, PacingConfig, SeedEntry, SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

#[cfg(test)]
pub(crate) use parser::parse_config;

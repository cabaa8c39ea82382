//! Rally-Graph: an incremental crawler for public sports-results sites
//!
//! This crate walks player profiles on a results site, reconstructs the graph of
//! players connected by the matches they played, and persists a deduplicated
//! record of those matches together with a data-quality trail.

pub mod audit;
pub mod config;
pub mod crawler;
pub mod matches;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Rally-Graph operations
#[derive(Debug, Error)]
pub enum RallyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Extraction error for player {player_id}: {message}")]
    Extraction { player_id: i64, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Transport-level failures while fetching a page
///
/// These are kept apart from extraction problems: a fetch error fails the
/// player's queue item, an extraction problem only degrades the data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDenied { url: String },

    #[error("Cannot build URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Rally-Graph operations
pub type Result<T> = std::result::Result<T, RallyError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use matches::{ParsedMatch, Side};
pub use state::{Pacer, QueueStatus};

//! Output module for crawl reports
//!
//! This module handles:
//! - The running quality report printed at the end of a crawl
//! - Frontier and store statistics for the operator status view
//! - Writing the integrity audit as markdown

mod markdown;
pub mod stats;

pub use markdown::{format_audit_markdown, write_audit_markdown};
pub use stats::{load_statistics, print_statistics, CrawlStatistics, QualityReport};

use thiserror::Error;

/// Errors that can occur while writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Report path is empty")]
    EmptyPath,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

//! Crawler module: fetching, extraction and crawl coordination
//!
//! This module contains the crawl side of the system, including:
//! - The depth-bounded frontier queue
//! - HTTP fetching of profile and season pages
//! - Extraction of match records from season markup
//! - The orchestrator loop tying them together

mod coordinator;
mod fetcher;
mod frontier;
pub mod parser;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, HttpFetcher, PageFetcher};
pub use frontier::{Frontier, FrontierSummary};
pub use parser::{extract_matches, parse_profile, PlayerProfile, SeasonRef};

use crate::config::{Config, SeedEntry};
use crate::output::QualityReport;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl invocation against the configured site
///
/// Enqueues the configured seeds, then `extra_seeds` with force-reset, and
/// crawls until cancelled or `max_players` players reached a terminal state.
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    extra_seeds: &[SeedEntry],
    max_players: Option<u64>,
    cancel: CancellationToken,
) -> crate::Result<QualityReport> {
    let mut coordinator = Coordinator::from_config(config, config_hash, cancel).await?;
    coordinator.seed_from_config()?;
    if !extra_seeds.is_empty() {
        let queued = coordinator.seed(extra_seeds, true)?;
        tracing::info!("Re-queued {} seed players for a fresh scrape", queued);
    }
    coordinator.run(max_players).await
}

//! Crawl statistics and the running quality report
//!
//! `QualityReport` is kept in memory by the orchestrator while a crawl runs.
//! `CrawlStatistics` is read back from the database for `--status`.

use crate::crawler::FrontierSummary;
use crate::matches::ValidationResult;
use crate::state::QueueStatus;
use crate::storage::{FrontierStore, MatchArchive, RunRecord, RunStore};
use crate::RallyError;
use std::collections::BTreeMap;
use std::fmt;

/// Running counters for one crawl invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub matches_seen: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Accepted despite warnings
    pub warned: u64,
    pub duplicates_skipped: u64,
    pub persist_failures: u64,
    pub players_completed: u64,
    pub players_failed: u64,
    pub seasons_failed: u64,
    /// Queue status changes rejected by storage, e.g. after `--clear-queue`
    pub queue_update_failures: u64,
    pub error_categories: BTreeMap<&'static str, u64>,
    pub warning_categories: BTreeMap<&'static str, u64>,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one validated record and its findings by category
    pub fn record_validation(&mut self, result: &ValidationResult) {
        self.matches_seen += 1;
        if !result.is_valid() {
            self.rejected += 1;
        } else if result.has_warnings() {
            self.warned += 1;
        }

        for finding in &result.errors {
            *self.error_categories.entry(finding.category).or_insert(0) += 1;
        }
        for finding in &result.warnings {
            *self.warning_categories.entry(finding.category).or_insert(0) += 1;
        }
    }

    /// Players that reached a terminal state this run
    pub fn players_processed(&self) -> u64 {
        self.players_completed + self.players_failed
    }

    pub fn print(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Quality Report ===\n")?;

        writeln!(f, "Players:")?;
        writeln!(f, "  Completed: {}", self.players_completed)?;
        writeln!(f, "  Failed: {}", self.players_failed)?;
        writeln!(f, "  Seasons failed: {}", self.seasons_failed)?;
        if self.queue_update_failures > 0 {
            writeln!(f, "  Queue updates rejected: {}", self.queue_update_failures)?;
        }
        writeln!(f)?;

        writeln!(f, "Matches:")?;
        writeln!(f, "  Seen: {}", self.matches_seen)?;
        writeln!(f, "  Stored: {}", self.accepted)?;
        writeln!(f, "  Rejected: {}", self.rejected)?;
        writeln!(f, "  Stored with warnings: {}", self.warned)?;
        writeln!(f, "  Duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "  Persistence failures: {}", self.persist_failures)?;
        writeln!(f)?;

        write_categories(f, "Errors by category", &self.error_categories)?;
        write_categories(f, "Warnings by category", &self.warning_categories)
    }
}

fn write_categories(
    f: &mut fmt::Formatter<'_>,
    heading: &str,
    categories: &BTreeMap<&'static str, u64>,
) -> fmt::Result {
    if categories.is_empty() {
        return Ok(());
    }

    writeln!(f, "{}:", heading)?;
    let mut counts: Vec<_> = categories.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (category, count) in counts {
        writeln!(f, "  {}: {}", category, count)?;
    }
    writeln!(f)
}

/// Store-wide statistics for the operator status view
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub frontier: FrontierSummary,
    pub total_matches: u64,
    pub total_players: u64,
    pub placeholder_players: u64,
    pub latest_run: Option<RunRecord>,
    /// Validation log of the latest run as (level, category, count)
    pub validation: Vec<(String, String, u64)>,
}

/// Loads statistics from storage
pub fn load_statistics<S>(storage: &S, failure_limit: usize) -> Result<CrawlStatistics, RallyError>
where
    S: FrontierStore + MatchArchive + RunStore,
{
    let frontier = FrontierSummary::load(storage, failure_limit)?;
    let total_matches = storage.count_matches()?;
    let (total_players, placeholder_players) = storage.count_players()?;
    let latest_run = storage.get_latest_run()?;
    let validation = match &latest_run {
        Some(run) => storage.validation_summary(Some(run.id))?,
        None => Vec::new(),
    };

    Ok(CrawlStatistics {
        frontier,
        total_matches,
        total_players,
        placeholder_players,
        latest_run,
        validation,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Status ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run:");
        println!("  Run ID: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Players processed: {}", run.players_processed);
        println!();
    }

    let total = stats.frontier.total();
    println!("Frontier ({} items):", total);
    for status in QueueStatus::all() {
        let count = stats.frontier.count(status);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.frontier.by_depth.is_empty() {
        println!("By depth:");
        for (depth, count) in &stats.frontier.by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    if !stats.frontier.recent_failures.is_empty() {
        println!("Recent failures:");
        for item in &stats.frontier.recent_failures {
            println!(
                "  player {} (attempts {}, last {}): {}",
                item.player_id,
                item.attempts,
                item.last_attempt_at.as_deref().unwrap_or("-"),
                item.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    println!("Store:");
    println!("  Matches: {}", stats.total_matches);
    println!(
        "  Players: {} ({} placeholders)",
        stats.total_players, stats.placeholder_players
    );

    if !stats.validation.is_empty() {
        println!();
        println!("Validation log (latest run):");
        for (level, category, count) in &stats.validation {
            println!("  {} {}: {}", level, category, count);
        }
    }
}

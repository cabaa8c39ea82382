//! Storage traits and error types
//!
//! The crawl talks to storage through three narrow interfaces: the frontier
//! queue (plus run bookkeeping), the entity store the orchestrator writes
//! into, and the read-only match archive the auditor works from.

use crate::state::QueueStatus;
use crate::storage::{
    EnqueueOutcome, InsertOutcome, MatchRecord, NewMatch, QueueItem, RunRecord, RunStatus,
    TournamentRecord, ValidationLogEntry,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Queue item not found for player {0}")]
    QueueItemNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid queue transition for player {player_id}: {from} -> {to}")]
    InvalidTransition {
        player_id: i64,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Crawl runs
pub trait RunStore {
    /// Creates a new running crawl run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Stamps the finish time, final status and processed count
    fn finish_run(&mut self, run_id: i64, status: RunStatus, processed: u64)
        -> StorageResult<()>;
}

/// Persistent frontier queue
///
/// Every status change is a single conditional UPDATE, so an item never shows
/// a partial write of status, attempts and timestamp.
pub trait FrontierStore {
    /// Inserts a new pending item or handles an existing one per `force_reset`
    ///
    /// A forced reset sets the item pending, clears its error, takes the new
    /// priority and keeps the smaller depth.
    fn enqueue_item(
        &mut self,
        player_id: i64,
        priority: i64,
        depth: u32,
        origin_id: Option<i64>,
        force_reset: bool,
    ) -> StorageResult<EnqueueOutcome>;

    /// Highest-priority pending item, FIFO within a priority
    ///
    /// Items deeper than `max_depth` are never returned.
    fn next_pending(&self, max_depth: Option<u32>) -> StorageResult<Option<QueueItem>>;

    fn get_queue_item(&self, player_id: i64) -> StorageResult<Option<QueueItem>>;

    /// Moves an item along pending → processing → {completed | failed}
    ///
    /// Entering processing bumps the attempt count and stamps the attempt
    /// time. Entering failed records `error`.
    fn transition(
        &mut self,
        player_id: i64,
        next: QueueStatus,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Operator reset: every item in `from` goes back to pending
    fn reset_to_pending(&mut self, from: QueueStatus) -> StorageResult<usize>;

    /// Operator action: deletes every item
    fn clear_queue(&mut self) -> StorageResult<usize>;

    fn count_by_status(&self) -> StorageResult<HashMap<QueueStatus, u64>>;

    /// Item counts per depth, ascending
    fn count_by_depth(&self) -> StorageResult<Vec<(u32, u64)>>;

    /// Most recently attempted failed items
    fn recent_failures(&self, limit: usize) -> StorageResult<Vec<QueueItem>>;
}

/// Entity writes made by the crawl orchestrator
///
/// Every operation is idempotent under retry.
pub trait EntityStore {
    /// Stores a crawled profile and clears the placeholder flag
    fn upsert_player(
        &mut self,
        player_id: i64,
        name: &str,
        fields: &[(String, String)],
    ) -> StorageResult<()>;

    /// Ensures a row exists for a player seen only as opponent or partner
    ///
    /// A crawled profile is never downgraded back to a placeholder.
    fn upsert_placeholder(&mut self, player_id: i64, name: &str) -> StorageResult<()>;

    fn ensure_season(&mut self, code: &str, label: &str) -> StorageResult<()>;

    fn upsert_tournament(&mut self, tournament: &TournamentRecord) -> StorageResult<()>;

    fn match_exists(&self, match_key: &str) -> StorageResult<bool>;

    /// Writes the match unless an equivalent one is already stored
    fn insert_match(&mut self, new_match: &NewMatch) -> StorageResult<InsertOutcome>;

    fn log_validation(&mut self, entry: &ValidationLogEntry) -> StorageResult<()>;
}

/// Read access to stored matches, plus operator repair
pub trait MatchArchive {
    /// Every player id appearing on any side of a stored match
    fn players_with_matches(&self) -> StorageResult<Vec<i64>>;

    fn tournaments_for_player(&self, player_id: i64) -> StorageResult<Vec<i64>>;

    /// Stored matches involving the player, optionally within one tournament
    fn matches_for_player(
        &self,
        player_id: i64,
        tournament_id: Option<i64>,
    ) -> StorageResult<Vec<MatchRecord>>;

    fn all_matches(&self) -> StorageResult<Vec<MatchRecord>>;

    fn delete_matches(&mut self, ids: &[i64]) -> StorageResult<usize>;

    fn count_matches(&self) -> StorageResult<u64>;

    /// (total players, placeholders)
    fn count_players(&self) -> StorageResult<(u64, u64)>;

    /// Validation log counts as (level, category, count), largest first
    fn validation_summary(&self, run_id: Option<i64>) -> StorageResult<Vec<(String, String, u64)>>;
}

//! Storage module for persisting crawl data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The crawl frontier (queue items and their status transitions)
//! - Players, seasons, tournaments and deduplicated matches
//! - Run tracking and the validation log behind the quality report

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{EntityStore, FrontierStore, MatchArchive, RunStore, StorageError, StorageResult};

use crate::matches::{build_match_key, CompetitionKind, MatchKind, ParsedMatch, Side};
use crate::state::QueueStatus;
use crate::RallyError;
use chrono::NaiveDate;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, RallyError> {
    SqliteStorage::new(path)
}

/// One crawl task in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: i64,
    pub player_id: i64,
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: u32,
    pub depth: u32,
    pub origin_id: Option<i64>,
    pub created_at: String,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
}

/// What `enqueue` did with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// Already queued; left as it was
    Unchanged,
    /// Already queued; forced back to pending
    Reset,
    /// Beyond the configured depth bound
    TooDeep,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub players_processed: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Tournament metadata as upserted by the crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentRecord {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub season_code: Option<String>,
}

/// Result of `insert_match`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// An equivalent match is already stored; nothing was written
    Duplicate,
}

/// A match ready to be written, laid out by markup side
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub tournament_id: i64,
    pub season_code: Option<String>,
    pub round: String,
    pub match_kind: MatchKind,
    pub competition_kind: CompetitionKind,
    pub side_a: [Option<i64>; 2],
    pub side_b: [Option<i64>; 2],
    pub score: String,
    pub walkover: bool,
    pub winner_side: Side,
    pub winner_certain: bool,
    pub points: i32,
    pub recorded_for: i64,
    pub match_key: String,
}

impl NewMatch {
    /// Lays a subject-relative record out by markup side
    ///
    /// Returns None without a tournament id; such records never pass validation.
    pub fn from_parsed(parsed: &ParsedMatch, season_code: Option<&str>) -> Option<NewMatch> {
        let tournament_id = parsed.tournament_id?;
        let subject = [Some(parsed.subject_id), parsed.partner_id];
        let opponents = [parsed.opponent_id, parsed.opponent_partner_id];
        let (side_a, side_b) = match parsed.subject_side {
            Side::Left => (subject, opponents),
            Side::Right => (opponents, subject),
        };

        Some(NewMatch {
            tournament_id,
            season_code: season_code.map(str::to_string),
            round: parsed.round.trim().to_string(),
            match_kind: parsed.match_kind.clone(),
            competition_kind: parsed.competition_kind.clone(),
            side_a,
            side_b,
            score: parsed.score.trim().to_string(),
            walkover: parsed.walkover,
            winner_side: parsed.winner_side(),
            winner_certain: parsed.winner_certain,
            points: parsed.points,
            recorded_for: parsed.subject_id,
            match_key: parsed.match_key(),
        })
    }
}

/// A stored match as read back by the auditor
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: i64,
    pub tournament_id: i64,
    pub season_code: Option<String>,
    pub round: String,
    pub match_kind: MatchKind,
    pub competition_kind: CompetitionKind,
    pub side_a: [Option<i64>; 2],
    pub side_b: [Option<i64>; 2],
    pub score: String,
    pub walkover: bool,
    pub winner_side: Side,
    pub winner_certain: bool,
    pub points: i32,
    pub recorded_for: i64,
    pub match_key: String,
}

impl MatchRecord {
    pub fn side_ids(&self, side: Side) -> Vec<i64> {
        let ids = match side {
            Side::Left => &self.side_a,
            Side::Right => &self.side_b,
        };
        ids.iter().flatten().copied().collect()
    }

    /// Side the player appears on, if any
    pub fn side_of(&self, player_id: i64) -> Option<Side> {
        if self.side_a.contains(&Some(player_id)) {
            Some(Side::Left)
        } else if self.side_b.contains(&Some(player_id)) {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Whether the player won according to the stored winner side
    pub fn player_won(&self, player_id: i64) -> Option<bool> {
        self.side_of(player_id).map(|side| side == self.winner_side)
    }

    /// Duplicate key recomputed from the stored columns
    pub fn canonical_key(&self) -> String {
        build_match_key(
            self.tournament_id,
            &self.round,
            &self.side_ids(Side::Left),
            &self.side_ids(Side::Right),
            &self.match_kind,
        )
    }
}

/// Severity recorded in the validation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// One rejected or warned record note
#[derive(Debug, Clone)]
pub struct ValidationLogEntry {
    pub run_id: i64,
    pub player_id: i64,
    pub tournament_id: Option<i64>,
    pub round: Option<String>,
    pub level: LogLevel,
    pub category: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::fixtures::singles_win;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let parsed = RunStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(*status), parsed);
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_new_match_layout_subject_left() {
        let m = NewMatch::from_parsed(&singles_win(), Some("2024")).unwrap();
        assert_eq!(m.side_a, [Some(5), None]);
        assert_eq!(m.side_b, [Some(9), None]);
        assert_eq!(m.winner_side, Side::Left);
        assert_eq!(m.recorded_for, 5);
    }

    #[test]
    fn test_new_match_layout_subject_right() {
        let mut parsed = singles_win();
        parsed.subject_side = Side::Right;
        parsed.subject_won = false;

        let m = NewMatch::from_parsed(&parsed, None).unwrap();
        assert_eq!(m.side_a, [Some(9), None]);
        assert_eq!(m.side_b, [Some(5), None]);
        assert_eq!(m.winner_side, Side::Left);
    }

    #[test]
    fn test_new_match_requires_tournament() {
        let mut parsed = singles_win();
        parsed.tournament_id = None;
        assert!(NewMatch::from_parsed(&parsed, None).is_none());
    }
}

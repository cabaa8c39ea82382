//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::matches::{CompetitionKind, MatchKind, Side};
use crate::state::QueueStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    EntityStore, FrontierStore, MatchArchive, RunStore, StorageError, StorageResult,
};
use crate::storage::{
    EnqueueOutcome, InsertOutcome, MatchRecord, NewMatch, QueueItem, RunRecord, RunStatus,
    TournamentRecord, ValidationLogEntry,
};
use crate::RallyError;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const QUEUE_COLUMNS: &str = "id, player_id, priority, status, attempts, depth, origin_id, \
     created_at, last_attempt_at, last_error";

const MATCH_COLUMNS: &str = "id, tournament_id, season_code, round, match_kind, competition_kind, \
     side_a_player, side_a_partner, side_b_player, side_b_partner, score, walkover, \
     winner_side, winner_certain, points, recorded_for, match_key";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, players_processed";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, RallyError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, RallyError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection, for tests that need to plant rows directly
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Explains why a conditional status update touched no row
    fn rejected_transition(&self, player_id: i64, next: QueueStatus) -> StorageError {
        match self.get_queue_item(player_id) {
            Ok(Some(item)) => StorageError::InvalidTransition {
                player_id,
                from: item.status,
                to: next,
            },
            Ok(None) => StorageError::QueueItemNotFound(player_id),
            Err(e) => e,
        }
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn row_to_queue_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let status: String = row.get(3)?;
    Ok(QueueItem {
        id: row.get(0)?,
        player_id: row.get(1)?,
        priority: row.get(2)?,
        status: QueueStatus::from_db_string(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown queue status '{}'", status)))?,
        attempts: row.get(4)?,
        depth: row.get(5)?,
        origin_id: row.get(6)?,
        created_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
        last_error: row.get(9)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        players_processed: row.get(5)?,
    })
}

fn row_to_match(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    let winner: String = row.get(12)?;
    Ok(MatchRecord {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        season_code: row.get(2)?,
        round: row.get(3)?,
        match_kind: MatchKind::from_db_string(&row.get::<_, String>(4)?),
        competition_kind: CompetitionKind::from_db_string(&row.get::<_, String>(5)?),
        side_a: [row.get(6)?, row.get(7)?],
        side_b: [row.get(8)?, row.get(9)?],
        score: row.get(10)?,
        walkover: row.get(11)?,
        winner_side: Side::from_db_string(&winner)
            .ok_or_else(|| conversion_error(12, format!("unknown winner side '{}'", winner)))?,
        winner_certain: row.get(13)?,
        points: row.get(14)?,
        recorded_for: row.get(15)?,
        match_key: row.get(16)?,
    })
}

impl RunStore for SqliteStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        processed: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, players_processed = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, processed, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}

impl FrontierStore for SqliteStorage {
    fn enqueue_item(
        &mut self,
        player_id: i64,
        priority: i64,
        depth: u32,
        origin_id: Option<i64>,
        force_reset: bool,
    ) -> StorageResult<EnqueueOutcome> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO queue (player_id, priority, status, depth, origin_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(player_id) DO NOTHING",
            params![
                player_id,
                priority,
                QueueStatus::Pending.to_db_string(),
                depth,
                origin_id,
                now
            ],
        )?;

        if inserted == 1 {
            return Ok(EnqueueOutcome::Inserted);
        }
        if !force_reset {
            return Ok(EnqueueOutcome::Unchanged);
        }

        self.conn.execute(
            "UPDATE queue
             SET status = ?1, priority = ?2, depth = MIN(depth, ?3), last_error = NULL
             WHERE player_id = ?4",
            params![
                QueueStatus::Pending.to_db_string(),
                priority,
                depth,
                player_id
            ],
        )?;
        Ok(EnqueueOutcome::Reset)
    }

    fn next_pending(&self, max_depth: Option<u32>) -> StorageResult<Option<QueueItem>> {
        let depth_bound: i64 = max_depth.map(i64::from).unwrap_or(-1);
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM queue
                     WHERE status = ?1 AND (?2 < 0 OR depth <= ?2)
                     ORDER BY priority DESC, id ASC
                     LIMIT 1",
                    QUEUE_COLUMNS
                ),
                params![QueueStatus::Pending.to_db_string(), depth_bound],
                row_to_queue_item,
            )
            .optional()?;
        Ok(item)
    }

    fn get_queue_item(&self, player_id: i64) -> StorageResult<Option<QueueItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {} FROM queue WHERE player_id = ?1", QUEUE_COLUMNS),
                params![player_id],
                row_to_queue_item,
            )
            .optional()?;
        Ok(item)
    }

    fn transition(
        &mut self,
        player_id: i64,
        next: QueueStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let from = QueueStatus::predecessors(next)
            .iter()
            .map(|s| format!("'{}'", s.to_db_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let now = Utc::now().to_rfc3339();

        let changed = match next {
            QueueStatus::Pending => 0,
            QueueStatus::Processing => self.conn.execute(
                &format!(
                    "UPDATE queue SET status = ?1, attempts = attempts + 1, last_attempt_at = ?2
                     WHERE player_id = ?3 AND status IN ({})",
                    from
                ),
                params![next.to_db_string(), now, player_id],
            )?,
            QueueStatus::Completed => self.conn.execute(
                &format!(
                    "UPDATE queue SET status = ?1, last_error = NULL
                     WHERE player_id = ?2 AND status IN ({})",
                    from
                ),
                params![next.to_db_string(), player_id],
            )?,
            QueueStatus::Failed => self.conn.execute(
                &format!(
                    "UPDATE queue SET status = ?1, last_error = ?2
                     WHERE player_id = ?3 AND status IN ({})",
                    from
                ),
                params![next.to_db_string(), error, player_id],
            )?,
        };

        if changed == 0 {
            return Err(self.rejected_transition(player_id, next));
        }
        Ok(())
    }

    fn reset_to_pending(&mut self, from: QueueStatus) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE queue SET status = ?1 WHERE status = ?2",
            params![QueueStatus::Pending.to_db_string(), from.to_db_string()],
        )?;
        Ok(changed)
    }

    fn clear_queue(&mut self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM queue", [])?)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<QueueStatus, u64>> {
        let mut counts: HashMap<QueueStatus, u64> =
            QueueStatus::all().into_iter().map(|s| (s, 0)).collect();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            match QueueStatus::from_db_string(&status) {
                Some(status) => {
                    counts.insert(status, count);
                }
                None => {
                    return Err(StorageError::CorruptRow(format!(
                        "unknown queue status '{}'",
                        status
                    )))
                }
            }
        }
        Ok(counts)
    }

    fn count_by_depth(&self) -> StorageResult<Vec<(u32, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT depth, COUNT(*) FROM queue GROUP BY depth ORDER BY depth")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn recent_failures(&self, limit: usize) -> StorageResult<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM queue WHERE status = ?1
             ORDER BY last_attempt_at DESC, id DESC LIMIT ?2",
            QUEUE_COLUMNS
        ))?;
        let items = stmt
            .query_map(
                params![QueueStatus::Failed.to_db_string(), limit as i64],
                row_to_queue_item,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

impl EntityStore for SqliteStorage {
    fn upsert_player(
        &mut self,
        player_id: i64,
        name: &str,
        fields: &[(String, String)],
    ) -> StorageResult<()> {
        let profile = fields
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n");
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO players (id, name, profile, placeholder, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE players.name END,
                profile = excluded.profile,
                placeholder = 0,
                updated_at = excluded.updated_at",
            params![player_id, name, profile, now],
        )?;
        Ok(())
    }

    fn upsert_placeholder(&mut self, player_id: i64, name: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO players (id, name, placeholder, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = CASE
                    WHEN players.placeholder = 1 AND excluded.name <> '' THEN excluded.name
                    ELSE players.name
                END",
            params![player_id, name, now],
        )?;
        Ok(())
    }

    fn ensure_season(&mut self, code: &str, label: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO seasons (code, label) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET label = excluded.label",
            params![code, label],
        )?;
        Ok(())
    }

    fn upsert_tournament(&mut self, tournament: &TournamentRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO tournaments (id, name, date, season_code) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                date = excluded.date,
                season_code = COALESCE(excluded.season_code, tournaments.season_code)",
            params![
                tournament.id,
                tournament.name,
                tournament.date.format("%Y-%m-%d").to_string(),
                tournament.season_code
            ],
        )?;
        Ok(())
    }

    fn match_exists(&self, match_key: &str) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM matches WHERE match_key = ?1 LIMIT 1",
                params![match_key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_match(&mut self, m: &NewMatch) -> StorageResult<InsertOutcome> {
        let tx = self.conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM matches WHERE match_key = ?1 LIMIT 1",
                params![m.match_key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }

        tx.execute(
            "INSERT INTO matches (
                tournament_id, season_code, round, match_kind, competition_kind,
                side_a_player, side_a_partner, side_b_player, side_b_partner,
                score, walkover, winner_side, winner_certain, points,
                recorded_for, match_key, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                m.tournament_id,
                m.season_code,
                m.round,
                m.match_kind.as_str(),
                m.competition_kind.as_str(),
                m.side_a[0],
                m.side_a[1],
                m.side_b[0],
                m.side_b[1],
                m.score,
                m.walkover,
                m.winner_side.to_db_string(),
                m.winner_certain,
                m.points,
                m.recorded_for,
                m.match_key,
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(InsertOutcome::Inserted(id))
    }

    fn log_validation(&mut self, entry: &ValidationLogEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO validation_log
                (run_id, player_id, tournament_id, round, level, category, detail, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.run_id,
                entry.player_id,
                entry.tournament_id,
                entry.round,
                entry.level.to_db_string(),
                entry.category,
                entry.detail,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

impl MatchArchive for SqliteStorage {
    fn players_with_matches(&self) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT pid FROM (
                SELECT side_a_player AS pid FROM matches
                UNION SELECT side_a_partner FROM matches
                UNION SELECT side_b_player FROM matches
                UNION SELECT side_b_partner FROM matches
             ) WHERE pid IS NOT NULL ORDER BY pid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn tournaments_for_player(&self, player_id: i64) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT tournament_id FROM matches
             WHERE ?1 IN (side_a_player, side_a_partner, side_b_player, side_b_partner)
             ORDER BY tournament_id",
        )?;
        let ids = stmt
            .query_map(params![player_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn matches_for_player(
        &self,
        player_id: i64,
        tournament_id: Option<i64>,
    ) -> StorageResult<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM matches
             WHERE ?1 IN (side_a_player, side_a_partner, side_b_player, side_b_partner)
               AND (?2 IS NULL OR tournament_id = ?2)
             ORDER BY tournament_id, id",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map(params![player_id, tournament_id], row_to_match)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    fn all_matches(&self) -> StorageResult<Vec<MatchRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM matches ORDER BY id", MATCH_COLUMNS))?;
        let matches = stmt
            .query_map([], row_to_match)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    fn delete_matches(&mut self, ids: &[i64]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute("DELETE FROM matches WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn count_matches(&self) -> StorageResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_players(&self) -> StorageResult<(u64, u64)> {
        let counts = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(placeholder), 0) FROM players",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }

    fn validation_summary(
        &self,
        run_id: Option<i64>,
    ) -> StorageResult<Vec<(String, String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT level, category, COUNT(*) FROM validation_log
             WHERE ?1 IS NULL OR run_id = ?1
             GROUP BY level, category
             ORDER BY COUNT(*) DESC, level, category",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::fixtures::singles_win;
    use crate::storage::LogLevel;
    use chrono::NaiveDate;

    fn create_test_storage() -> SqliteStorage {
        SqliteStorage::new_in_memory().unwrap()
    }

    /// Stores the tournament and players a fixture match refers to
    fn seed_entities(storage: &mut SqliteStorage) {
        storage.upsert_placeholder(5, "Alpha").unwrap();
        storage.upsert_placeholder(9, "Beta").unwrap();
        storage
            .upsert_tournament(&TournamentRecord {
                id: 100,
                name: "Spring Open".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 5, 12).unwrap(),
                season_code: None,
            })
            .unwrap();
    }

    #[test]
    fn test_create_run() {
        let mut storage = create_test_storage();
        let run_id = storage.create_run("abc").unwrap();
        assert!(run_id > 0);

        storage.finish_run(run_id, RunStatus::Completed, 12).unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.players_processed, 12);
        assert!(run.finished_at.is_some());

        assert!(matches!(
            storage.get_run(999),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut storage = create_test_storage();
        assert_eq!(
            storage.enqueue_item(42, 0, 1, Some(7), false).unwrap(),
            EnqueueOutcome::Inserted
        );
        assert_eq!(
            storage.enqueue_item(42, 5, 0, None, false).unwrap(),
            EnqueueOutcome::Unchanged
        );

        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts[&QueueStatus::Pending], 1);

        let item = storage.get_queue_item(42).unwrap().unwrap();
        assert_eq!(item.priority, 0);
        assert_eq!(item.depth, 1);
        assert_eq!(item.origin_id, Some(7));
    }

    #[test]
    fn test_force_reset_returns_item_to_pending() {
        let mut storage = create_test_storage();
        storage.enqueue_item(42, 0, 2, Some(7), false).unwrap();
        storage.transition(42, QueueStatus::Processing, None).unwrap();
        storage
            .transition(42, QueueStatus::Completed, None)
            .unwrap();

        assert_eq!(
            storage.enqueue_item(42, 10, 0, None, true).unwrap(),
            EnqueueOutcome::Reset
        );

        let item = storage.get_queue_item(42).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, 10);
        assert_eq!(item.depth, 0);
        assert_eq!(item.attempts, 1);
    }

    #[test]
    fn test_next_pending_order() {
        let mut storage = create_test_storage();
        storage.enqueue_item(1, 0, 0, None, false).unwrap();
        storage.enqueue_item(2, 5, 0, None, false).unwrap();
        storage.enqueue_item(3, 5, 0, None, false).unwrap();

        // highest priority first, then creation order
        assert_eq!(storage.next_pending(None).unwrap().unwrap().player_id, 2);
        storage.transition(2, QueueStatus::Processing, None).unwrap();
        assert_eq!(storage.next_pending(None).unwrap().unwrap().player_id, 3);
        storage.transition(3, QueueStatus::Processing, None).unwrap();
        assert_eq!(storage.next_pending(None).unwrap().unwrap().player_id, 1);
        storage.transition(1, QueueStatus::Processing, None).unwrap();
        assert!(storage.next_pending(None).unwrap().is_none());
    }

    #[test]
    fn test_next_pending_respects_depth_bound() {
        let mut storage = create_test_storage();
        storage.enqueue_item(1, 10, 3, None, false).unwrap();
        storage.enqueue_item(2, 0, 1, None, false).unwrap();

        assert_eq!(storage.next_pending(Some(2)).unwrap().unwrap().player_id, 2);
        assert_eq!(storage.next_pending(None).unwrap().unwrap().player_id, 1);
    }

    #[test]
    fn test_transitions() {
        let mut storage = create_test_storage();
        storage.enqueue_item(1, 0, 0, None, false).unwrap();

        storage.transition(1, QueueStatus::Processing, None).unwrap();
        let item = storage.get_queue_item(1).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Processing);
        assert_eq!(item.attempts, 1);
        assert!(item.last_attempt_at.is_some());

        storage
            .transition(1, QueueStatus::Failed, Some("HTTP 503"))
            .unwrap();
        let item = storage.get_queue_item(1).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(item.attempts, 1);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut storage = create_test_storage();
        storage.enqueue_item(1, 0, 0, None, false).unwrap();

        let err = storage
            .transition(1, QueueStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidTransition {
                from: QueueStatus::Pending,
                to: QueueStatus::Completed,
                ..
            }
        ));

        storage.transition(1, QueueStatus::Processing, None).unwrap();
        storage.transition(1, QueueStatus::Failed, None).unwrap();

        // failed items are never picked up again on their own
        assert!(storage.transition(1, QueueStatus::Processing, None).is_err());
        assert!(storage.transition(1, QueueStatus::Pending, None).is_err());
        assert!(storage.next_pending(None).unwrap().is_none());

        assert!(matches!(
            storage.transition(77, QueueStatus::Processing, None),
            Err(StorageError::QueueItemNotFound(77))
        ));
    }

    #[test]
    fn test_operator_resets() {
        let mut storage = create_test_storage();
        for id in 1..=3 {
            storage.enqueue_item(id, 0, 0, None, false).unwrap();
            storage.transition(id, QueueStatus::Processing, None).unwrap();
        }
        storage.transition(1, QueueStatus::Failed, Some("boom")).unwrap();
        storage.transition(2, QueueStatus::Failed, Some("boom")).unwrap();

        assert_eq!(storage.recent_failures(10).unwrap().len(), 2);
        assert_eq!(storage.reset_to_pending(QueueStatus::Failed).unwrap(), 2);
        assert_eq!(storage.reset_to_pending(QueueStatus::Processing).unwrap(), 1);

        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts[&QueueStatus::Pending], 3);
        assert_eq!(counts[&QueueStatus::Failed], 0);

        assert_eq!(storage.clear_queue().unwrap(), 3);
        assert!(storage.next_pending(None).unwrap().is_none());
    }

    #[test]
    fn test_count_by_depth() {
        let mut storage = create_test_storage();
        storage.enqueue_item(1, 0, 0, None, false).unwrap();
        storage.enqueue_item(2, 0, 1, Some(1), false).unwrap();
        storage.enqueue_item(3, 0, 1, Some(1), false).unwrap();

        assert_eq!(storage.count_by_depth().unwrap(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_insert_match_is_idempotent() {
        let mut storage = create_test_storage();
        seed_entities(&mut storage);

        let first = NewMatch::from_parsed(&singles_win(), None).unwrap();
        assert!(matches!(
            storage.insert_match(&first).unwrap(),
            InsertOutcome::Inserted(_)
        ));

        // the same match seen from the opponent's page
        let mut mirrored = singles_win();
        mirrored.subject_id = 9;
        mirrored.subject_side = Side::Right;
        mirrored.opponent_id = Some(5);
        mirrored.subject_won = false;
        let second = NewMatch::from_parsed(&mirrored, None).unwrap();

        assert_eq!(
            storage.insert_match(&second).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(storage.count_matches().unwrap(), 1);
        assert!(storage.match_exists(&first.match_key).unwrap());
    }

    #[test]
    fn test_read_back_match() {
        let mut storage = create_test_storage();
        seed_entities(&mut storage);
        storage
            .insert_match(&NewMatch::from_parsed(&singles_win(), None).unwrap())
            .unwrap();

        let stored = storage.matches_for_player(9, Some(100)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].side_of(9), Some(Side::Right));
        assert_eq!(stored[0].player_won(9), Some(false));
        assert_eq!(stored[0].canonical_key(), stored[0].match_key);

        assert_eq!(storage.players_with_matches().unwrap(), vec![5, 9]);
        assert_eq!(storage.tournaments_for_player(5).unwrap(), vec![100]);
        assert!(storage.matches_for_player(5, Some(101)).unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_never_downgrades_profile() {
        let mut storage = create_test_storage();
        storage.upsert_placeholder(5, "").unwrap();
        storage.upsert_placeholder(5, "Alpha").unwrap();
        assert_eq!(storage.count_players().unwrap(), (1, 1));

        storage
            .upsert_player(5, "Alpha Player", &[("Club".to_string(), "TC".to_string())])
            .unwrap();
        storage.upsert_placeholder(5, "Alpha").unwrap();
        assert_eq!(storage.count_players().unwrap(), (1, 0));

        let name: String = storage
            .connection()
            .query_row("SELECT name FROM players WHERE id = 5", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Alpha Player");
    }

    #[test]
    fn test_delete_matches() {
        let mut storage = create_test_storage();
        seed_entities(&mut storage);
        let id = match storage
            .insert_match(&NewMatch::from_parsed(&singles_win(), None).unwrap())
            .unwrap()
        {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Duplicate => panic!("first insert reported duplicate"),
        };

        assert_eq!(storage.delete_matches(&[id, id + 100]).unwrap(), 1);
        assert_eq!(storage.count_matches().unwrap(), 0);
    }

    #[test]
    fn test_validation_summary() {
        let mut storage = create_test_storage();
        let run_id = storage.create_run("abc").unwrap();
        for category in ["missing_opponent", "missing_opponent", "unknown_round"] {
            storage
                .log_validation(&ValidationLogEntry {
                    run_id,
                    player_id: 5,
                    tournament_id: Some(100),
                    round: Some("8>4".to_string()),
                    level: if category == "unknown_round" {
                        LogLevel::Warning
                    } else {
                        LogLevel::Error
                    },
                    category: category.to_string(),
                    detail: "detail".to_string(),
                })
                .unwrap();
        }

        let summary = storage.validation_summary(Some(run_id)).unwrap();
        assert_eq!(
            summary[0],
            ("error".to_string(), "missing_opponent".to_string(), 2)
        );
        assert_eq!(summary.len(), 2);
        assert!(storage.validation_summary(Some(run_id + 1)).unwrap().is_empty());
    }
}

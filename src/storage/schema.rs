//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Rally-Graph database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    players_processed INTEGER NOT NULL DEFAULT 0
);

-- Crawl frontier: one row per player, id gives creation order
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id INTEGER NOT NULL UNIQUE,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    origin_id INTEGER,
    created_at TEXT NOT NULL,
    last_attempt_at TEXT,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_pick ON queue(status, priority DESC, id);

-- Players, either fully crawled or placeholders seen as opponents/partners
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    profile TEXT,
    placeholder INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS seasons (
    code TEXT PRIMARY KEY,
    label TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tournaments (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    season_code TEXT REFERENCES seasons(code)
);

-- Matches as laid out in the markup: side A is the left side
CREATE TABLE IF NOT EXISTS matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
    season_code TEXT,
    round TEXT NOT NULL,
    match_kind TEXT NOT NULL,
    competition_kind TEXT NOT NULL,
    side_a_player INTEGER REFERENCES players(id),
    side_a_partner INTEGER REFERENCES players(id),
    side_b_player INTEGER REFERENCES players(id),
    side_b_partner INTEGER REFERENCES players(id),
    score TEXT NOT NULL,
    walkover INTEGER NOT NULL DEFAULT 0,
    winner_side TEXT NOT NULL,
    winner_certain INTEGER NOT NULL DEFAULT 1,
    points INTEGER NOT NULL DEFAULT 0,
    recorded_for INTEGER NOT NULL,
    match_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_matches_key ON matches(match_key);
CREATE INDEX IF NOT EXISTS idx_matches_tournament ON matches(tournament_id);
CREATE INDEX IF NOT EXISTS idx_matches_side_a ON matches(side_a_player);
CREATE INDEX IF NOT EXISTS idx_matches_side_b ON matches(side_b_player);

-- Rejected and warned records, for the quality report
CREATE TABLE IF NOT EXISTS validation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    player_id INTEGER NOT NULL,
    tournament_id INTEGER,
    round TEXT,
    level TEXT NOT NULL,
    category TEXT NOT NULL,
    detail TEXT NOT NULL,
    logged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_validation_log_run ON validation_log(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

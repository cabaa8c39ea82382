//! Integrity auditor
//!
//! Batch checks over matches that are already stored. The auditor only reads
//! and reports; removing duplicates is a separate operator action
//! (`purge_duplicates`).

mod rules;

pub use rules::{check_player_tournament, duplicate_groups, global_duplicates};

use crate::storage::{MatchArchive, StorageResult};
use std::collections::BTreeMap;
use std::fmt;

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit rule identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    DuplicateRound,
    MissingNextRound,
    NoMatchAfterLoss,
    ScoreWinnerMismatch,
    GlobalDuplicate,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateRound => "DUPLICATE_ROUND",
            Self::MissingNextRound => "MISSING_NEXT_ROUND",
            Self::NoMatchAfterLoss => "NO_MATCH_AFTER_LOSS",
            Self::ScoreWinnerMismatch => "SCORE_WINNER_MISMATCH",
            Self::GlobalDuplicate => "GLOBAL_DUPLICATE",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub rule: Rule,
    /// None for store-wide findings
    pub player_id: Option<i64>,
    pub tournament_id: i64,
    pub detail: String,
    pub match_ids: Vec<i64>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} tournament {}", self.severity, self.rule, self.tournament_id)?;
        if let Some(player_id) = self.player_id {
            write!(f, " player {}", player_id)?;
        }
        write!(f, ": {} (matches {:?})", self.detail, self.match_ids)
    }
}

/// What to audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditScope {
    /// Every player with stored matches, plus the global duplicate scan
    All,
    Player(i64),
    PlayerTournament(i64, i64),
}

/// Audit output: findings plus what was looked at
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub issues: Vec<ValidationIssue>,
    pub players_checked: u64,
    pub tournaments_checked: u64,
    pub matches_checked: u64,
}

impl AuditReport {
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Issue counts per (severity, rule)
    pub fn counts_by_rule(&self) -> BTreeMap<(Severity, Rule), usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry((issue.severity, issue.rule)).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Integrity Audit ===\n")?;
        writeln!(f, "Checked:")?;
        writeln!(f, "  Players: {}", self.players_checked)?;
        writeln!(f, "  Player/tournament pairs: {}", self.tournaments_checked)?;
        writeln!(f, "  Matches: {}", self.matches_checked)?;
        writeln!(f)?;

        writeln!(
            f,
            "Findings: {} errors, {} warnings",
            self.error_count(),
            self.warning_count()
        )?;
        for ((severity, rule), count) in self.counts_by_rule() {
            writeln!(f, "  {} {}: {}", severity, rule, count)?;
        }

        if !self.issues.is_empty() {
            writeln!(f)?;
            for issue in &self.issues {
                writeln!(f, "  {}", issue)?;
            }
        }
        Ok(())
    }
}

/// Runs the auditor over stored matches
pub fn run_audit(archive: &impl MatchArchive, scope: AuditScope) -> StorageResult<AuditReport> {
    let mut report = AuditReport::default();

    let players = match scope {
        AuditScope::All => archive.players_with_matches()?,
        AuditScope::Player(player_id) | AuditScope::PlayerTournament(player_id, _) => {
            vec![player_id]
        }
    };

    for player_id in players {
        let tournaments = match scope {
            AuditScope::PlayerTournament(_, tournament_id) => vec![tournament_id],
            _ => archive.tournaments_for_player(player_id)?,
        };

        for tournament_id in tournaments {
            let matches = archive.matches_for_player(player_id, Some(tournament_id))?;
            report.tournaments_checked += 1;
            report
                .issues
                .extend(check_player_tournament(player_id, tournament_id, &matches));
        }
        report.players_checked += 1;
    }

    report.matches_checked = match scope {
        AuditScope::All => {
            let all = archive.all_matches()?;
            report.issues.extend(global_duplicates(&all));
            all.len() as u64
        }
        AuditScope::Player(player_id) => archive.matches_for_player(player_id, None)?.len() as u64,
        AuditScope::PlayerTournament(player_id, tournament_id) => archive
            .matches_for_player(player_id, Some(tournament_id))?
            .len() as u64,
    };

    tracing::info!(
        "Audit finished: {} errors, {} warnings over {} matches",
        report.error_count(),
        report.warning_count(),
        report.matches_checked
    );
    Ok(report)
}

/// Deletes all but the lowest id of every duplicate group
///
/// Operator-invoked only; the crawl never calls this.
pub fn purge_duplicates(archive: &mut impl MatchArchive) -> StorageResult<usize> {
    let all = archive.all_matches()?;
    let doomed: Vec<i64> = duplicate_groups(&all)
        .into_iter()
        .flat_map(|(_, _, ids)| ids.into_iter().skip(1))
        .collect();

    if doomed.is_empty() {
        return Ok(0);
    }

    let removed = archive.delete_matches(&doomed)?;
    tracing::info!("Purged {} duplicate matches", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{build_match_key, CompetitionKind, MatchKind, Side};
    use crate::storage::{EntityStore, InsertOutcome, NewMatch, SqliteStorage, TournamentRecord};
    use chrono::NaiveDate;

    const TOURNAMENT: i64 = 100;

    fn create_test_storage() -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for (id, name) in [(5, "Alpha"), (9, "Beta"), (11, "Gamma"), (12, "Delta")] {
            storage.upsert_placeholder(id, name).unwrap();
        }
        storage
            .upsert_tournament(&TournamentRecord {
                id: TOURNAMENT,
                name: "Spring Open".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 5, 12).unwrap(),
                season_code: None,
            })
            .unwrap();
        storage
    }

    /// Stores a singles match between `left` and `right`
    fn store(
        storage: &mut SqliteStorage,
        round: &str,
        left: i64,
        right: i64,
        winner: Side,
        score: &str,
    ) -> i64 {
        let new_match = NewMatch {
            tournament_id: TOURNAMENT,
            season_code: None,
            round: round.to_string(),
            match_kind: MatchKind::Singles,
            competition_kind: CompetitionKind::Individual,
            side_a: [Some(left), None],
            side_b: [Some(right), None],
            score: score.to_string(),
            walkover: false,
            winner_side: winner,
            winner_certain: true,
            points: 0,
            recorded_for: left,
            match_key: build_match_key(TOURNAMENT, round, &[left], &[right], &MatchKind::Singles),
        };
        match storage.insert_match(&new_match).unwrap() {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    fn rules(report: &AuditReport) -> Vec<Rule> {
        report.issues.iter().map(|i| i.rule).collect()
    }

    #[test]
    fn test_clean_progression() {
        let mut storage = create_test_storage();
        store(&mut storage, "8>4", 5, 9, Side::Left, "6:1, 6:1");
        store(&mut storage, "4>2", 5, 11, Side::Left, "6:2, 6:2");
        store(&mut storage, "2>1", 12, 5, Side::Left, "6:4, 6:4");

        let report = run_audit(&storage, AuditScope::PlayerTournament(5, TOURNAMENT)).unwrap();
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.matches_checked, 3);
    }

    #[test]
    fn test_match_after_loss_is_error() {
        let mut storage = create_test_storage();
        let lost = store(&mut storage, "8>4", 9, 5, Side::Left, "6:3, 6:3");
        let later = store(&mut storage, "4>2", 5, 11, Side::Left, "6:2, 6:2");

        let report = run_audit(&storage, AuditScope::PlayerTournament(5, TOURNAMENT)).unwrap();
        let errors: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, Rule::NoMatchAfterLoss);
        assert_eq!(errors[0].match_ids, vec![lost, later]);
    }

    #[test]
    fn test_missing_next_round() {
        let mut storage = create_test_storage();
        store(&mut storage, "16>8", 5, 9, Side::Left, "6:0, 6:0");

        let report = run_audit(&storage, AuditScope::Player(5)).unwrap();
        assert_eq!(rules(&report), vec![Rule::MissingNextRound]);
        assert_eq!(report.issues[0].severity, Severity::Warning);

        // nobody progresses past a final
        let mut storage = create_test_storage();
        store(&mut storage, "2>1", 5, 9, Side::Left, "6:0, 6:0");
        assert!(run_audit(&storage, AuditScope::Player(5)).unwrap().is_clean());
    }

    #[test]
    fn test_duplicate_round() {
        let mut storage = create_test_storage();
        store(&mut storage, "8>4", 9, 5, Side::Left, "6:3, 6:3");
        store(&mut storage, "8>4", 11, 5, Side::Left, "6:3, 6:3");

        let report = run_audit(&storage, AuditScope::Player(5)).unwrap();
        assert_eq!(rules(&report), vec![Rule::DuplicateRound]);
        assert_eq!(report.issues[0].match_ids.len(), 2);
    }

    #[test]
    fn test_group_rounds_skip_progression() {
        let mut storage = create_test_storage();
        store(&mut storage, "Group A", 9, 5, Side::Left, "6:3, 6:3");
        store(&mut storage, "Group A", 5, 11, Side::Left, "6:3, 6:3");
        store(&mut storage, "Group A", 5, 12, Side::Left, "6:3, 6:3");

        assert!(run_audit(&storage, AuditScope::Player(5)).unwrap().is_clean());
    }

    #[test]
    fn test_score_winner_mismatch() {
        let mut storage = create_test_storage();
        // left stored as winner but lost both sets
        store(&mut storage, "Group A", 5, 9, Side::Left, "3:6, 4:6");

        let report = run_audit(&storage, AuditScope::Player(5)).unwrap();
        assert_eq!(rules(&report), vec![Rule::ScoreWinnerMismatch]);
    }

    #[test]
    fn test_uncertain_winner_skips_score_check() {
        let mut storage = create_test_storage();
        let id = store(&mut storage, "Group A", 5, 9, Side::Left, "3:6, 4:6");
        storage
            .connection()
            .execute("UPDATE matches SET winner_certain = 0 WHERE id = ?1", [id])
            .unwrap();

        assert!(run_audit(&storage, AuditScope::Player(5)).unwrap().is_clean());
    }

    fn plant_duplicate(storage: &mut SqliteStorage) -> (i64, i64) {
        let first = store(storage, "32>16", 5, 9, Side::Left, "6:3, 6:4");
        // an older row written under a different key scheme
        storage
            .connection()
            .execute("UPDATE matches SET match_key = 'legacy' WHERE id = ?1", [first])
            .unwrap();
        let second = store(storage, "32>16", 9, 5, Side::Right, "3:6, 4:6");
        (first, second)
    }

    #[test]
    fn test_global_duplicate_scan() {
        let mut storage = create_test_storage();
        let (first, second) = plant_duplicate(&mut storage);

        let report = run_audit(&storage, AuditScope::All).unwrap();
        let global: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.rule == Rule::GlobalDuplicate)
            .collect();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].severity, Severity::Error);
        assert_eq!(global[0].match_ids, vec![first, second]);
        assert_eq!(report.matches_checked, 2);
    }

    #[test]
    fn test_purge_keeps_lowest_id() {
        let mut storage = create_test_storage();
        let (first, _) = plant_duplicate(&mut storage);
        store(&mut storage, "16>8", 5, 11, Side::Left, "6:0, 6:0");

        assert_eq!(purge_duplicates(&mut storage).unwrap(), 1);
        assert_eq!(storage.count_matches().unwrap(), 2);

        let remaining: Vec<i64> = storage.all_matches().unwrap().iter().map(|m| m.id).collect();
        assert!(remaining.contains(&first));
        assert_eq!(purge_duplicates(&mut storage).unwrap(), 0);
    }

    #[test]
    fn test_report_rendering() {
        let mut storage = create_test_storage();
        store(&mut storage, "8>4", 9, 5, Side::Left, "6:3, 6:3");
        store(&mut storage, "4>2", 5, 11, Side::Left, "6:2, 6:2");

        let report = run_audit(&storage, AuditScope::All).unwrap();
        let text = report.to_string();
        assert!(text.contains("=== Integrity Audit ==="));
        assert!(text.contains("ERROR NO_MATCH_AFTER_LOSS: 1"));
    }
}

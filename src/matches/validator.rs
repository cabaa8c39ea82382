//! Per-record checks run before a match is persisted
//!
//! Errors reject the record. Warnings are kept for the quality report and
//! the record is stored anyway.

use super::rounds::is_known_round;
use super::score::{is_walkover, parse_sets};
use super::{MatchKind, ParsedMatch};
use chrono::Datelike;
use std::fmt;

/// Earliest plausible tournament year
pub const MIN_YEAR: i32 = 1990;

/// Points above this are accepted with a warning
pub const MAX_PLAUSIBLE_POINTS: i32 = 1000;

/// One finding, tagged with a stable category for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub category: &'static str,
    pub detail: String,
}

impl Finding {
    fn new(category: &'static str, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.detail)
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationResult {
    /// Accepted for persistence regardless of warnings
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, category: &'static str, detail: impl Into<String>) {
        self.errors.push(Finding::new(category, detail));
    }

    fn warn(&mut self, category: &'static str, detail: impl Into<String>) {
        self.warnings.push(Finding::new(category, detail));
    }
}

/// Validates a record against today's calendar year
pub fn validate(record: &ParsedMatch) -> ValidationResult {
    validate_for_year(record, chrono::Local::now().year())
}

/// Validates a record; `current_year` bounds the plausible date range
pub fn validate_for_year(record: &ParsedMatch, current_year: i32) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_tournament(record, current_year, &mut result);
    check_participants(record, &mut result);
    check_kinds(record, &mut result);
    check_round(record, &mut result);
    check_score(record, &mut result);
    check_points(record, &mut result);

    result
}

fn check_tournament(record: &ParsedMatch, current_year: i32, result: &mut ValidationResult) {
    if record.tournament_id.is_none() {
        result.error(
            "missing_tournament",
            format!("no tournament id for '{}'", record.tournament_name),
        );
    }

    let year = record.tournament_date.year();
    if year < MIN_YEAR || year > current_year + 1 {
        result.warn(
            "date_out_of_range",
            format!("tournament date {} looks wrong", record.tournament_date),
        );
    }
}

fn check_participants(record: &ParsedMatch, result: &mut ValidationResult) {
    if record.opponent_id.is_none() && !record.walkover {
        result.error(
            "missing_opponent",
            format!("no opponent id for '{}'", record.opponent_name),
        );
    }

    if record.match_kind == MatchKind::Doubles {
        if record.partner_id.is_none() {
            result.warn("doubles_missing_partner", "doubles match without partner id");
        }
        if record.opponent_partner_id.is_none() {
            result.warn(
                "doubles_missing_partner",
                "doubles match without opponent partner id",
            );
        }
    }
}

fn check_kinds(record: &ParsedMatch, result: &mut ValidationResult) {
    if !record.match_kind.is_known() {
        result.error(
            "unknown_match_kind",
            format!("match kind '{}'", record.match_kind),
        );
    }
    if !record.competition_kind.is_known() {
        result.error(
            "unknown_competition_kind",
            format!("competition kind '{}'", record.competition_kind),
        );
    }
}

fn check_round(record: &ParsedMatch, result: &mut ValidationResult) {
    let round = record.round.trim();
    if round.is_empty() {
        result.error("empty_round", "round label is empty");
    } else if !is_known_round(round) {
        result.warn("unknown_round", format!("round label '{}'", round));
    }
}

/// Score shape and set grammar
///
/// The walkover cross-check only fires for records built outside the
/// extractor: extracted records take their flag from this same score text,
/// since the site marks walkovers nowhere else.
fn check_score(record: &ParsedMatch, result: &mut ValidationResult) {
    let score = record.score.trim();
    if score.is_empty() {
        result.error("empty_score", "score is empty");
        return;
    }

    let walkover = is_walkover(score);
    if walkover != record.walkover {
        result.warn(
            "walkover_mismatch",
            format!(
                "score '{}' reads as walkover={} but record says {}",
                score, walkover, record.walkover
            ),
        );
    }

    // walkover scores carry partial or no set data
    if walkover {
        return;
    }

    for set in parse_sets(score) {
        match set {
            Ok(set) if set.is_unusual() => {
                result.warn(
                    "unusual_set",
                    format!("set {}:{} in '{}'", set.left, set.right, score),
                );
            }
            Ok(_) => {}
            Err(e) => result.error("malformed_set", format!("{} in '{}'", e, score)),
        }
    }
}

fn check_points(record: &ParsedMatch, result: &mut ValidationResult) {
    if record.points < 0 {
        result.error("negative_points", format!("points {}", record.points));
    } else if record.points > MAX_PLAUSIBLE_POINTS {
        result.warn("points_too_large", format!("points {}", record.points));
    }
}

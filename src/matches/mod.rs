//! Match records and the rules that interpret them
//!
//! - `score`: set-by-set score parsing, walkover detection, winner decision
//! - `rounds`: round-label vocabulary and knockout ordering
//! - `validator`: per-record checks run before a match is persisted
//!
//! Everything here is expressed relative to a *subject* player: the player
//! whose page the record was extracted from.

pub mod rounds;
pub mod score;
pub mod validator;

pub use rounds::KnockoutRound;
pub use score::{interpret, ScoreOutcome, SetScore, Verdict};
pub use validator::{validate, Finding, ValidationResult};

use chrono::NaiveDate;
use std::fmt;

/// Position of a side in the source markup
///
/// The left side is where the site places its nominal winner, regardless of
/// which side the subject player is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn to_db_string(self) -> &'static str {
        match self {
            Side::Left => "a",
            Side::Right => "b",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Side> {
        match s {
            "a" => Some(Side::Left),
            "b" => Some(Side::Right),
            _ => None,
        }
    }
}

/// One person listed on a side of a match row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Site identifier; None when the markup names someone without a link
    pub id: Option<i64>,
    pub name: String,
}

/// One side of a match row as it appears in the markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSide {
    pub side: Side,
    pub participants: Vec<Participant>,
}

impl MatchSide {
    /// Whether the given player is listed on this side
    pub fn contains(&self, player_id: i64) -> bool {
        self.participants.iter().any(|p| p.id == Some(player_id))
    }

    /// First participant on this side that is not `player_id`
    pub fn other_than(&self, player_id: i64) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != Some(player_id))
    }
}

/// Singles or doubles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Singles,
    Doubles,
    /// Section label that classified as neither; rejected at validation
    Unrecognized(String),
}

impl MatchKind {
    pub fn as_str(&self) -> &str {
        match self {
            MatchKind::Singles => "singles",
            MatchKind::Doubles => "doubles",
            MatchKind::Unrecognized(label) => label,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MatchKind::Unrecognized(_))
    }

    pub fn from_db_string(s: &str) -> MatchKind {
        match s {
            "singles" => MatchKind::Singles,
            "doubles" => MatchKind::Doubles,
            other => MatchKind::Unrecognized(other.to_string()),
        }
    }
}

/// Individual competition or a team fixture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompetitionKind {
    Individual,
    Team,
    Unrecognized(String),
}

impl CompetitionKind {
    pub fn as_str(&self) -> &str {
        match self {
            CompetitionKind::Individual => "individual",
            CompetitionKind::Team => "team",
            CompetitionKind::Unrecognized(label) => label,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CompetitionKind::Unrecognized(_))
    }

    pub fn from_db_string(s: &str) -> CompetitionKind {
        match s {
            "individual" => CompetitionKind::Individual,
            "team" => CompetitionKind::Team,
            other => CompetitionKind::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CompetitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted match, relative to the subject player
///
/// Lives for a single crawl cycle: extracted, validated, then either
/// persisted or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMatch {
    pub subject_id: i64,
    /// Which markup side the subject was found on
    pub subject_side: Side,

    pub tournament_id: Option<i64>,
    pub tournament_name: String,
    pub tournament_date: NaiveDate,

    pub match_kind: MatchKind,
    pub competition_kind: CompetitionKind,
    pub round: String,

    pub opponent_id: Option<i64>,
    pub opponent_name: String,
    pub partner_id: Option<i64>,
    pub partner_name: Option<String>,
    pub opponent_partner_id: Option<i64>,
    pub opponent_partner_name: Option<String>,

    pub score: String,
    pub walkover: bool,
    pub subject_won: bool,
    /// False when the winner is a positional default rather than derived from sets
    pub winner_certain: bool,
    pub points: i32,
}

impl ParsedMatch {
    /// Side of the markup that won (or is presumed to have won)
    pub fn winner_side(&self) -> Side {
        if self.subject_won {
            self.subject_side
        } else {
            self.subject_side.opposite()
        }
    }

    /// Participant ids on the subject's side, subject first
    pub fn subject_team(&self) -> Vec<i64> {
        std::iter::once(self.subject_id)
            .chain(self.partner_id)
            .collect()
    }

    /// Participant ids on the opposing side
    pub fn opponent_team(&self) -> Vec<i64> {
        self.opponent_id
            .into_iter()
            .chain(self.opponent_partner_id)
            .collect()
    }

    /// Every other player referenced by this record
    pub fn discovered_players(&self) -> Vec<(i64, String)> {
        let mut found = Vec::new();
        if let Some(id) = self.opponent_id {
            found.push((id, self.opponent_name.clone()));
        }
        if let Some(id) = self.partner_id {
            found.push((id, self.partner_name.clone().unwrap_or_default()));
        }
        if let Some(id) = self.opponent_partner_id {
            found.push((id, self.opponent_partner_name.clone().unwrap_or_default()));
        }
        found
    }

    /// Orientation-free duplicate key:
    /// `tournament|round|min(side)|max(side)|kind`, each side being its sorted
    /// participant ids joined by `+`
    pub fn match_key(&self) -> String {
        build_match_key(
            self.tournament_id.unwrap_or_default(),
            &self.round,
            &self.subject_team(),
            &self.opponent_team(),
            &self.match_kind,
        )
    }
}

/// Builds the canonical duplicate key for a match
pub fn build_match_key(
    tournament_id: i64,
    round: &str,
    side_a: &[i64],
    side_b: &[i64],
    kind: &MatchKind,
) -> String {
    let side_key = |ids: &[i64]| {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("+")
    };

    let (a, b) = (side_key(side_a), side_key(side_b));
    let (low, high) = if a <= b { (a, b) } else { (b, a) };

    format!(
        "{}|{}|{}|{}|{}",
        tournament_id,
        round.trim(),
        low,
        high,
        kind.as_str()
    )
}

//! Score interpretation
//!
//! Scores are written from the markup's point of view: the first number of
//! every set belongs to the left side. Tiebreak details in parentheses are
//! accepted and ignored when comparing games.

use super::Side;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Case-insensitive substrings meaning the match ended without full play
pub const WALKOVER_MARKERS: &[&str] = &[
    "w.o", "walkover", "scr", "skr", "ret", "kont", "def", "n.p",
];

/// Sets longer than this many games are plausible but unusual
pub const UNUSUAL_GAME_COUNT: u32 = 7;

fn set_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2})\s*:\s*(\d{1,2})\s*(\(\s*\d{1,2}(?:\s*:\s*\d{1,2})?\s*\))?$")
            .expect("set pattern is a valid regex")
    })
}

/// One set, games as written left:right
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetScore {
    pub left: u32,
    pub right: u32,
    pub has_tiebreak: bool,
}

impl SetScore {
    /// Side with strictly more games; None for a tied set
    pub fn winner(&self) -> Option<Side> {
        use std::cmp::Ordering;
        match self.left.cmp(&self.right) {
            Ordering::Greater => Some(Side::Left),
            Ordering::Less => Some(Side::Right),
            Ordering::Equal => None,
        }
    }

    /// Tied, or longer than a normal set
    pub fn is_unusual(&self) -> bool {
        self.left == self.right || self.left.max(self.right) > UNUSUAL_GAME_COUNT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetParseError {
    #[error("empty set")]
    Empty,

    #[error("malformed set '{0}'")]
    Malformed(String),
}

/// Who won, and whether that was read from the games or assumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Strict set majority
    Decided(Side),
    /// Positional default: walkover, no sets, or a level set count
    Presumed(Side),
}

impl Verdict {
    pub fn winner(&self) -> Side {
        match self {
            Verdict::Decided(side) | Verdict::Presumed(side) => *side,
        }
    }

    pub fn is_certain(&self) -> bool {
        matches!(self, Verdict::Decided(_))
    }
}

/// Everything the interpreter could read from a raw score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Well-formed sets only, in order
    pub sets: Vec<SetScore>,
    pub walkover: bool,
    pub verdict: Verdict,
    pub subject_won: bool,
}

impl ScoreOutcome {
    pub fn winner_certain(&self) -> bool {
        self.verdict.is_certain()
    }
}

/// Detects walkover, retirement and default markers
pub fn is_walkover(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    WALKOVER_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Parses one `games:games` set with an optional parenthesized tiebreak
pub fn parse_set(raw: &str) -> Result<SetScore, SetParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SetParseError::Empty);
    }

    let caps = set_pattern()
        .captures(trimmed)
        .ok_or_else(|| SetParseError::Malformed(trimmed.to_string()))?;

    let games = |idx: usize| {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(|| SetParseError::Malformed(trimmed.to_string()))
    };

    Ok(SetScore {
        left: games(1)?,
        right: games(2)?,
        has_tiebreak: caps.get(3).is_some(),
    })
}

/// Splits a score on commas and parses every piece
///
/// An empty score yields no sets at all.
pub fn parse_sets(raw: &str) -> Vec<Result<SetScore, SetParseError>> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(parse_set).collect()
}

/// Decides the winner side from set counts
///
/// Tied sets count for neither side. Without a strict majority the left side
/// is presumed.
pub fn decide(sets: &[SetScore]) -> Verdict {
    let (left, right) = sets
        .iter()
        .filter_map(SetScore::winner)
        .fold((0u32, 0u32), |(l, r), side| match side {
            Side::Left => (l + 1, r),
            Side::Right => (l, r + 1),
        });

    if left > right {
        Verdict::Decided(Side::Left)
    } else if right > left {
        Verdict::Decided(Side::Right)
    } else {
        Verdict::Presumed(Side::Left)
    }
}

/// Interprets a raw score for a subject sitting on `subject_side`
pub fn interpret(raw: &str, subject_side: Side) -> ScoreOutcome {
    let walkover = is_walkover(raw);

    let sets: Vec<SetScore> = if walkover {
        Vec::new()
    } else {
        parse_sets(raw).into_iter().filter_map(Result::ok).collect()
    };

    let verdict = if walkover {
        Verdict::Presumed(Side::Left)
    } else {
        decide(&sets)
    };

    ScoreOutcome {
        subject_won: verdict.winner() == subject_side,
        sets,
        walkover,
        verdict,
    }
}

//! Round labels
//!
//! Knockout rounds are written `N>M`: N players enter, M advance, M = N/2.
//! `2>1` is the final. A smaller N is a later stage.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Whole-word tokens that name a round on their own
const ROUND_WORDS: &[&str] = &[
    "q", "kv", "r", "f", "sf", "qf", "sk", "rr", "ko", "final", "finale", "semi", "round",
];

/// Substrings that mark a round label anywhere in the text
const ROUND_FRAGMENTS: &[&str] = &[
    "final", "finále", "semi", "qualif", "kvalif", "group", "skupin", "útěch", "utech",
    "consol", "round", "kolo",
];

fn knockout_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,4})\s*>\s*(\d{1,4})\s*$").expect("knockout pattern is a valid regex")
    })
}

/// A single-elimination stage with a well-defined successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnockoutRound {
    /// Players entering the round
    pub entrants: u32,
}

impl KnockoutRound {
    /// Parses `N>M`; only halving brackets with N >= 2 qualify
    pub fn parse(label: &str) -> Option<KnockoutRound> {
        let caps = knockout_pattern().captures(label)?;
        let entrants: u32 = caps.get(1)?.as_str().parse().ok()?;
        let advancing: u32 = caps.get(2)?.as_str().parse().ok()?;

        if entrants < 2 || advancing == 0 || advancing * 2 != entrants {
            return None;
        }
        Some(KnockoutRound { entrants })
    }

    /// Ordering key: smaller means later in the tournament
    pub fn order(&self) -> u32 {
        self.entrants
    }

    pub fn is_final(&self) -> bool {
        self.entrants == 2
    }

    /// The round a winner of this one plays next; None after the final
    pub fn next(&self) -> Option<KnockoutRound> {
        if self.is_final() {
            None
        } else {
            Some(KnockoutRound {
                entrants: self.entrants / 2,
            })
        }
    }

    /// Whether `self` is a strictly later stage than `other`
    pub fn is_after(&self, other: &KnockoutRound) -> bool {
        self.stage_cmp(other) == Ordering::Greater
    }

    /// Compares by tournament stage, later stages greater
    pub fn stage_cmp(&self, other: &KnockoutRound) -> Ordering {
        other.entrants.cmp(&self.entrants)
    }

    pub fn label(&self) -> String {
        format!("{}>{}", self.entrants, self.entrants / 2)
    }
}

impl fmt::Display for KnockoutRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{}", self.entrants, self.entrants / 2)
    }
}

/// Loose check of a round label against the known vocabulary
///
/// Unknown labels are not rejected; new formats appear over time.
pub fn is_known_round(label: &str) -> bool {
    if knockout_pattern().is_match(label) {
        return true;
    }

    let lowered = label.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }

    if ROUND_FRAGMENTS.iter().any(|frag| lowered.contains(frag)) {
        return true;
    }

    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let stem = word.trim_end_matches(|c: char| c.is_ascii_digit());
            ROUND_WORDS.contains(&word) || (!stem.is_empty() && ROUND_WORDS.contains(&stem))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_knockout() {
        assert_eq!(KnockoutRound::parse("32>16"), Some(KnockoutRound { entrants: 32 }));
        assert_eq!(KnockoutRound::parse(" 8 > 4 "), Some(KnockoutRound { entrants: 8 }));
        assert_eq!(KnockoutRound::parse("2>1"), Some(KnockoutRound { entrants: 2 }));

        assert!(KnockoutRound::parse("8>3").is_none());
        assert!(KnockoutRound::parse("1>0").is_none());
        assert!(KnockoutRound::parse("semi").is_none());
    }

    #[test]
    fn test_ordering() {
        let r8 = KnockoutRound::parse("8>4").unwrap();
        let r4 = KnockoutRound::parse("4>2").unwrap();

        assert!(r4.is_after(&r8));
        assert!(!r8.is_after(&r4));
        assert!(!r8.is_after(&r8));
        assert!(r4.order() < r8.order());
    }

    #[test]
    fn test_next_round() {
        let r16 = KnockoutRound::parse("16>8").unwrap();
        assert_eq!(r16.next().map(|r| r.label()), Some("8>4".to_string()));

        let fin = KnockoutRound::parse("2>1").unwrap();
        assert!(fin.is_final());
        assert!(fin.next().is_none());
    }

    #[test]
    fn test_round_vocabulary() {
        for label in ["64>32", "Q1", "kv2", "Final", "finále", "Semifinal", "Group A", "skupina B", "RR", "útěcha", "R3"] {
            assert!(is_known_round(label), "{} should be known", label);
        }
        for label in ["", "xyz", "Pavilion 3"] {
            assert!(!is_known_round(label), "{} should be unknown", label);
        }
    }
}

//! Consistency rules over one player's stored matches in one tournament
//!
//! Progression rules only look at knockout rounds (`N>M`); group and
//! round-robin labels get the duplicate and score checks only.

use crate::audit::{Rule, Severity, ValidationIssue};
use crate::matches::score::{decide, parse_sets};
use crate::matches::{KnockoutRound, Verdict};
use crate::storage::MatchRecord;
use std::collections::BTreeMap;

/// Runs every per-player rule over matches from a single tournament
pub fn check_player_tournament(
    player_id: i64,
    tournament_id: i64,
    matches: &[MatchRecord],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // singles and doubles draws progress independently
    let mut by_kind: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for m in matches {
        by_kind.entry(m.match_kind.as_str()).or_default().push(m);
    }

    for draw in by_kind.into_values() {
        let rounds = knockout_rounds(&draw);
        issues.extend(duplicate_rounds(player_id, tournament_id, &rounds));
        issues.extend(missing_next_round(player_id, tournament_id, &rounds));
        issues.extend(match_after_loss(player_id, tournament_id, &rounds));
    }

    for m in matches {
        if let Some(issue) = score_winner_mismatch(player_id, m) {
            issues.push(issue);
        }
    }

    issues
}

type RoundIndex<'a> = BTreeMap<u32, (KnockoutRound, Vec<&'a MatchRecord>)>;

fn knockout_rounds<'a>(draw: &[&'a MatchRecord]) -> RoundIndex<'a> {
    let mut rounds = RoundIndex::new();
    for m in draw {
        if let Some(round) = KnockoutRound::parse(&m.round) {
            rounds
                .entry(round.order())
                .or_insert_with(|| (round, Vec::new()))
                .1
                .push(*m);
        }
    }
    rounds
}

fn duplicate_rounds(
    player_id: i64,
    tournament_id: i64,
    rounds: &RoundIndex<'_>,
) -> Vec<ValidationIssue> {
    rounds
        .values()
        .filter(|(_, matches)| matches.len() > 1)
        .map(|(round, matches)| ValidationIssue {
            severity: Severity::Warning,
            rule: Rule::DuplicateRound,
            player_id: Some(player_id),
            tournament_id,
            detail: format!("{} matches stored for round {}", matches.len(), round),
            match_ids: matches.iter().map(|m| m.id).collect(),
        })
        .collect()
}

fn missing_next_round(
    player_id: i64,
    tournament_id: i64,
    rounds: &RoundIndex<'_>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (round, matches) in rounds.values() {
        let Some(next) = round.next() else {
            continue;
        };
        let won: Vec<i64> = matches
            .iter()
            .filter(|m| m.player_won(player_id) == Some(true))
            .map(|m| m.id)
            .collect();
        if won.is_empty() || rounds.contains_key(&next.order()) {
            continue;
        }

        issues.push(ValidationIssue {
            severity: Severity::Warning,
            rule: Rule::MissingNextRound,
            player_id: Some(player_id),
            tournament_id,
            detail: format!("won round {} but no match stored for round {}", round, next),
            match_ids: won,
        });
    }

    issues
}

fn match_after_loss(
    player_id: i64,
    tournament_id: i64,
    rounds: &RoundIndex<'_>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (lost_round, matches) in rounds.values() {
        let Some(loss) = matches
            .iter()
            .find(|m| m.player_won(player_id) == Some(false))
        else {
            continue;
        };

        let later: Vec<(&KnockoutRound, &MatchRecord)> = rounds
            .values()
            .filter(|(round, _)| round.is_after(lost_round))
            .flat_map(|(round, ms)| ms.iter().map(move |m| (round, *m)))
            .collect();
        if later.is_empty() {
            continue;
        }

        let labels: Vec<String> = later.iter().map(|(round, _)| round.label()).collect();
        let mut match_ids = vec![loss.id];
        match_ids.extend(later.iter().map(|(_, m)| m.id));

        issues.push(ValidationIssue {
            severity: Severity::Error,
            rule: Rule::NoMatchAfterLoss,
            player_id: Some(player_id),
            tournament_id,
            detail: format!(
                "lost round {} but has matches in later round(s) {}",
                lost_round,
                labels.join(", ")
            ),
            match_ids,
        });
    }

    issues
}

/// Recomputes the winner from the stored score; uncertain rows are skipped
fn score_winner_mismatch(player_id: i64, m: &MatchRecord) -> Option<ValidationIssue> {
    if !m.winner_certain || m.walkover {
        return None;
    }

    let sets = parse_sets(&m.score)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if sets.is_empty() {
        return None;
    }

    let detail = match decide(&sets) {
        Verdict::Decided(side) if side == m.winner_side => return None,
        Verdict::Decided(side) => format!(
            "score '{}' gives side {} but side {} is stored as winner",
            m.score,
            side.to_db_string(),
            m.winner_side.to_db_string()
        ),
        Verdict::Presumed(_) => format!(
            "score '{}' has no set majority but the winner is stored as certain",
            m.score
        ),
    };

    Some(ValidationIssue {
        severity: Severity::Warning,
        rule: Rule::ScoreWinnerMismatch,
        player_id: Some(player_id),
        tournament_id: m.tournament_id,
        detail,
        match_ids: vec![m.id],
    })
}

/// Groups matches sharing a canonical duplicate key; ids ascending
pub fn duplicate_groups(matches: &[MatchRecord]) -> Vec<(i64, String, Vec<i64>)> {
    let mut groups: BTreeMap<String, (i64, Vec<i64>)> = BTreeMap::new();
    for m in matches {
        groups
            .entry(m.canonical_key())
            .or_insert_with(|| (m.tournament_id, Vec::new()))
            .1
            .push(m.id);
    }

    groups
        .into_iter()
        .filter(|(_, (_, ids))| ids.len() > 1)
        .map(|(key, (tournament_id, mut ids))| {
            ids.sort_unstable();
            (tournament_id, key, ids)
        })
        .collect()
}

/// Store-wide duplicate scan, independent of any player's view
pub fn global_duplicates(matches: &[MatchRecord]) -> Vec<ValidationIssue> {
    duplicate_groups(matches)
        .into_iter()
        .map(|(tournament_id, key, ids)| ValidationIssue {
            severity: Severity::Error,
            rule: Rule::GlobalDuplicate,
            player_id: None,
            tournament_id,
            detail: format!("{} rows share key {}", ids.len(), key),
            match_ids: ids,
        })
        .collect()
}

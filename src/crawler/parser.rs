//! HTML extraction for profile and season pages
//!
//! Profile pages give a player's name, a table of profile fields and the
//! list of seasons on offer. Season pages are a flat run of section labels
//! (`h2.section`) and tournament blocks (`div.tournament`); each block holds a
//! `table.matches` whose rows name the two sides by linked participants.
//!
//! Extraction is best-effort: a bad date falls back to today, a row without
//! the subject is skipped and an empty block is dropped. Nothing here fails
//! the page as a whole.

use crate::matches::score::interpret;
use crate::matches::{CompetitionKind, MatchKind, MatchSide, ParsedMatch, Participant, Side};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

const DOUBLES_TOKENS: &[&str] = &["doubles", "čtyřhra", "ctyrhra"];
const SINGLES_TOKENS: &[&str] = &["singles", "dvouhra"];
const TEAM_TOKENS: &[&str] = &["team", "družstva", "druzstva"];

/// A season offered on a profile page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRef {
    pub code: String,
    pub label: String,
}

/// Basic profile data for one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub player_id: i64,
    pub name: String,
    pub fields: Vec<(String, String)>,
    pub seasons: Vec<SeasonRef>,
}

/// Tournament header data shared by all rows of one block
#[derive(Debug, Clone)]
struct TournamentHeader {
    id: Option<i64>,
    name: String,
    date: NaiveDate,
}

fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Whitespace-collapsed text content of an element
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trailing numeric path segment of a link, e.g. `/player/1234` -> 1234
pub fn id_from_href(href: &str) -> Option<i64> {
    let path = href.split(&['?', '#'][..]).next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    if last.is_empty() || !last.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    last.parse().ok()
}

/// Parses `DD.MM.YYYY` or `YYYY-MM-DD`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    NaiveDate::parse_from_str(&compact, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(&compact, "%Y-%m-%d"))
        .ok()
}

/// Classifies a section label into match and competition kinds
///
/// Labels without a team token (`team`, `družstva`) count as individual.
pub fn classify_section(label: &str) -> (MatchKind, CompetitionKind) {
    let lowered = label.to_lowercase();
    let has_any = |tokens: &[&str]| tokens.iter().any(|t| lowered.contains(t));

    let match_kind = if has_any(DOUBLES_TOKENS) {
        MatchKind::Doubles
    } else if has_any(SINGLES_TOKENS) {
        MatchKind::Singles
    } else {
        MatchKind::Unrecognized(label.trim().to_string())
    };

    let competition_kind = if has_any(TEAM_TOKENS) {
        CompetitionKind::Team
    } else {
        CompetitionKind::Individual
    };

    (match_kind, competition_kind)
}

/// Parses a profile page
///
/// A page without a season selector still yields a profile with no seasons.
pub fn parse_profile(html: &str, player_id: i64) -> PlayerProfile {
    let document = Html::parse_document(html);

    let name = sel("h1.player-name")
        .and_then(|s| document.select(&s).next().map(text_of))
        .unwrap_or_default();

    let mut fields = Vec::new();
    if let (Some(row_sel), Some(th_sel), Some(td_sel)) =
        (sel("table.player-info tr"), sel("th"), sel("td"))
    {
        for row in document.select(&row_sel) {
            let key = row.select(&th_sel).next().map(text_of);
            let value = row.select(&td_sel).next().map(text_of);
            if let (Some(key), Some(value)) = (key, value) {
                if !key.is_empty() {
                    fields.push((key.trim_end_matches(':').to_string(), value));
                }
            }
        }
    }

    let mut seasons = Vec::new();
    if let Some(option_sel) = sel("select[name=season] option[value]") {
        for option in document.select(&option_sel) {
            let Some(code) = option.value().attr("value").map(str::trim) else {
                continue;
            };
            if code.is_empty() {
                continue;
            }
            let label = text_of(option);
            seasons.push(SeasonRef {
                code: code.to_string(),
                label: if label.is_empty() {
                    code.to_string()
                } else {
                    label
                },
            });
        }
    }

    if name.is_empty() {
        tracing::warn!("Profile page for player {} has no name", player_id);
    }

    PlayerProfile {
        player_id,
        name,
        fields,
        seasons,
    }
}

/// Extracts all matches for `subject_id` from a season page
pub fn extract_matches(html: &str, subject_id: i64) -> Vec<ParsedMatch> {
    extract_matches_on(html, subject_id, chrono::Local::now().date_naive())
}

/// Same as `extract_matches`, with `today` used for unparseable dates
pub fn extract_matches_on(html: &str, subject_id: i64, today: NaiveDate) -> Vec<ParsedMatch> {
    let document = Html::parse_document(html);
    let Some(flow_sel) = sel("h2.section, div.tournament") else {
        return Vec::new();
    };

    let mut kinds = (
        MatchKind::Unrecognized("unlabelled".to_string()),
        CompetitionKind::Individual,
    );
    let mut matches = Vec::new();

    for element in document.select(&flow_sel) {
        if element.value().name() == "h2" {
            kinds = classify_section(&text_of(element));
            continue;
        }

        let Some(header) = parse_tournament_header(element, today) else {
            tracing::debug!("Tournament block without header, skipping");
            continue;
        };

        let found = extract_block(element, &header, &kinds, subject_id);
        if found.is_empty() {
            tracing::debug!(
                "No rows for player {} in tournament '{}', skipping block",
                subject_id,
                header.name
            );
        }
        matches.extend(found);
    }

    matches
}

fn parse_tournament_header(block: ElementRef<'_>, today: NaiveDate) -> Option<TournamentHeader> {
    let header = block.select(&sel("div.tournament-header")?).next()?;

    let (id, name) = match header.select(&sel("a[href]")?).next() {
        Some(link) => (
            link.value().attr("href").and_then(id_from_href),
            text_of(link),
        ),
        None => (None, text_of(header)),
    };

    let raw_date = header
        .select(&sel("span.date")?)
        .next()
        .map(text_of)
        .unwrap_or_default();
    let date = parse_date(&raw_date).unwrap_or_else(|| {
        tracing::warn!(
            "Unparseable date '{}' for tournament '{}', using {}",
            raw_date,
            name,
            today
        );
        today
    });

    Some(TournamentHeader { id, name, date })
}

fn extract_block(
    block: ElementRef<'_>,
    header: &TournamentHeader,
    kinds: &(MatchKind, CompetitionKind),
    subject_id: i64,
) -> Vec<ParsedMatch> {
    let (Some(row_sel), Some(round_sel), Some(left_sel), Some(right_sel), Some(score_sel), Some(points_sel)) = (
        sel("table.matches tr"),
        sel("td.round"),
        sel("td.side-left"),
        sel("td.side-right"),
        sel("td.score"),
        sel("td.points"),
    ) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for row in block.select(&row_sel) {
        // header rows carry no round cell
        let Some(round) = row.select(&round_sel).next().map(text_of) else {
            continue;
        };

        let left = MatchSide {
            side: Side::Left,
            participants: row
                .select(&left_sel)
                .next()
                .map(parse_participants)
                .unwrap_or_default(),
        };
        let right = MatchSide {
            side: Side::Right,
            participants: row
                .select(&right_sel)
                .next()
                .map(parse_participants)
                .unwrap_or_default(),
        };

        let score = row.select(&score_sel).next().map(text_of).unwrap_or_default();
        let points = row
            .select(&points_sel)
            .next()
            .map(text_of)
            .map(|raw| parse_points(&raw))
            .unwrap_or(0);

        match build_match(header, kinds, subject_id, &left, &right, round, score, points) {
            Some(parsed) => found.push(parsed),
            None => tracing::debug!(
                "Row in tournament '{}' does not list player {}, skipping",
                header.name,
                subject_id
            ),
        }
    }
    found
}

/// Linked participants of a side cell; bare text counts as unlinked names
fn parse_participants(cell: ElementRef<'_>) -> Vec<Participant> {
    let Some(link_sel) = sel("a[href]") else {
        return Vec::new();
    };

    let linked: Vec<Participant> = cell
        .select(&link_sel)
        .map(|link| Participant {
            id: link.value().attr("href").and_then(id_from_href),
            name: text_of(link),
        })
        .collect();
    if !linked.is_empty() {
        return linked;
    }

    text_of(cell)
        .split('/')
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "-")
        .map(|name| Participant {
            id: None,
            name: name.to_string(),
        })
        .collect()
}

fn parse_points(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return 0;
    }
    trimmed.replace('−', "-").parse().unwrap_or_else(|_| {
        tracing::debug!("Unparseable points '{}', using 0", trimmed);
        0
    })
}

/// Assigns roles relative to the subject; None if the subject is absent
#[allow(clippy::too_many_arguments)]
fn build_match(
    header: &TournamentHeader,
    kinds: &(MatchKind, CompetitionKind),
    subject_id: i64,
    left: &MatchSide,
    right: &MatchSide,
    round: String,
    score: String,
    points: i32,
) -> Option<ParsedMatch> {
    let (own, other) = if left.contains(subject_id) {
        (left, right)
    } else if right.contains(subject_id) {
        (right, left)
    } else {
        return None;
    };

    let partner = own.other_than(subject_id);
    let opponent = other.participants.first();
    let opponent_partner = other.participants.get(1);

    let outcome = interpret(&score, own.side);

    Some(ParsedMatch {
        subject_id,
        subject_side: own.side,
        tournament_id: header.id,
        tournament_name: header.name.clone(),
        tournament_date: header.date,
        match_kind: kinds.0.clone(),
        competition_kind: kinds.1.clone(),
        round,
        opponent_id: opponent.and_then(|p| p.id),
        opponent_name: opponent.map(|p| p.name.clone()).unwrap_or_default(),
        partner_id: partner.and_then(|p| p.id),
        partner_name: partner.map(|p| p.name.clone()),
        opponent_partner_id: opponent_partner.and_then(|p| p.id),
        opponent_partner_name: opponent_partner.map(|p| p.name.clone()),
        walkover: outcome.walkover,
        subject_won: outcome.subject_won,
        winner_certain: outcome.winner_certain(),
        score,
        points,
    })
}

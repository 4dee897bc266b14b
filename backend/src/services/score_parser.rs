//! Parses the free-text score strings tennis results are scraped as, e.g.
//! `"6-4 7-6(5)"`, `"6-3 4-6 10-8"` (match tiebreak), `"6-2 ret."`, `"w/o"`.

use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcomeStatus {
    Completed,
    Retired,
    Walkover,
    Default,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetScore {
    pub games_a: i32,
    pub games_b: i32,
    pub tiebreak_a: Option<i32>,
    pub tiebreak_b: Option<i32>,
    pub is_tiebreak: bool,
    pub is_super_tiebreak: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedScore {
    pub sets: Vec<SetScore>,
    pub winner: Option<Side>,
    pub status: MatchOutcomeStatus,
    pub retirement_set: Option<usize>,
    pub raw_score: String,
}

impl ParsedScore {
    pub fn to_display_string(&self) -> String {
        let mut parts: Vec<String> = self
            .sets
            .iter()
            .map(|s| match (s.tiebreak_a, s.tiebreak_b) {
                (Some(tb), _) if s.games_a > s.games_b => format!("{}-{}({})", s.games_a, s.games_b, tb),
                (_, Some(tb)) => format!("{}-{}({})", s.games_a, s.games_b, tb),
                _ => format!("{}-{}", s.games_a, s.games_b),
            })
            .collect();

        if self.status == MatchOutcomeStatus::Retired {
            parts.push("ret.".to_string());
        }

        parts.join(" ")
    }

    pub fn to_structured(&self) -> serde_json::Value {
        let sets: Vec<serde_json::Value> = self
            .sets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut obj = serde_json::json!({ "a": s.games_a, "b": s.games_b });
                if let Some(tb) = s.tiebreak_a {
                    obj["tb_a"] = serde_json::json!(tb);
                }
                if let Some(tb) = s.tiebreak_b {
                    obj["tb_b"] = serde_json::json!(tb);
                }
                if self.retirement_set == Some(i + 1) {
                    obj["retired"] = serde_json::json!(true);
                }
                obj
            })
            .collect();
        serde_json::Value::Array(sets)
    }
}

static RETIREMENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s*ret\.?\s*$").unwrap(),
        Regex::new(r"(?i)\s*retired\.?\s*$").unwrap(),
        Regex::new(r"(?i)\s*r\.?\s*$").unwrap(),
        Regex::new(r"(?i)\s*\(ret\)\.?\s*$").unwrap(),
    ]
});

static SET_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-(\d+)(?:\((\d+)(?:-(\d+))?\))?$").unwrap()
});

static BRACKET_SET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+-\d+)\]").unwrap());

const WALKOVER_TOKENS: &[&str] = &["w/o", "wo", "walkover", "w.o.", "w.o"];
const DEFAULT_TOKENS: &[&str] = &["def", "default", "def."];

pub fn parse_score(raw: &str) -> Result<ParsedScore> {
    let raw_score = raw.trim().to_string();
    let lowered = raw_score.to_lowercase();

    if WALKOVER_TOKENS.contains(&lowered.as_str()) {
        return Ok(ParsedScore {
            sets: vec![],
            winner: Some(Side::A),
            status: MatchOutcomeStatus::Walkover,
            retirement_set: None,
            raw_score,
        });
    }

    if DEFAULT_TOKENS.contains(&lowered.as_str()) {
        return Ok(ParsedScore {
            sets: vec![],
            winner: Some(Side::A),
            status: MatchOutcomeStatus::Default,
            retirement_set: None,
            raw_score,
        });
    }

    let (body, retired) = extract_retirement(&raw_score);
    let set_strings = split_sets(&body);

    if set_strings.is_empty() {
        return Err(AppError::ParseError(format!(
            "could not extract any sets from score {raw_score:?}"
        )));
    }

    let sets = set_strings
        .iter()
        .map(|s| parse_set(s))
        .collect::<Result<Vec<_>>>()?;

    let status = if retired {
        MatchOutcomeStatus::Retired
    } else {
        MatchOutcomeStatus::Completed
    };

    let (winner, retirement_set) = determine_winner(&sets, retired);

    Ok(ParsedScore {
        sets,
        winner: Some(winner),
        status,
        retirement_set,
        raw_score,
    })
}

fn extract_retirement(s: &str) -> (String, bool) {
    for pattern in RETIREMENT_PATTERNS.iter() {
        if pattern.is_match(s) {
            return (pattern.replace(s, "").trim().to_string(), true);
        }
    }
    (s.to_string(), false)
}

fn split_sets(body: &str) -> Vec<String> {
    let with_brackets_stripped = BRACKET_SET.replace_all(body, "$1");
    with_brackets_stripped
        .split_whitespace()
        .filter(|token| SET_TOKEN.is_match(token))
        .map(|s| s.to_string())
        .collect()
}

fn parse_set(token: &str) -> Result<SetScore> {
    let caps = SET_TOKEN
        .captures(token)
        .ok_or_else(|| AppError::ParseError(format!("malformed set score {token:?}")))?;

    let games_a: i32 = caps[1].parse().unwrap();
    let games_b: i32 = caps[2].parse().unwrap();

    let (tiebreak_a, tiebreak_b, is_tiebreak) = match (caps.get(3), caps.get(4)) {
        (Some(loser_tb), Some(winner_tb)) => {
            let loser: i32 = loser_tb.as_str().parse().unwrap();
            let winner: i32 = winner_tb.as_str().parse().unwrap();
            if games_a > games_b {
                (Some(winner), Some(loser), true)
            } else {
                (Some(loser), Some(winner), true)
            }
        }
        (Some(loser_tb), None) => {
            let loser: i32 = loser_tb.as_str().parse().unwrap();
            let winner = loser.max(5) + 2;
            if games_a > games_b {
                (Some(winner), Some(loser), true)
            } else {
                (Some(loser), Some(winner), true)
            }
        }
        _ => (None, None, false),
    };

    let is_super_tiebreak = !is_tiebreak && (games_a >= 10 || games_b >= 10);

    Ok(SetScore {
        games_a,
        games_b,
        tiebreak_a,
        tiebreak_b,
        is_tiebreak,
        is_super_tiebreak,
    })
}

/// Counts sets won by each side to determine the match winner. Best-of-3 needs
/// 2 sets, best-of-5 needs 3; with a retirement and tied set counts, the
/// leader of games in the final (incomplete) set is awarded the win, falling
/// back to side A if that too is tied. `retirement_set` is the 1-indexed set
/// *number* the match ended in, not an array position.
fn determine_winner(sets: &[SetScore], retired: bool) -> (Side, Option<usize>) {
    let a_sets = sets.iter().filter(|s| s.games_a > s.games_b).count();
    let b_sets = sets.iter().filter(|s| s.games_b > s.games_a).count();

    if a_sets != b_sets {
        let winner = if a_sets > b_sets { Side::A } else { Side::B };
        let retirement_set = if retired { Some(sets.len()) } else { None };
        return (winner, retirement_set);
    }

    let last = sets.last();
    let winner = match last {
        Some(set) if set.games_a > set.games_b => Side::A,
        Some(set) if set.games_b > set.games_a => Side::B,
        _ => Side::A,
    };

    (winner, if retired { Some(sets.len()) } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_straight_sets() {
        let parsed = parse_score("6-4 6-3").unwrap();
        assert_eq!(parsed.sets.len(), 2);
        assert_eq!(parsed.status, MatchOutcomeStatus::Completed);
        assert_eq!(parsed.winner, Some(Side::A));
    }

    #[test]
    fn parses_tiebreak_with_only_loser_score() {
        let parsed = parse_score("7-6(5)").unwrap();
        let set = &parsed.sets[0];
        assert!(set.is_tiebreak);
        assert_eq!(set.tiebreak_a, Some(7));
        assert_eq!(set.tiebreak_b, Some(5));
    }

    #[test]
    fn parses_tiebreak_with_both_scores() {
        let parsed = parse_score("7-6(7-5)").unwrap();
        let set = &parsed.sets[0];
        assert_eq!(set.tiebreak_a, Some(7));
        assert_eq!(set.tiebreak_b, Some(5));
    }

    #[test]
    fn parses_match_tiebreak_as_super_tiebreak() {
        let parsed = parse_score("6-3 4-6 10-8").unwrap();
        let last = parsed.sets.last().unwrap();
        assert!(last.is_super_tiebreak);
    }

    #[test]
    fn parses_retirement() {
        let parsed = parse_score("6-2 3-1 ret.").unwrap();
        assert_eq!(parsed.status, MatchOutcomeStatus::Retired);
        assert_eq!(parsed.winner, Some(Side::A));
        assert_eq!(parsed.retirement_set, Some(2), "retirement_set is a 1-indexed set number");
    }

    #[test]
    fn retirement_set_is_the_set_number_not_an_array_index() {
        let parsed = parse_score("6-4 2-1 RET").unwrap();
        assert_eq!(parsed.sets.len(), 2);
        assert_eq!(parsed.retirement_set, Some(2));

        let structured = parsed.to_structured();
        assert_eq!(structured[1]["retired"], serde_json::json!(true));
        assert!(structured[0].get("retired").is_none());
    }

    #[test]
    fn parses_walkover() {
        let parsed = parse_score("w/o").unwrap();
        assert_eq!(parsed.status, MatchOutcomeStatus::Walkover);
        assert!(parsed.sets.is_empty());
    }

    #[test]
    fn strips_bracketed_match_tiebreak() {
        let parsed = parse_score("6-4 3-6 [10-8]").unwrap();
        assert_eq!(parsed.sets.len(), 3);
        assert!(parsed.sets[2].is_super_tiebreak);
    }
}

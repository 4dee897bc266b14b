//! The rating update formula itself: expected score, the margin-of-victory
//! multiplier, inactivity decay, and the new/returning player K-boost. These
//! are pure functions so the engine (which does the I/O) and the tests (which
//! check the numbers) can each stay simple.

use crate::services::elo::params::{EloParams, TournamentLevel};
use crate::services::score_parser::{SetScore, Side};

/// Logistic expected score for the side rated `rating_for`, given the
/// opponent's rating and the level's spread factor.
pub fn expected_score(rating_for: f64, rating_against: f64, s_factor: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_against - rating_for) / s_factor))
}

/// Inverse of [`expected_score`]: the rating a player would need, against an
/// opponent rated `rating_against`, to have exactly `probability` of winning.
/// Exported for callers that want to reason about ratings from a target win
/// probability; the pipeline itself never calls this.
pub fn rating_for_probability(probability: f64, rating_against: f64, s_factor: f64) -> f64 {
    let p = probability.clamp(1e-6, 1.0 - 1e-6);
    rating_against + s_factor * (p / (1.0 - p)).log10()
}

pub fn win_probability(rating_a: f64, rating_b: f64, s_factor: f64) -> f64 {
    expected_score(rating_a, rating_b, s_factor)
}

/// Ratio of games won in excess of games lost, by the match winner, as a
/// fraction of total games played. A straight-sets bagel scores close to 1.0;
/// a deciding-set squeaker scores close to 0.0.
pub fn dominance_ratio(sets: &[SetScore], winner: Side) -> f64 {
    let (winner_games, loser_games): (i32, i32) = sets.iter().fold((0, 0), |(w, l), s| match winner {
        Side::A => (w + s.games_a, l + s.games_b),
        Side::B => (w + s.games_b, l + s.games_a),
    });

    let total = winner_games + loser_games;
    if total == 0 {
        return 0.0;
    }

    (winner_games - loser_games) as f64 / total as f64
}

/// Scales the raw rating delta by how dominant the win was, clamped so a
/// single match can never swing a rating by less than half or more than
/// double the base K-factor's worth. `margin_base` and `margin_scale` are
/// per-parameter-set tuning knobs: `multiplier = margin_base + ratio * margin_scale`.
pub fn margin_multiplier(ratio: f64, margin_base: f64, margin_scale: f64) -> f64 {
    (margin_base + ratio * margin_scale).clamp(0.5, 2.0)
}

/// No-op if the player has no prior match or hasn't yet crossed
/// `decay_start_days` of inactivity; otherwise pulls the rating toward
/// `baseline` at `decay_rate` per day past that point, capped at fully
/// reaching the baseline.
pub fn apply_decay(
    rating: f64,
    days_since_last: Option<f64>,
    decay_rate: f64,
    decay_start_days: f64,
    baseline: f64,
) -> f64 {
    let Some(days) = days_since_last else {
        return rating;
    };
    if days < decay_start_days {
        return rating;
    }

    let fraction = (decay_rate * (days - decay_start_days)).min(1.0);
    rating + (baseline - rating) * fraction
}

/// Multiplicative K-factor boost for players with a short track record or a
/// long layoff, so their ratings converge faster once real results are in.
pub fn k_boost(
    match_count: i32,
    days_since_last: Option<f64>,
    new_threshold: i32,
    new_boost: f64,
    returning_days: f64,
    returning_boost: f64,
) -> f64 {
    let new_factor = if match_count < new_threshold { new_boost } else { 1.0 };
    let returning_factor = match days_since_last {
        Some(days) if days >= returning_days => returning_boost,
        _ => 1.0,
    };
    new_factor * returning_factor
}

pub struct MatchResult<'a> {
    pub rating_a: f64,
    pub rating_b: f64,
    pub winner: Side,
    pub sets: &'a [SetScore],
    pub level: TournamentLevel,
    pub matches_played_a: i32,
    pub matches_played_b: i32,
    pub days_since_last_a: Option<f64>,
    pub days_since_last_b: Option<f64>,
}

/// The per-match rating delta applied to both players (zero-sum before the
/// margin multiplier, and still zero-sum after it since both sides share the
/// same multiplier and K-boosts are applied to each side's own delta only
/// through its own K-factor).
pub fn calculate(params: &EloParams, m: &MatchResult) -> (f64, f64) {
    let s = params.s_factor(m.level);
    let k = params.k_factor(m.level);

    let expected_a = expected_score(m.rating_a, m.rating_b, s);
    let (actual_a, actual_b) = match m.winner {
        Side::A => (1.0, 0.0),
        Side::B => (0.0, 1.0),
    };

    let ratio = dominance_ratio(m.sets, m.winner);
    let multiplier = margin_multiplier(ratio, params.margin_base, params.margin_scale);

    let boost_a = k_boost(
        m.matches_played_a,
        m.days_since_last_a,
        params.new_player_match_threshold,
        params.new_player_boost,
        params.returning_player_days,
        params.returning_player_boost,
    );
    let boost_b = k_boost(
        m.matches_played_b,
        m.days_since_last_b,
        params.new_player_match_threshold,
        params.new_player_boost,
        params.returning_player_days,
        params.returning_player_boost,
    );

    let delta_a = k * boost_a * multiplier * (actual_a - expected_a);
    let delta_b = k * boost_b * multiplier * (actual_b - (1.0 - expected_a));

    (delta_a, delta_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_give_fifty_percent_expectation() {
        let p = expected_score(1500.0, 1500.0, 1670.0);
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn margin_multiplier_is_clamped() {
        assert_eq!(margin_multiplier(5.0, 1.0, 1.0), 2.0);
        assert_eq!(margin_multiplier(-5.0, 1.0, 1.0), 0.5);
    }

    #[test]
    fn margin_multiplier_honors_base_and_scale() {
        assert_eq!(margin_multiplier(0.5, 0.8, 0.4), 1.0);
    }

    #[test]
    fn decay_is_noop_before_threshold() {
        let rating = apply_decay(1600.0, Some(90.0), 0.01, 180.0, 1500.0);
        assert_eq!(rating, 1600.0);
    }

    #[test]
    fn decay_pulls_toward_baseline() {
        let rating = apply_decay(1600.0, Some(280.0), 0.01, 180.0, 1500.0);
        assert!(rating < 1600.0 && rating > 1500.0);
    }

    #[test]
    fn decay_fully_resets_after_long_enough_gap() {
        let rating = apply_decay(1600.0, Some(300.0), 0.01, 180.0, 1500.0);
        assert_eq!(rating, 1500.0);
    }

    #[test]
    fn new_player_boost_applies_below_threshold() {
        let boost = k_boost(2, None, 10, 1.25, 365.0, 1.15);
        assert_eq!(boost, 1.25);
    }

    #[test]
    fn boosts_combine_multiplicatively() {
        let boost = k_boost(2, Some(400.0), 10, 1.25, 365.0, 1.15);
        assert!((boost - 1.25 * 1.15).abs() < 1e-9);
    }

    #[test]
    fn rating_change_is_zero_sum_without_margin() {
        let params = EloParams::default();
        let sets = vec![SetScore {
            games_a: 6,
            games_b: 4,
            tiebreak_a: None,
            tiebreak_b: None,
            is_tiebreak: false,
            is_super_tiebreak: false,
        }];
        let m = MatchResult {
            rating_a: 1500.0,
            rating_b: 1500.0,
            winner: Side::A,
            sets: &sets,
            level: TournamentLevel::Tour,
            matches_played_a: 50,
            matches_played_b: 50,
            days_since_last_a: None,
            days_since_last_b: None,
        };
        let (delta_a, delta_b) = calculate(&params, &m);
        assert!((delta_a + delta_b).abs() < 1e-9);
    }
}

//! Housekeeping over the player identity graph: surfaces likely duplicate
//! players for merge, splits a player row whose matches actually belong to
//! two different people (most commonly a mixed-gender collision from two
//! sources sharing a surname), and proposes re-adding an alias a past merge
//! might have discarded.

use crate::db::DbPool;
use crate::error::Result;
use crate::models::player::Player;
use crate::services::identity::PlayerIdentityService;
use crate::services::names::{compare_names, extract_last_name};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

pub const DUPLICATE_REPORT_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DuplicateCandidate {
    pub player_a_id: Uuid,
    pub player_a_name: String,
    pub player_b_id: Uuid,
    pub player_b_name: String,
    pub confidence: f64,
}

/// Finds pairs of players likely to be the same person, grouped by last
/// name to keep the comparison count down (`O(players-per-surname^2)`
/// rather than `O(players^2)`) and never pairing two players whose men's/
/// women's tour involvement is mutually exclusive — cross-gender duplicates
/// are a genuine phenomenon (shared surname, different person) this pass
/// must not merge away; see [`find_mixed_gender_players`] for the opposite
/// failure mode, where the *same* person was wrongly split by gender.
#[instrument(skip(pool))]
pub async fn find_duplicate_candidates(pool: &DbPool) -> Result<Vec<DuplicateCandidate>> {
    let players: Vec<(Uuid, String, String)> = sqlx::query_as(
        "SELECT id, canonical_name, normalized_name FROM players",
    )
    .fetch_all(pool)
    .await?;

    let genders = player_genders(pool).await?;

    let mut by_last_name: HashMap<String, Vec<(Uuid, String, String)>> = HashMap::new();
    for row in players {
        let last = extract_last_name(&row.2);
        by_last_name.entry(last).or_default().push(row);
    }

    let mut candidates = Vec::new();
    for group in by_last_name.values() {
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                let (id_a, name_a, norm_a) = &group[i];
                let (id_b, name_b, norm_b) = &group[j];

                if cross_tour_exclusive(&genders, *id_a, *id_b) {
                    continue;
                }

                let confidence = compare_names(norm_a, norm_b);
                if confidence >= DUPLICATE_REPORT_THRESHOLD {
                    candidates.push(DuplicateCandidate {
                        player_a_id: *id_a,
                        player_a_name: name_a.clone(),
                        player_b_id: *id_b,
                        player_b_name: name_b.clone(),
                        confidence,
                    });
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    Ok(candidates)
}

/// Merges every duplicate candidate at or above `auto_merge_threshold`,
/// always keeping the player with more matches played (ties broken by
/// whichever id sorts first, for determinism) as the survivor. Processes
/// candidates highest-confidence-first and skips any pair where one side
/// has already been merged away earlier in the same run, so a transitive
/// chain (A~B~C all the same player) collapses onto a single survivor
/// instead of erroring on a stale id.
#[instrument(skip(pool, identity))]
pub async fn auto_merge_duplicates(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    auto_merge_threshold: f64,
) -> Result<usize> {
    let candidates = find_duplicate_candidates(pool).await?;
    let mut merged_away: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
    let mut redirect: HashMap<Uuid, Uuid> = HashMap::new();
    let mut merge_count = 0;

    for candidate in candidates.into_iter().filter(|c| c.confidence >= auto_merge_threshold) {
        let a = *redirect.get(&candidate.player_a_id).unwrap_or(&candidate.player_a_id);
        let b = *redirect.get(&candidate.player_b_id).unwrap_or(&candidate.player_b_id);
        if a == b || merged_away.contains(&a) || merged_away.contains(&b) {
            continue;
        }

        let matches_a = match_count(pool, a).await?;
        let matches_b = match_count(pool, b).await?;
        let (keep, drop) = if matches_a >= matches_b { (a, b) } else { (b, a) };

        identity.merge_players(keep, drop).await?;
        merged_away.insert(drop);
        redirect.insert(drop, keep);
        merge_count += 1;
    }

    Ok(merge_count)
}

/// Scans `player_merge_log` for an entry whose merged-away name no longer
/// appears as an alias on its surviving player (e.g. the merge itself was a
/// mistake later reversed by hand, or an alias was pruned separately) and
/// re-adds it. Gated on the last name still matching and the comparison
/// score clearing the suggestion threshold, so a long-stale log entry from
/// a player who has since been split away again doesn't reattach a name
/// that no longer belongs.
#[instrument(skip(pool))]
pub async fn recover_missing_merge_aliases(pool: &DbPool, suggestion_threshold: f64) -> Result<usize> {
    let log_entries: Vec<(Uuid, String, String)> = sqlx::query_as(
        "SELECT keep_player_id, merged_canonical_name, merged_normalized_name FROM player_merge_log",
    )
    .fetch_all(pool)
    .await?;

    let mut recovered = 0;
    for (keep_id, merged_canonical_name, merged_normalized_name) in log_entries {
        let already_alias: Option<(Uuid,)> = sqlx::query_as(
            "SELECT player_id FROM player_aliases WHERE player_id = $1 AND alias = $2",
        )
        .bind(keep_id)
        .bind(&merged_normalized_name)
        .fetch_optional(pool)
        .await?;
        if already_alias.is_some() {
            continue;
        }

        let Some(current) = Player::find_by_id(pool, keep_id).await? else { continue };
        if extract_last_name(&current.normalized_name) != extract_last_name(&merged_normalized_name) {
            continue;
        }
        if compare_names(&current.normalized_name, &merged_normalized_name) < suggestion_threshold {
            continue;
        }

        sqlx::query(
            "INSERT INTO player_aliases (player_id, alias, source) VALUES ($1, $2, 'merge_recovery')
             ON CONFLICT (player_id, alias, source) DO NOTHING",
        )
        .bind(keep_id)
        .bind(&merged_normalized_name)
        .execute(pool)
        .await?;
        tracing::info!(player_id = %keep_id, name = %merged_canonical_name, "recovered merge-away alias");
        recovered += 1;
    }

    Ok(recovered)
}

/// Players whose matches span both tours' gender pools — a signal that two
/// distinct people were merged under one identity (most often: a men's and
/// women's player who share a name and were never disambiguated by source).
/// Each returned player is a candidate for [`PlayerIdentityService::split_player`],
/// with `minority_match_ids` naming the matches to move onto a new identity
/// (whichever gender the player has fewer matches on).
#[derive(Debug, Clone)]
pub struct MixedGenderPlayer {
    pub player_id: Uuid,
    pub canonical_name: String,
    pub minority_match_ids: Vec<Uuid>,
}

#[instrument(skip(pool))]
pub async fn find_mixed_gender_players(pool: &DbPool) -> Result<Vec<MixedGenderPlayer>> {
    let rows: Vec<(Uuid, String, String, i64)> = sqlx::query_as(
        "SELECT p.id, p.canonical_name, m.tour, count(*) FROM players p
         JOIN matches m ON m.player_a_id = p.id OR m.player_b_id = p.id
         GROUP BY p.id, p.canonical_name, m.tour",
    )
    .fetch_all(pool)
    .await?;

    let mut by_player: HashMap<Uuid, (String, Vec<(String, i64)>)> = HashMap::new();
    for (id, name, tour, count) in rows {
        by_player.entry(id).or_insert_with(|| (name, Vec::new())).1.push((tour, count));
    }

    let womens_tours = ["wta", "wta125", "itf_women"];
    let mut out = Vec::new();

    for (player_id, (canonical_name, tour_counts)) in by_player {
        let womens_total: i64 = tour_counts.iter().filter(|(t, _)| womens_tours.contains(&t.as_str())).map(|(_, c)| c).sum();
        let mens_total: i64 = tour_counts.iter().filter(|(t, _)| !womens_tours.contains(&t.as_str())).map(|(_, c)| c).sum();

        if womens_total == 0 || mens_total == 0 {
            continue;
        }

        let minority_is_womens = womens_total <= mens_total;
        let minority_tours: Vec<&str> = if minority_is_womens {
            womens_tours.to_vec()
        } else {
            tour_counts.iter().map(|(t, _)| t.as_str()).filter(|t| !womens_tours.contains(t)).collect()
        };

        let minority_match_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM matches WHERE (player_a_id = $1 OR player_b_id = $1) AND tour = ANY($2)",
        )
        .bind(player_id)
        .bind(&minority_tours)
        .fetch_all(pool)
        .await?;

        out.push(MixedGenderPlayer { player_id, canonical_name, minority_match_ids });
    }

    Ok(out)
}

async fn match_count(pool: &DbPool, player_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM matches WHERE player_a_id = $1 OR player_b_id = $1",
    )
    .bind(player_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

async fn player_genders(pool: &DbPool) -> Result<HashMap<Uuid, (bool, bool)>> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT DISTINCT p.id, m.tour FROM players p
         JOIN matches m ON m.player_a_id = p.id OR m.player_b_id = p.id",
    )
    .fetch_all(pool)
    .await?;

    let womens_tours = ["wta", "wta125", "itf_women"];
    let mut out: HashMap<Uuid, (bool, bool)> = HashMap::new();
    for (id, tour) in rows {
        let entry = out.entry(id).or_insert((false, false));
        if womens_tours.contains(&tour.as_str()) {
            entry.1 = true;
        } else {
            entry.0 = true;
        }
    }
    Ok(out)
}

/// True if both players have tour history and it's mutually exclusive by
/// gender pool — i.e. pairing them as a duplicate would conflate a men's
/// and a women's player who merely share a name.
fn cross_tour_exclusive(genders: &HashMap<Uuid, (bool, bool)>, a: Uuid, b: Uuid) -> bool {
    let (Some(&(a_men, a_women)), Some(&(b_men, b_women))) = (genders.get(&a), genders.get(&b)) else {
        return false;
    };
    (a_men && !a_women && b_women && !b_men) || (a_women && !a_men && b_men && !b_women)
}

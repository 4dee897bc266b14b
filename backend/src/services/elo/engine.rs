use crate::db::DbPool;
use crate::error::Result;
use crate::models::elo_rating_history::EloRatingHistory;
use crate::models::elo_state::PlayerEloState;
use crate::models::match_row::{EloWriteback, Match, PlayerAnchor};
use crate::models::pipeline_run::PipelineCheckpoint;
use crate::services::elo::formula::{apply_decay, calculate, MatchResult};
use crate::services::elo::params::{classify_level, EloParams};
use crate::services::score_parser::parse_score;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EloRunStats {
    pub matches_processed: usize,
    pub batches_run: usize,
    pub backfills_detected: usize,
}

/// Per-player running state the engine keeps in memory for the duration of
/// one batch, so a player appearing twice in the same batch sees their own
/// prior update rather than the stale row still on disk.
#[derive(Debug, Clone)]
struct WorkingState {
    rating: f64,
    matches_played: i32,
    last_match_date: Option<NaiveDate>,
    last_temporal_order: i64,
    career_peak_rating: f64,
    career_peak_date: Option<NaiveDate>,
}

pub struct EloEngine {
    pool: DbPool,
    params: EloParams,
    params_version: String,
}

impl EloEngine {
    pub fn new(pool: DbPool, params: EloParams, params_version: impl Into<String>) -> Self {
        Self { pool, params, params_version: params_version.into() }
    }

    /// Processes newly-ingested matches in temporal order, one rating pool
    /// (men/women) at a time, checkpointing progress every
    /// `checkpoint_every_n_batches` batches. Every batch is committed to the
    /// database in exactly two bulk statements: one updating `matches` with
    /// each row's pre/post Elo snapshot, one upserting `player_elo_state`.
    ///
    /// Backfilled matches (scraped after the fact, dated earlier than a
    /// player's most recent processed match) are detected per batch: the
    /// affected player's later matches are flagged `elo_needs_recompute` and
    /// picked up by this same loop on a subsequent pass, rather than patched
    /// in place.
    #[instrument(skip(self), fields(batch_size, womens))]
    pub async fn run_incremental(
        &self,
        batch_size: usize,
        womens: bool,
        checkpoint_every_n_batches: usize,
    ) -> Result<EloRunStats> {
        let checkpoint_key = format!("elo_incremental:{}", if womens { "women" } else { "men" });
        let mut stats = EloRunStats::default();

        loop {
            let batch = Match::unprocessed_for_elo(&self.pool, womens, batch_size as i64).await?;
            if batch.is_empty() {
                break;
            }

            let player_ids: HashSet<Uuid> = batch
                .iter()
                .flat_map(|m| [m.player_a_id, m.player_b_id])
                .flatten()
                .collect();
            let player_ids: Vec<Uuid> = player_ids.into_iter().collect();

            let anchors: HashMap<Uuid, PlayerAnchor> = Match::anchor_state(&self.pool, &player_ids)
                .await?
                .into_iter()
                .map(|a| (a.player_id, a))
                .collect();

            // Seed every player's working state from their anchor, never from
            // `player_elo_state` directly: once a chain is reopened the
            // persisted row still reflects the now-invalidated replay, while
            // the anchor is rebuilt straight from matches still marked valid.
            // A player absent from `anchors` has no valid processed match at
            // all and starts from the pool baseline below.
            let mut working: HashMap<Uuid, WorkingState> = anchors
                .iter()
                .map(|(&player_id, a)| {
                    (
                        player_id,
                        WorkingState {
                            rating: a.rating,
                            matches_played: a.matches_played,
                            last_match_date: a.last_match_date,
                            last_temporal_order: a.temporal_order,
                            career_peak_rating: a.career_peak_rating,
                            career_peak_date: a.career_peak_date,
                        },
                    )
                })
                .collect();

            let baseline = self.params.start_elo(womens);
            let mut match_writebacks: Vec<EloWriteback> = Vec::new();
            let mut history_rows: Vec<(Uuid, Uuid, f64, f64, NaiveDate, bool)> = Vec::new();
            let mut backfilled_players: HashSet<Uuid> = HashSet::new();
            let mut reopened_from: HashMap<Uuid, i64> = HashMap::new();

            for m in &batch {
                let (Some(player_a), Some(player_b)) = (m.player_a_id, m.player_b_id) else {
                    continue;
                };
                let Some(match_date) = m.match_date else { continue };
                let Some(winner_id) = m.winner_id else { continue };

                // A player whose anchor (last fully-processed match) is newer
                // than this one is being backfilled: reopen everything from
                // this match forward for that player and skip it this pass.
                let a_is_backfill = anchors.get(&player_a).is_some_and(|a| a.temporal_order > m.temporal_order);
                let b_is_backfill = anchors.get(&player_b).is_some_and(|a| a.temporal_order > m.temporal_order);

                if a_is_backfill || b_is_backfill {
                    if a_is_backfill && !backfilled_players.contains(&player_a) {
                        Match::reopen_for_elo(&self.pool, &[player_a], m.temporal_order).await?;
                        backfilled_players.insert(player_a);
                        reopened_from.entry(player_a).and_modify(|o| *o = (*o).min(m.temporal_order)).or_insert(m.temporal_order);
                        stats.backfills_detected += 1;
                    }
                    if b_is_backfill && !backfilled_players.contains(&player_b) {
                        Match::reopen_for_elo(&self.pool, &[player_b], m.temporal_order).await?;
                        backfilled_players.insert(player_b);
                        reopened_from.entry(player_b).and_modify(|o| *o = (*o).min(m.temporal_order)).or_insert(m.temporal_order);
                        stats.backfills_detected += 1;
                    }
                    continue;
                }

                let level_label = Match::resolve_tournament_level(&self.pool, m.edition_id).await?;
                let level = classify_level(&level_label);

                let state_a = working.get(&player_a).cloned();
                let state_b = working.get(&player_b).cloned();

                let (rating_a, matches_a, last_a) = state_a
                    .as_ref()
                    .map(|s| (s.rating, s.matches_played, s.last_match_date))
                    .unwrap_or((baseline, 0, None));
                let (rating_b, matches_b, last_b) = state_b
                    .as_ref()
                    .map(|s| (s.rating, s.matches_played, s.last_match_date))
                    .unwrap_or((baseline, 0, None));

                let days_since_a = last_a.map(|d| (match_date - d).num_days() as f64);
                let days_since_b = last_b.map(|d| (match_date - d).num_days() as f64);

                let decayed_a = apply_decay(rating_a, days_since_a, self.params.decay_rate, self.params.decay_start_days, baseline);
                let decayed_b = apply_decay(rating_b, days_since_b, self.params.decay_rate, self.params.decay_start_days, baseline);

                let sets = m
                    .score_raw
                    .as_deref()
                    .and_then(|raw| parse_score(raw).ok())
                    .map(|p| p.sets)
                    .unwrap_or_default();

                let winner_side = if winner_id == player_a {
                    crate::services::score_parser::Side::A
                } else {
                    crate::services::score_parser::Side::B
                };

                let (delta_a, delta_b) = calculate(
                    &self.params,
                    &MatchResult {
                        rating_a: decayed_a,
                        rating_b: decayed_b,
                        winner: winner_side,
                        sets: &sets,
                        level,
                        matches_played_a: matches_a,
                        matches_played_b: matches_b,
                        days_since_last_a: days_since_a,
                        days_since_last_b: days_since_b,
                    },
                );

                let new_rating_a = decayed_a + delta_a;
                let new_rating_b = decayed_b + delta_b;

                let peak_a = state_a.as_ref().map(|s| s.career_peak_rating).unwrap_or(baseline);
                let peak_b = state_b.as_ref().map(|s| s.career_peak_rating).unwrap_or(baseline);
                let is_peak_a = new_rating_a > peak_a;
                let is_peak_b = new_rating_b > peak_b;

                working.insert(player_a, WorkingState {
                    rating: new_rating_a,
                    matches_played: matches_a + 1,
                    last_match_date: Some(match_date),
                    last_temporal_order: m.temporal_order,
                    career_peak_rating: if is_peak_a { new_rating_a } else { peak_a },
                    career_peak_date: if is_peak_a { Some(match_date) } else { state_a.as_ref().and_then(|s| s.career_peak_date) },
                });
                working.insert(player_b, WorkingState {
                    rating: new_rating_b,
                    matches_played: matches_b + 1,
                    last_match_date: Some(match_date),
                    last_temporal_order: m.temporal_order,
                    career_peak_rating: if is_peak_b { new_rating_b } else { peak_b },
                    career_peak_date: if is_peak_b { Some(match_date) } else { state_b.as_ref().and_then(|s| s.career_peak_date) },
                });

                match_writebacks.push(EloWriteback {
                    match_id: m.id,
                    elo_pre_a: decayed_a,
                    elo_pre_b: decayed_b,
                    elo_post_a: new_rating_a,
                    elo_post_b: new_rating_b,
                    params_version: self.params_version.clone(),
                });
                history_rows.push((player_a, m.id, decayed_a, new_rating_a, match_date, is_peak_a));
                history_rows.push((player_b, m.id, decayed_b, new_rating_b, match_date, is_peak_b));

                stats.matches_processed += 1;
            }

            Match::bulk_mark_elo_processed(&self.pool, &match_writebacks).await?;
            EloRatingHistory::insert_batch(&self.pool, &history_rows).await?;

            let state_rows: Vec<PlayerEloState> = working
                .into_iter()
                .map(|(player_id, s)| PlayerEloState {
                    player_id,
                    tour: PlayerEloState::pool_for_bool(womens).to_string(),
                    rating: s.rating,
                    matches_played: s.matches_played,
                    last_match_date: s.last_match_date,
                    last_temporal_order: s.last_temporal_order,
                    career_peak_rating: s.career_peak_rating,
                    career_peak_date: s.career_peak_date,
                    updated_at: chrono::Utc::now(),
                })
                .collect();
            PlayerEloState::bulk_upsert(&self.pool, &state_rows).await?;

            stats.batches_run += 1;
            if stats.batches_run % checkpoint_every_n_batches.max(1) == 0 {
                PipelineCheckpoint::save(
                    &self.pool,
                    &checkpoint_key,
                    serde_json::json!({ "matches_processed": stats.matches_processed }),
                )
                .await?;
            }
        }

        self.refresh_pending_pre_snapshots(womens).await?;

        PipelineCheckpoint::save(
            &self.pool,
            &checkpoint_key,
            serde_json::json!({ "matches_processed": stats.matches_processed }),
        )
        .await?;

        Ok(stats)
    }

    /// Writes a best-effort pre-match Elo snapshot onto every `upcoming`/
    /// `scheduled` match using each player's current `player_elo_state`
    /// rating. These snapshots are provisional: they're overwritten with the
    /// real pre/post pair once the match is actually played and processed.
    #[instrument(skip(self))]
    async fn refresh_pending_pre_snapshots(&self, womens: bool) -> Result<()> {
        let pending = Match::pending_pre_snapshot(&self.pool, womens, 5000).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let player_ids: HashSet<Uuid> = pending
            .iter()
            .flat_map(|m| [m.player_a_id, m.player_b_id])
            .flatten()
            .collect();
        let player_ids: Vec<Uuid> = player_ids.into_iter().collect();
        let states = PlayerEloState::get_many(&self.pool, &player_ids, womens).await?;
        let ratings: HashMap<Uuid, f64> = states.into_iter().map(|s| (s.player_id, s.rating)).collect();
        let baseline = self.params.start_elo(womens);

        for m in &pending {
            let (Some(a), Some(b)) = (m.player_a_id, m.player_b_id) else { continue };
            let rating_a = ratings.get(&a).copied().unwrap_or(baseline);
            let rating_b = ratings.get(&b).copied().unwrap_or(baseline);
            Match::set_pending_pre_snapshot(&self.pool, m.id, rating_a, rating_b, &self.params_version).await?;
        }
        Ok(())
    }

    /// Rebuilds one rating pool from scratch: wipes its state and history,
    /// clears every match's processed flag, then replays `run_incremental`
    /// to completion. Used after a data correction (player merge, corrected
    /// score) invalidates the incremental trail for more players than a
    /// handful of targeted reopens can cleanly express.
    #[instrument(skip(self))]
    pub async fn rebuild_full(&self, womens: bool, batch_size: usize) -> Result<EloRunStats> {
        sqlx::query(
            "DELETE FROM elo_rating_history WHERE player_id IN (
                SELECT player_id FROM player_elo_state WHERE tour = $1
             )",
        )
        .bind(PlayerEloState::pool_for_bool(womens))
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM player_elo_state WHERE tour = $1")
            .bind(PlayerEloState::pool_for_bool(womens))
            .execute(&self.pool)
            .await?;

        let tours: &[&str] = if womens {
            &["wta", "wta125", "itf_women"]
        } else {
            &["atp", "challenger", "itf_men"]
        };
        sqlx::query(
            "UPDATE matches SET elo_processed_at = NULL, elo_needs_recompute = false,
                elo_pre_a = NULL, elo_pre_b = NULL, elo_post_a = NULL, elo_post_b = NULL
             WHERE tour = ANY($1)",
        )
        .bind(tours)
        .execute(&self.pool)
        .await?;

        self.run_incremental(batch_size, womens, usize::MAX).await
    }
}

/// Placeholder so call sites can name a rating date explicitly when they
/// don't have a full [`Match`] row handy (e.g. tests constructing history
/// directly).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64
}

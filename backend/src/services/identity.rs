//! Resolves a scraped player name (plus an optional source-specific external
//! id) to a canonical [`Player`] row, falling back to a human review queue
//! when no strategy is confident enough to act alone.

use crate::db::DbPool;
use crate::error::Result;
use crate::models::player::{Player, PlayerAlias, PlayerReviewQueue, ReviewStatus};
use crate::services::names::{compare_names, extract_initials, extract_last_name, generate_search_variants, normalize_name};
use crate::services::validation::validate_name;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ExactId,
    ExactAlias,
    Fuzzy,
    Abbreviated,
    New,
}

#[derive(Debug, Clone)]
pub struct PlayerMatch {
    pub player_id: Uuid,
    pub confidence: f64,
    pub match_kind: MatchKind,
    pub matched_value: String,
}

pub struct PlayerIdentityService {
    pool: DbPool,
    pub exact_match_threshold: f64,
    pub suggestion_threshold: f64,
}

impl PlayerIdentityService {
    pub fn new(pool: DbPool, exact_match_threshold: f64, suggestion_threshold: f64) -> Self {
        Self { pool, exact_match_threshold, suggestion_threshold }
    }

    /// The main entry point: resolves `name` to a player, recording an alias
    /// along the way, or parks it in the review queue and returns `None`.
    /// Strategy order: exact external id, exact alias, fuzzy (auto-accept
    /// above `exact_match_threshold`), then review queue.
    pub async fn find_or_queue_player(
        &self,
        name: &str,
        source: &str,
        external_id: Option<&str>,
        match_context: Option<serde_json::Value>,
    ) -> Result<Option<PlayerMatch>> {
        let normalized = normalize_name(name);

        if let Some(external_id) = external_id {
            if let Some(player) = Player::find_by_external_id(&self.pool, source, external_id).await? {
                PlayerAlias::ensure(&self.pool, player.id, &normalized, source).await?;
                return Ok(Some(PlayerMatch {
                    player_id: player.id,
                    confidence: 1.0,
                    match_kind: MatchKind::ExactId,
                    matched_value: external_id.to_string(),
                }));
            }
        }

        if let Some(alias) = PlayerAlias::find_by_alias(&self.pool, &normalized).await?.into_iter().next() {
            PlayerAlias::ensure(&self.pool, alias.player_id, &normalized, source).await?;
            if let Some(external_id) = external_id {
                Player::link_external_id_if_absent(&self.pool, alias.player_id, source, external_id).await?;
            }
            return Ok(Some(PlayerMatch {
                player_id: alias.player_id,
                confidence: 1.0,
                match_kind: MatchKind::ExactAlias,
                matched_value: normalized,
            }));
        }

        let candidates = self.fuzzy_search(&normalized, 3).await?;

        if let Some((player_id, confidence)) = candidates.first() {
            if *confidence >= self.exact_match_threshold {
                PlayerAlias::ensure(&self.pool, *player_id, &normalized, source).await?;
                if let Some(external_id) = external_id {
                    Player::link_external_id_if_absent(&self.pool, *player_id, source, external_id).await?;
                }
                return Ok(Some(PlayerMatch {
                    player_id: *player_id,
                    confidence: *confidence,
                    match_kind: MatchKind::Fuzzy,
                    matched_value: normalized,
                }));
            }
        }

        let abbreviated = self.abbreviated_name_candidates(&normalized).await?;
        match abbreviated.len() {
            1 => {
                let player_id = abbreviated[0];
                PlayerAlias::ensure(&self.pool, player_id, &normalized, source).await?;
                if let Some(external_id) = external_id {
                    Player::link_external_id_if_absent(&self.pool, player_id, source, external_id).await?;
                }
                return Ok(Some(PlayerMatch {
                    player_id,
                    confidence: self.exact_match_threshold,
                    match_kind: MatchKind::Abbreviated,
                    matched_value: normalized,
                }));
            }
            n if n > 1 => {
                let suggestions: Vec<(Uuid, f64)> = abbreviated
                    .into_iter()
                    .take(3)
                    .map(|player_id| (player_id, self.exact_match_threshold))
                    .collect();
                PlayerReviewQueue::enqueue(&self.pool, name, source, external_id, match_context, &suggestions).await?;
                return Ok(None);
            }
            _ => {}
        }

        PlayerReviewQueue::enqueue(&self.pool, name, source, external_id, match_context, &candidates).await?;
        Ok(None)
    }

    /// Strategy 4: abbreviated renderings ("R. Nadal") that neither an exact
    /// alias nor a confident fuzzy score resolved. Looks for players sharing
    /// the query's last name whose recorded aliases are initial-compatible
    /// with it — either an exact abbreviated variant of that alias, or the
    /// same per-token initials sequence. Returns every player found; the
    /// caller only auto-resolves when this comes back a singleton.
    async fn abbreviated_name_candidates(&self, normalized_query: &str) -> Result<Vec<Uuid>> {
        let query_last_name = extract_last_name(normalized_query);
        if query_last_name.is_empty() {
            return Ok(vec![]);
        }
        let query_initials = extract_initials(normalized_query);

        let mut matches: HashSet<Uuid> = HashSet::new();
        for (player_id, alias) in Player::all_aliases(&self.pool).await? {
            if extract_last_name(&alias) != query_last_name {
                continue;
            }
            let is_variant = generate_search_variants(&alias).iter().any(|v| v == normalized_query);
            let is_initials_match = extract_initials(&alias) == query_initials;
            if is_variant || is_initials_match {
                matches.insert(player_id);
            }
        }
        Ok(matches.into_iter().collect())
    }

    /// Read-only variant of [`Self::find_or_queue_player`]: looks a name up
    /// without creating aliases, players, or review items.
    pub async fn find_player(&self, name: &str, source: &str, external_id: Option<&str>) -> Result<Option<PlayerMatch>> {
        let normalized = normalize_name(name);

        if let Some(external_id) = external_id {
            if let Some(player) = Player::find_by_external_id(&self.pool, source, external_id).await? {
                return Ok(Some(PlayerMatch {
                    player_id: player.id,
                    confidence: 1.0,
                    match_kind: MatchKind::ExactId,
                    matched_value: external_id.to_string(),
                }));
            }
        }

        if let Some(alias) = PlayerAlias::find_by_alias(&self.pool, &normalized).await?.into_iter().next() {
            return Ok(Some(PlayerMatch {
                player_id: alias.player_id,
                confidence: 1.0,
                match_kind: MatchKind::ExactAlias,
                matched_value: normalized,
            }));
        }

        let candidates = self.fuzzy_search(&normalized, 1).await?;
        Ok(candidates.into_iter().next().map(|(player_id, confidence)| PlayerMatch {
            player_id,
            confidence,
            match_kind: MatchKind::Fuzzy,
            matched_value: normalized,
        }))
    }

    pub async fn create_player(
        &self,
        name: &str,
        source: &str,
        external_id: Option<&str>,
        nationality: Option<&str>,
    ) -> Result<Player> {
        validate_name(name, "player name")?;
        let normalized = normalize_name(name);
        let player = Player::create(&self.pool, name.trim(), &normalized, nationality).await?;
        PlayerAlias::ensure(&self.pool, player.id, &normalized, source).await?;
        if let Some(external_id) = external_id {
            Player::link_external_id_if_absent(&self.pool, player.id, source, external_id).await?;
        }
        Ok(player)
    }

    pub async fn resolve_review_item(
        &self,
        review_id: Uuid,
        action: ReviewAction,
        resolved_by: &str,
    ) -> Result<()> {
        let item = PlayerReviewQueue::find_by_id(&self.pool, review_id)
            .await?
            .ok_or_else(|| crate::error::AppError::NotFound(format!("review item {review_id}")))?;

        match action {
            ReviewAction::Match { player_id } => {
                let normalized = normalize_name(&item.scraped_name);
                PlayerAlias::ensure(&self.pool, player_id, &normalized, &item.source).await?;
                if let Some(external_id) = &item.external_id {
                    Player::link_external_id_if_absent(&self.pool, player_id, &item.source, external_id).await?;
                }
                PlayerReviewQueue::resolve(&self.pool, review_id, ReviewStatus::Matched, Some(player_id), resolved_by).await?;
            }
            ReviewAction::Create => {
                let player = self
                    .create_player(&item.scraped_name, &item.source, item.external_id.as_deref(), None)
                    .await?;
                PlayerReviewQueue::resolve(&self.pool, review_id, ReviewStatus::NewPlayer, Some(player.id), resolved_by).await?;
            }
            ReviewAction::Ignore => {
                PlayerReviewQueue::resolve(&self.pool, review_id, ReviewStatus::Ignored, None, resolved_by).await?;
            }
        }

        Ok(())
    }

    /// Merges `merge_id` into `keep_id`: repoints every match, alias, and
    /// Elo history row, copies over any external id `keep_id` lacks, then
    /// deletes the now-empty duplicate. Aliases that would collide on
    /// `(player_id, alias, source)` are simply dropped rather than erroring,
    /// since `keep_id` already has an equivalent one.
    ///
    /// Both players' Elo state is wiped and every match either of them
    /// played is flagged `elo_needs_recompute`: the two merged identities
    /// each have an independent, now-invalid rating trajectory, and only a
    /// full reprocessing pass (the engine naturally picks these up) produces
    /// a trajectory for the combined identity. `merged_canonical_name` is
    /// recorded in the merge log so a later false-merge can be recognized
    /// and proposed back as an alias rather than silently lost.
    pub async fn merge_players(&self, keep_id: Uuid, merge_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let merged: Option<(String, String)> = sqlx::query_as(
            "SELECT canonical_name, normalized_name FROM players WHERE id = $1",
        )
        .bind(merge_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((merged_canonical_name, merged_normalized_name)) = merged else {
            return Err(crate::error::AppError::NotFound(format!("player {merge_id}")));
        };

        sqlx::query("UPDATE matches SET player_a_id = $1 WHERE player_a_id = $2")
            .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;
        sqlx::query("UPDATE matches SET player_b_id = $1 WHERE player_b_id = $2")
            .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;
        sqlx::query("UPDATE matches SET winner_id = $1 WHERE winner_id = $2")
            .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;

        sqlx::query(
            "UPDATE matches SET elo_needs_recompute = true
             WHERE player_a_id = $1 OR player_b_id = $1",
        )
        .bind(keep_id).execute(&mut *tx).await?;

        sqlx::query(
            "UPDATE player_aliases SET player_id = $1 WHERE player_id = $2
             AND NOT EXISTS (
                SELECT 1 FROM player_aliases existing
                WHERE existing.player_id = $1
                  AND existing.alias = player_aliases.alias
                  AND existing.source = player_aliases.source
             )",
        )
        .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM player_aliases WHERE player_id = $1")
            .bind(merge_id).execute(&mut *tx).await?;

        sqlx::query("DELETE FROM elo_rating_history WHERE player_id IN ($1, $2)")
            .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;

        sqlx::query(
            "UPDATE players SET
                atp_id = COALESCE(players.atp_id, merged.atp_id),
                wta_id = COALESCE(players.wta_id, merged.wta_id),
                itf_id = COALESCE(players.itf_id, merged.itf_id)
             FROM (SELECT atp_id, wta_id, itf_id FROM players WHERE id = $2) AS merged
             WHERE players.id = $1",
        )
        .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;

        sqlx::query("DELETE FROM player_elo_state WHERE player_id IN ($1, $2)")
            .bind(keep_id).bind(merge_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM players WHERE id = $1")
            .bind(merge_id).execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO player_merge_log (keep_player_id, merged_canonical_name, merged_normalized_name)
             VALUES ($1, $2, $3)",
        )
        .bind(keep_id)
        .bind(&merged_canonical_name)
        .bind(&merged_normalized_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reverses a bad merge (or corrects a mixed-gender/mixed-identity row):
    /// creates a fresh player for `canonical_name`, repoints the given
    /// matches (and any aliases exactly matching its normalized name) from
    /// `from_id` onto it, and flags both players' remaining matches for Elo
    /// recompute. Unlike `merge_players`, this never deletes `from_id` — it
    /// may still rightfully own other matches.
    pub async fn split_player(
        &self,
        from_id: Uuid,
        match_ids: &[Uuid],
        canonical_name: &str,
        source: &str,
    ) -> Result<Uuid> {
        validate_name(canonical_name, "player name")?;
        let normalized = normalize_name(canonical_name);
        let mut tx = self.pool.begin().await?;

        let new_player: (Uuid,) = sqlx::query_as(
            "INSERT INTO players (canonical_name, normalized_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(canonical_name.trim())
        .bind(&normalized)
        .fetch_one(&mut *tx)
        .await?;
        let new_id = new_player.0;

        sqlx::query(
            "UPDATE matches SET player_a_id = $1, elo_needs_recompute = true
             WHERE id = ANY($2) AND player_a_id = $3",
        )
        .bind(new_id).bind(match_ids).bind(from_id).execute(&mut *tx).await?;
        sqlx::query(
            "UPDATE matches SET player_b_id = $1, elo_needs_recompute = true
             WHERE id = ANY($2) AND player_b_id = $3",
        )
        .bind(new_id).bind(match_ids).bind(from_id).execute(&mut *tx).await?;
        sqlx::query(
            "UPDATE matches SET winner_id = $1 WHERE id = ANY($2) AND winner_id = $3",
        )
        .bind(new_id).bind(match_ids).bind(from_id).execute(&mut *tx).await?;

        sqlx::query(
            "UPDATE matches SET elo_needs_recompute = true WHERE player_a_id = $1 OR player_b_id = $1",
        )
        .bind(from_id).execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO player_aliases (player_id, alias, source)
             SELECT $1, alias, source FROM player_aliases
             WHERE player_id = $2 AND alias = $3
             ON CONFLICT (player_id, alias, source) DO NOTHING",
        )
        .bind(new_id).bind(from_id).bind(&normalized).execute(&mut *tx).await?;

        if !source.is_empty() {
            sqlx::query(
                "INSERT INTO player_aliases (player_id, alias, source) VALUES ($1, $2, $3)
                 ON CONFLICT (player_id, alias, source) DO NOTHING",
            )
            .bind(new_id).bind(&normalized).bind(source).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM player_elo_state WHERE player_id = $1").bind(from_id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(new_id)
    }

    pub async fn link_cross_tour_ids(
        &self,
        player_id: Uuid,
        atp_id: Option<&str>,
        wta_id: Option<&str>,
        itf_id: Option<&str>,
    ) -> Result<()> {
        if let Some(id) = atp_id {
            Player::link_external_id_if_absent(&self.pool, player_id, "atp", id).await?;
        }
        if let Some(id) = wta_id {
            Player::link_external_id_if_absent(&self.pool, player_id, "wta", id).await?;
        }
        if let Some(id) = itf_id {
            Player::link_external_id_if_absent(&self.pool, player_id, "itf", id).await?;
        }
        Ok(())
    }

    /// Scans every alias on record and scores it against `normalized_name`,
    /// keeping the best-scoring alias per player above `suggestion_threshold`
    /// and returning the top `limit` by confidence. Intentionally simple: at
    /// the dataset sizes this pipeline targets, a full scan is fast enough,
    /// and anything smarter (pg_trgm, a trigram index) is a later
    /// optimization rather than a correctness requirement.
    async fn fuzzy_search(&self, normalized_name: &str, limit: usize) -> Result<Vec<(Uuid, f64)>> {
        let all_aliases = Player::all_aliases(&self.pool).await?;

        let mut best_per_player: std::collections::HashMap<Uuid, f64> = std::collections::HashMap::new();
        for (player_id, alias) in all_aliases {
            let score = compare_names(normalized_name, &alias);
            if score < self.suggestion_threshold {
                continue;
            }
            let entry = best_per_player.entry(player_id).or_insert(0.0);
            if score > *entry {
                *entry = score;
            }
        }

        let mut ranked: Vec<(Uuid, f64)> = best_per_player.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        ranked.truncate(limit);
        Ok(ranked)
    }
}

pub enum ReviewAction {
    Match { player_id: Uuid },
    Create,
    Ignore,
}

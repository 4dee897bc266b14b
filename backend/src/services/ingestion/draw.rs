//! Ingests a tournament draw: the bracket of player pairings before results
//! are known. Draw entries resolve players the same way results do, but
//! write no score or winner, and may have an unknown (bye/TBD) opponent.

use crate::db::DbPool;
use crate::error::Result;
use crate::models::match_row::{temporal_order, RoundRank};
use crate::models::tournament::TournamentEdition;
use crate::services::identity::PlayerIdentityService;
use crate::services::scraping::DrawEntry;
use tracing::instrument;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DrawIngestionStats {
    pub total_entries: usize,
    pub entries_created: usize,
    pub entries_skipped_no_player: usize,
}

#[instrument(skip(pool, identity, entries), fields(batch_size = entries.len()))]
pub async fn ingest_draw(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    entries: &[DrawEntry],
    edition: &TournamentEdition,
    edition_ordinal: i64,
) -> Result<DrawIngestionStats> {
    let mut stats = DrawIngestionStats::default();

    for entry in entries {
        stats.total_entries += 1;
        let source = entry.tour.as_str();

        let Some(player_a) = identity
            .find_or_queue_player(&entry.player_a_name, source, entry.player_a_external_id.as_deref(), None)
            .await?
        else {
            stats.entries_skipped_no_player += 1;
            continue;
        };

        let player_b = match &entry.player_b_name {
            Some(name) => identity
                .find_or_queue_player(name, source, entry.player_b_external_id.as_deref(), None)
                .await?,
            None => None,
        };

        let round_rank = RoundRank::from_label(&entry.round_label)?;
        let order = edition
            .start_date
            .map(|d| temporal_order(d, edition_ordinal, round_rank))
            .unwrap_or(0);

        sqlx::query(
            "INSERT INTO matches
                (edition_id, tour, round_rank, round_label, player_a_id, player_b_id,
                 seed_a, seed_b, status, external_id, temporal_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'upcoming', $9, $10)
             ON CONFLICT (edition_id, external_id) DO NOTHING",
        )
        .bind(edition.id)
        .bind(source)
        .bind(round_rank.as_i16())
        .bind(&entry.round_label)
        .bind(player_a.player_id)
        .bind(player_b.map(|p| p.player_id))
        .bind(entry.seed_a)
        .bind(entry.seed_b)
        .bind(&entry.external_id)
        .bind(order)
        .execute(pool)
        .await?;

        stats.entries_created += 1;
    }

    Ok(stats)
}

//! Ingests upcoming fixtures: scheduled matches with a date/time and court
//! but no score yet. A fixture's row transitions an existing `upcoming` draw
//! entry to `scheduled` once a real date is known, or creates the row
//! outright if no draw ingestion ran first.

use crate::db::DbPool;
use crate::error::Result;
use crate::models::match_row::{temporal_order, Match, RoundRank};
use crate::models::tournament::TournamentEdition;
use crate::services::identity::PlayerIdentityService;
use crate::services::scraping::ScrapedFixture;
use tracing::instrument;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScheduleIngestionStats {
    pub total_fixtures: usize,
    pub fixtures_created: usize,
    pub fixtures_updated: usize,
    pub skipped_no_player: usize,
}

#[instrument(skip(pool, identity, fixtures), fields(batch_size = fixtures.len()))]
pub async fn ingest_schedule(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    fixtures: &[ScrapedFixture],
    edition: &TournamentEdition,
    edition_ordinal: i64,
) -> Result<ScheduleIngestionStats> {
    let mut stats = ScheduleIngestionStats::default();

    for fixture in fixtures {
        stats.total_fixtures += 1;
        let source = fixture.tour.as_str();

        let player_a = identity
            .find_or_queue_player(&fixture.player_a_name, source, fixture.player_a_external_id.as_deref(), None)
            .await?;
        let player_b = identity
            .find_or_queue_player(&fixture.player_b_name, source, fixture.player_b_external_id.as_deref(), None)
            .await?;

        let (Some(player_a), Some(player_b)) = (player_a, player_b) else {
            stats.skipped_no_player += 1;
            continue;
        };

        let round_rank = RoundRank::from_label(&fixture.round_label)?;
        let order = fixture
            .scheduled_date
            .map(|d| temporal_order(d, edition_ordinal, round_rank))
            .unwrap_or(0);

        let existing = match &fixture.external_id {
            Some(external_id) => Match::find_by_external_id(pool, edition.id, external_id).await?,
            None => None,
        };
        // Scrapers don't always carry a stable external id for fixtures not
        // yet in a draw; fall back to identifying the match by edition,
        // round, and the (order-independent) pair of players.
        let existing = match existing {
            Some(m) => Some(m),
            None => {
                Match::find_by_edition_round_players(pool, edition.id, round_rank, player_a.player_id, player_b.player_id)
                    .await?
            }
        };

        if let Some(existing) = existing {
            sqlx::query(
                "UPDATE matches SET
                    player_a_id = $2, player_b_id = $3, status = 'scheduled',
                    match_date = $4, scheduled_datetime = $5, court = $6,
                    temporal_order = $7, updated_at = now()
                 WHERE id = $1",
            )
            .bind(existing.id)
            .bind(player_a.player_id)
            .bind(player_b.player_id)
            .bind(fixture.scheduled_date)
            .bind(fixture.scheduled_datetime)
            .bind(&fixture.court)
            .bind(order)
            .execute(pool)
            .await?;
            stats.fixtures_updated += 1;
        } else {
            sqlx::query(
                "INSERT INTO matches
                    (edition_id, tour, round_rank, round_label, player_a_id, player_b_id,
                     status, match_date, scheduled_datetime, court, external_id, temporal_order)
                 VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $8, $9, $10, $11)
                 ON CONFLICT (edition_id, external_id) DO NOTHING",
            )
            .bind(edition.id)
            .bind(source)
            .bind(round_rank.as_i16())
            .bind(&fixture.round_label)
            .bind(player_a.player_id)
            .bind(player_b.player_id)
            .bind(fixture.scheduled_date)
            .bind(fixture.scheduled_datetime)
            .bind(&fixture.court)
            .bind(&fixture.external_id)
            .bind(order)
            .execute(pool)
            .await?;
            stats.fixtures_created += 1;
        }
    }

    tracing::info!(
        total = stats.total_fixtures,
        created = stats.fixtures_created,
        updated = stats.fixtures_updated,
        "schedule ingestion batch complete"
    );
    Ok(stats)
}

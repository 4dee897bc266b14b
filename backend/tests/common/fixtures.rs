use chrono::NaiveDate;
use sqlx::PgPool;
use teelo_backend::error::Result;
use teelo_backend::models::elo_parameter_set::EloParameterSet;
use teelo_backend::models::match_row::{temporal_order, RoundRank};
use teelo_backend::models::player::Player;
use teelo_backend::models::tournament::{Tour, Tournament, TournamentEdition};
use teelo_backend::services::elo::params::EloParams;
use uuid::Uuid;

pub async fn create_player(pool: &PgPool, name: &str) -> Result<Player> {
    let normalized = teelo_backend::services::names::normalize_name(name);
    Player::create(pool, name, &normalized, None).await
}

pub async fn create_edition(pool: &PgPool, tournament_code: &str, tour: Tour, year: i32) -> Result<Uuid> {
    let tournament = Tournament::find_or_create(
        pool,
        &format!("{tournament_code} {year}"),
        tournament_code,
        tour,
        "tour",
        Some("hard"),
        None,
        None,
    )
    .await?;
    let edition = TournamentEdition::upsert(pool, tournament.id, year, None, None, None, None, None).await?;
    Ok(edition.id)
}

/// Inserts a completed match directly (mirroring the ingestion insert shape)
/// so Elo-engine tests don't need a scraper round trip. Returns the new
/// match id.
#[allow(clippy::too_many_arguments)]
pub async fn insert_completed_match(
    pool: &PgPool,
    edition_id: Uuid,
    tour: Tour,
    edition_ordinal: i64,
    round_rank: RoundRank,
    player_a: Uuid,
    player_b: Uuid,
    winner: Uuid,
    match_date: NaiveDate,
) -> Result<Uuid> {
    let order = temporal_order(match_date, edition_ordinal, round_rank);
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO matches
            (edition_id, tour, round_rank, round_label, player_a_id, player_b_id, winner_id,
             score_raw, status, match_date, temporal_order)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'completed', $9, $10)
         RETURNING id",
    )
    .bind(edition_id)
    .bind(tour.as_str())
    .bind(round_rank.as_i16())
    .bind("F")
    .bind(player_a)
    .bind(player_b)
    .bind(winner)
    .bind("6-4 6-4")
    .bind(match_date)
    .bind(order)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Creates and activates a parameter set with the engine's documented
/// defaults, as an operator would before the first pipeline run.
pub async fn activate_default_elo_params(pool: &PgPool) -> Result<EloParameterSet> {
    let set = EloParameterSet::create(pool, "test_default", &EloParams::default()).await?;
    EloParameterSet::activate(pool, &set.name).await?;
    Ok(set)
}

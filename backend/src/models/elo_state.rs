use crate::db::DbPool;
use crate::error::Result;
use crate::models::tournament::Tour;
use chrono::NaiveDate;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

/// Current Elo rating for one player on one tour-level rating pool. `tour`
/// is stored as men's/women's rather than the full [`Tour`] enum, since
/// Challenger and ATP share one rating pool, and WTA125/ITF-women share the
/// women's pool (see [`Tour::is_womens`]).
#[derive(Debug, Clone, FromRow)]
pub struct PlayerEloState {
    pub player_id: Uuid,
    pub tour: String,
    pub rating: f64,
    pub matches_played: i32,
    pub last_match_date: Option<NaiveDate>,
    pub last_temporal_order: i64,
    pub career_peak_rating: f64,
    pub career_peak_date: Option<NaiveDate>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn pool_key(womens: bool) -> &'static str {
    if womens { "women" } else { "men" }
}

const STATE_COLUMNS: &str = "player_id, tour, rating, matches_played, last_match_date,
    last_temporal_order, career_peak_rating, career_peak_date, updated_at";

impl PlayerEloState {
    pub fn pool_for(tour: Tour) -> &'static str {
        pool_key(tour.is_womens())
    }

    pub fn pool_for_bool(womens: bool) -> &'static str {
        pool_key(womens)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn get(pool: &DbPool, player_id: Uuid, womens: bool) -> Result<Option<Self>> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM player_elo_state WHERE player_id = $1 AND tour = $2");
        sqlx::query_as::<_, Self>(&sql)
            .bind(player_id)
            .bind(pool_key(womens))
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool), fields(batch_size = player_ids.len()))]
    pub async fn get_many(
        pool: &DbPool,
        player_ids: &[Uuid],
        womens: bool,
    ) -> Result<Vec<Self>> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM player_elo_state WHERE player_id = ANY($1) AND tour = $2");
        sqlx::query_as::<_, Self>(&sql)
            .bind(player_ids)
            .bind(pool_key(womens))
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn count(pool: &DbPool, womens: bool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM player_elo_state WHERE tour = $1")
            .bind(pool_key(womens))
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn upsert(pool: &DbPool, state: &Self) -> Result<()> {
        sqlx::query(
            "INSERT INTO player_elo_state
                (player_id, tour, rating, matches_played, last_match_date,
                 last_temporal_order, career_peak_rating, career_peak_date, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
             ON CONFLICT (player_id, tour) DO UPDATE SET
                rating = EXCLUDED.rating,
                matches_played = EXCLUDED.matches_played,
                last_match_date = EXCLUDED.last_match_date,
                last_temporal_order = EXCLUDED.last_temporal_order,
                career_peak_rating = EXCLUDED.career_peak_rating,
                career_peak_date = EXCLUDED.career_peak_date,
                updated_at = now()",
        )
        .bind(state.player_id)
        .bind(&state.tour)
        .bind(state.rating)
        .bind(state.matches_played)
        .bind(state.last_match_date)
        .bind(state.last_temporal_order)
        .bind(state.career_peak_rating)
        .bind(state.career_peak_date)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Bulk-upserts a whole batch in one round trip. Used by the incremental
    /// engine at the end of each batch instead of one upsert per match.
    #[instrument(level = "debug", skip(pool, states), fields(batch_size = states.len()))]
    pub async fn bulk_upsert(pool: &DbPool, states: &[Self]) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }
        let player_ids: Vec<Uuid> = states.iter().map(|s| s.player_id).collect();
        let tours: Vec<String> = states.iter().map(|s| s.tour.clone()).collect();
        let ratings: Vec<f64> = states.iter().map(|s| s.rating).collect();
        let matches_played: Vec<i32> = states.iter().map(|s| s.matches_played).collect();
        let last_match_dates: Vec<Option<NaiveDate>> = states.iter().map(|s| s.last_match_date).collect();
        let last_temporal_orders: Vec<i64> = states.iter().map(|s| s.last_temporal_order).collect();
        let peak_ratings: Vec<f64> = states.iter().map(|s| s.career_peak_rating).collect();
        let peak_dates: Vec<Option<NaiveDate>> = states.iter().map(|s| s.career_peak_date).collect();

        sqlx::query(
            "INSERT INTO player_elo_state
                (player_id, tour, rating, matches_played, last_match_date,
                 last_temporal_order, career_peak_rating, career_peak_date, updated_at)
             SELECT u.player_id, u.tour, u.rating, u.matches_played, u.last_match_date,
                    u.last_temporal_order, u.career_peak_rating, u.career_peak_date, now()
             FROM UNNEST(
                $1::uuid[], $2::text[], $3::double precision[], $4::integer[],
                $5::date[], $6::bigint[], $7::double precision[], $8::date[]
             ) AS u(player_id, tour, rating, matches_played, last_match_date,
                    last_temporal_order, career_peak_rating, career_peak_date)
             ON CONFLICT (player_id, tour) DO UPDATE SET
                rating = EXCLUDED.rating,
                matches_played = EXCLUDED.matches_played,
                last_match_date = EXCLUDED.last_match_date,
                last_temporal_order = EXCLUDED.last_temporal_order,
                career_peak_rating = EXCLUDED.career_peak_rating,
                career_peak_date = EXCLUDED.career_peak_date,
                updated_at = now()",
        )
        .bind(&player_ids)
        .bind(&tours)
        .bind(&ratings)
        .bind(&matches_played)
        .bind(&last_match_dates)
        .bind(&last_temporal_orders)
        .bind(&peak_ratings)
        .bind(&peak_dates)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Deletes the rating row entirely, used when a rebuild discovers a player
    /// has zero processed matches left after a merge or a removed duplicate.
    #[instrument(level = "debug", skip(pool))]
    pub async fn delete(pool: &DbPool, player_id: Uuid, womens: bool) -> Result<()> {
        sqlx::query("DELETE FROM player_elo_state WHERE player_id = $1 AND tour = $2")
            .bind(player_id)
            .bind(pool_key(womens))
            .execute(pool)
            .await?;
        Ok(())
    }
}

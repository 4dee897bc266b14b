use crate::db::DbPool;
use crate::error::Result;
use chrono::NaiveDate;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

/// One rating transition for one player at one match, written alongside the
/// [`super::PlayerEloState`] update in the same batch. Append-only: a rebuild
/// truncates and rewrites it for the affected players rather than mutating
/// rows in place, so it always reflects the rating trajectory implied by the
/// current match data.
#[derive(Debug, Clone, FromRow)]
pub struct EloRatingHistory {
    pub id: Uuid,
    pub player_id: Uuid,
    pub match_id: Uuid,
    pub rating_before: f64,
    pub rating_after: f64,
    pub rating_date: NaiveDate,
    pub is_career_peak: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EloRatingHistory {
    #[instrument(level = "debug", skip(pool, rows), fields(batch_size = rows.len()))]
    pub async fn insert_batch(
        pool: &DbPool,
        rows: &[(Uuid, Uuid, f64, f64, NaiveDate, bool)],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let player_ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let match_ids: Vec<Uuid> = rows.iter().map(|r| r.1).collect();
        let before: Vec<f64> = rows.iter().map(|r| r.2).collect();
        let after: Vec<f64> = rows.iter().map(|r| r.3).collect();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.4).collect();
        let peaks: Vec<bool> = rows.iter().map(|r| r.5).collect();

        sqlx::query(
            "INSERT INTO elo_rating_history
                (player_id, match_id, rating_before, rating_after, rating_date, is_career_peak)
             SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::double precision[], $4::double precision[],
                $5::date[], $6::boolean[]
             )
             ON CONFLICT (player_id, match_id) DO UPDATE SET
                rating_before = EXCLUDED.rating_before,
                rating_after = EXCLUDED.rating_after,
                rating_date = EXCLUDED.rating_date,
                is_career_peak = EXCLUDED.is_career_peak",
        )
        .bind(&player_ids)
        .bind(&match_ids)
        .bind(&before)
        .bind(&after)
        .bind(&dates)
        .bind(&peaks)
        .execute(pool)
        .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn for_player(pool: &DbPool, player_id: Uuid) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, player_id, match_id, rating_before, rating_after, rating_date,
                is_career_peak, created_at
             FROM elo_rating_history WHERE player_id = $1 ORDER BY rating_date ASC",
        )
        .bind(player_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Deletes every history row for `player_ids` at or after `from_date`, in
    /// preparation for a rebuild rewriting them.
    #[instrument(level = "debug", skip(pool))]
    pub async fn delete_from_date(
        pool: &DbPool,
        player_ids: &[Uuid],
        from_date: NaiveDate,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM elo_rating_history WHERE player_id = ANY($1) AND rating_date >= $2",
        )
        .bind(player_ids)
        .bind(from_date)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

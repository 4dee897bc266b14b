use crate::db::DbPool;
use crate::error::Result;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Player {
    pub id: Uuid,
    pub canonical_name: String,
    pub normalized_name: String,
    pub nationality: Option<String>,
    pub atp_id: Option<String>,
    pub wta_id: Option<String>,
    pub itf_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Player {
    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, canonical_name, normalized_name, nationality, atp_id, wta_id, itf_id, created_at
             FROM players WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool), fields(batch_size = ids.len()))]
    pub async fn find_by_ids(pool: &DbPool, ids: &[Uuid]) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, canonical_name, normalized_name, nationality, atp_id, wta_id, itf_id, created_at
             FROM players WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Looks a player up by the external id a given source (`"atp"`, `"wta"`, or
    /// `"itf"`) assigns them. Returns `None` for unrecognized sources rather than
    /// erroring, since callers pass through whatever string the scraper recorded.
    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_external_id(
        pool: &DbPool,
        source: &str,
        external_id: &str,
    ) -> Result<Option<Self>> {
        let column = match source {
            "atp" => "atp_id",
            "wta" => "wta_id",
            "itf" => "itf_id",
            _ => return Ok(None),
        };

        let sql = format!(
            "SELECT id, canonical_name, normalized_name, nationality, atp_id, wta_id, itf_id, created_at
             FROM players WHERE {column} = $1"
        );

        sqlx::query_as::<_, Self>(&sql)
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_normalized_name(pool: &DbPool, normalized_name: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, canonical_name, normalized_name, nationality, atp_id, wta_id, itf_id, created_at
             FROM players WHERE normalized_name = $1",
        )
        .bind(normalized_name)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn all_aliases(pool: &DbPool) -> Result<Vec<(Uuid, String)>> {
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT player_id, alias FROM player_aliases")
                .fetch_all(pool)
                .await?;
        Ok(rows)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn create(
        pool: &DbPool,
        canonical_name: &str,
        normalized_name: &str,
        nationality: Option<&str>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO players (canonical_name, normalized_name, nationality)
             VALUES ($1, $2, $3)
             RETURNING id, canonical_name, normalized_name, nationality, atp_id, wta_id, itf_id, created_at",
        )
        .bind(canonical_name)
        .bind(normalized_name)
        .bind(nationality)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Sets whichever of `atp_id`/`wta_id`/`itf_id` a given source owns, but only
    /// when the player doesn't already have one for that source.
    #[instrument(level = "debug", skip(pool))]
    pub async fn link_external_id_if_absent(
        pool: &DbPool,
        player_id: Uuid,
        source: &str,
        external_id: &str,
    ) -> Result<()> {
        let column = match source {
            "atp" => "atp_id",
            "wta" => "wta_id",
            "itf" => "itf_id",
            _ => return Ok(()),
        };

        let sql = format!(
            "UPDATE players SET {column} = $2 WHERE id = $1 AND {column} IS NULL"
        );

        sqlx::query(&sql)
            .bind(player_id)
            .bind(external_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerAlias {
    pub id: Uuid,
    pub player_id: Uuid,
    pub alias: String,
    pub source: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PlayerAlias {
    /// Idempotent: an alias already on record for this `(player, alias, source)`
    /// triple is a no-op, not a conflict.
    #[instrument(level = "debug", skip(pool))]
    pub async fn ensure(
        pool: &DbPool,
        player_id: Uuid,
        alias: &str,
        source: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO player_aliases (player_id, alias, source)
             VALUES ($1, $2, $3)
             ON CONFLICT (player_id, alias, source) DO NOTHING",
        )
        .bind(player_id)
        .bind(alias)
        .bind(source)
        .execute(pool)
        .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_alias(pool: &DbPool, alias: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, player_id, alias, source, created_at FROM player_aliases WHERE alias = $1",
        )
        .bind(alias)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Matched,
    NewPlayer,
    Ignored,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Matched => "matched",
            ReviewStatus::NewPlayer => "new_player",
            ReviewStatus::Ignored => "ignored",
        }
    }
}

/// A candidate match too ambiguous for the identity resolver to act on alone,
/// parked for a human (or a later automated rule) to settle.
#[derive(Debug, Clone, FromRow)]
pub struct PlayerReviewQueue {
    pub id: Uuid,
    pub scraped_name: String,
    pub source: String,
    pub external_id: Option<String>,
    pub match_context: Option<serde_json::Value>,
    pub suggested_player_1_id: Option<Uuid>,
    pub suggested_player_1_confidence: Option<f64>,
    pub suggested_player_2_id: Option<Uuid>,
    pub suggested_player_2_confidence: Option<f64>,
    pub suggested_player_3_id: Option<Uuid>,
    pub suggested_player_3_confidence: Option<f64>,
    pub status: String,
    pub resolved_player_id: Option<Uuid>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PlayerReviewQueue {
    #[instrument(level = "debug", skip(pool, match_context, suggestions))]
    pub async fn enqueue(
        pool: &DbPool,
        scraped_name: &str,
        source: &str,
        external_id: Option<&str>,
        match_context: Option<serde_json::Value>,
        suggestions: &[(Uuid, f64)],
    ) -> Result<Self> {
        let s1 = suggestions.first();
        let s2 = suggestions.get(1);
        let s3 = suggestions.get(2);

        sqlx::query_as::<_, Self>(
            "INSERT INTO player_review_queue
                (scraped_name, source, external_id, match_context,
                 suggested_player_1_id, suggested_player_1_confidence,
                 suggested_player_2_id, suggested_player_2_confidence,
                 suggested_player_3_id, suggested_player_3_confidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id, scraped_name, source, external_id, match_context,
                suggested_player_1_id, suggested_player_1_confidence,
                suggested_player_2_id, suggested_player_2_confidence,
                suggested_player_3_id, suggested_player_3_confidence,
                status, resolved_player_id, resolved_by, resolved_at, created_at",
        )
        .bind(scraped_name)
        .bind(source)
        .bind(external_id)
        .bind(match_context)
        .bind(s1.map(|(id, _)| *id))
        .bind(s1.map(|(_, c)| *c))
        .bind(s2.map(|(id, _)| *id))
        .bind(s2.map(|(_, c)| *c))
        .bind(s3.map(|(id, _)| *id))
        .bind(s3.map(|(_, c)| *c))
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, scraped_name, source, external_id, match_context,
                suggested_player_1_id, suggested_player_1_confidence,
                suggested_player_2_id, suggested_player_2_confidence,
                suggested_player_3_id, suggested_player_3_confidence,
                status, resolved_player_id, resolved_by, resolved_at, created_at
             FROM player_review_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn pending(pool: &DbPool, limit: i64) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, scraped_name, source, external_id, match_context,
                suggested_player_1_id, suggested_player_1_confidence,
                suggested_player_2_id, suggested_player_2_confidence,
                suggested_player_3_id, suggested_player_3_confidence,
                status, resolved_player_id, resolved_by, resolved_at, created_at
             FROM player_review_queue WHERE status = 'pending'
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn resolve(
        pool: &DbPool,
        id: Uuid,
        status: ReviewStatus,
        resolved_player_id: Option<Uuid>,
        resolved_by: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE player_review_queue
             SET status = $2, resolved_player_id = $3, resolved_by = $4, resolved_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(resolved_player_id)
        .bind(resolved_by)
        .execute(pool)
        .await?;
        Ok(())
    }
}

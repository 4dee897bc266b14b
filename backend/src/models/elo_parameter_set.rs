use crate::db::DbPool;
use crate::error::Result;
use crate::services::elo::params::EloParams;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

/// A named, immutable snapshot of Elo tuning constants. Existing match rows
/// record the `name` of the set that produced their `elo_post_*` values
/// (`matches.elo_params_version`), so re-tuning never silently invalidates
/// history already written under a previous set — only an explicit rebuild
/// does.
#[derive(Debug, Clone, FromRow)]
pub struct EloParameterSet {
    pub id: Uuid,
    pub name: String,
    pub params: serde_json::Value,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EloParameterSet {
    #[instrument(level = "debug", skip(pool))]
    pub async fn active(pool: &DbPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, name, params, is_active, created_at FROM elo_parameter_sets WHERE is_active",
        )
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_name(pool: &DbPool, name: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, name, params, is_active, created_at FROM elo_parameter_sets WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool, params))]
    pub async fn create(pool: &DbPool, name: &str, params: &EloParams) -> Result<Self> {
        let json = serde_json::to_value(params).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
        sqlx::query_as::<_, Self>(
            "INSERT INTO elo_parameter_sets (name, params) VALUES ($1, $2)
             RETURNING id, name, params, is_active, created_at",
        )
        .bind(name)
        .bind(json)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Activates the named set and deactivates whatever was active before,
    /// atomically: the partial unique index on `is_active` forbids two active
    /// rows at once, so this must clear the old flag inside the same
    /// transaction that sets the new one.
    #[instrument(level = "debug", skip(pool))]
    pub async fn activate(pool: &DbPool, name: &str) -> Result<()> {
        let mut tx = pool.begin().await?;
        sqlx::query("UPDATE elo_parameter_sets SET is_active = false WHERE is_active")
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("UPDATE elo_parameter_sets SET is_active = true WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(crate::error::AppError::NotFound(format!("elo parameter set {name}")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub fn as_params(&self) -> Result<EloParams> {
        serde_json::from_value(self.params.clone()).map_err(|e| crate::error::AppError::Internal(e.to_string()))
    }
}

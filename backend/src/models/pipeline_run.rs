use crate::db::DbPool;
use crate::error::Result;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: String,
    pub stats: Option<serde_json::Value>,
}

impl PipelineRun {
    #[instrument(level = "debug", skip(pool))]
    pub async fn start(pool: &DbPool, pipeline_name: &str) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO pipeline_runs (pipeline_name) VALUES ($1)
             RETURNING id, pipeline_name, started_at, finished_at, status, stats",
        )
        .bind(pipeline_name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool, stats))]
    pub async fn finish(pool: &DbPool, id: Uuid, status: &str, stats: serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs SET finished_at = now(), status = $2, stats = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(stats)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PipelineStageRun {
    pub id: Uuid,
    pub run_id: Uuid,
    pub stage_name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: String,
    pub stats: Option<serde_json::Value>,
}

impl PipelineStageRun {
    #[instrument(level = "debug", skip(pool))]
    pub async fn start(pool: &DbPool, run_id: Uuid, stage_name: &str) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO pipeline_stage_runs (run_id, stage_name) VALUES ($1, $2)
             RETURNING id, run_id, stage_name, started_at, finished_at, status, stats",
        )
        .bind(run_id)
        .bind(stage_name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool, stats))]
    pub async fn finish(pool: &DbPool, id: Uuid, status: &str, stats: serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_stage_runs SET finished_at = now(), status = $2, stats = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(stats)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Durable resume point for a named pipeline stage (`"elo_incremental"`,
/// `"results_ingestion:atp"`, ...), so a restarted process picks up where it
/// left off instead of rescanning from the beginning.
#[derive(Debug, Clone, FromRow)]
pub struct PipelineCheckpoint {
    pub checkpoint_key: String,
    pub last_processed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cursor: Option<serde_json::Value>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PipelineCheckpoint {
    #[instrument(level = "debug", skip(pool))]
    pub async fn get(pool: &DbPool, checkpoint_key: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT checkpoint_key, last_processed_at, cursor, updated_at
             FROM pipeline_checkpoints WHERE checkpoint_key = $1",
        )
        .bind(checkpoint_key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool, cursor))]
    pub async fn save(pool: &DbPool, checkpoint_key: &str, cursor: serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_checkpoints (checkpoint_key, last_processed_at, cursor, updated_at)
             VALUES ($1, now(), $2, now())
             ON CONFLICT (checkpoint_key) DO UPDATE SET
                last_processed_at = now(), cursor = EXCLUDED.cursor, updated_at = now()",
        )
        .bind(checkpoint_key)
        .bind(cursor)
        .execute(pool)
        .await?;
        Ok(())
    }
}

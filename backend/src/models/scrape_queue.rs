use crate::db::DbPool;
use crate::error::Result;
use sqlx::FromRow;
use tracing::instrument;

pub const PRIORITY_URGENT: i16 = 1;
pub const PRIORITY_HIGH: i16 = 3;
pub const PRIORITY_NORMAL: i16 = 5;
pub const PRIORITY_LOW: i16 = 7;
pub const PRIORITY_BACKFILL: i16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Retry,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Retry => "retry",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScrapeTask {
    pub id: i64,
    pub task_type: String,
    pub task_params: serde_json::Value,
    pub priority: i16,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const TASK_COLUMNS: &str = "id, task_type, task_params, priority, status, attempts,
    max_attempts, last_error, next_retry_at, started_at, completed_at, created_at";

impl ScrapeTask {
    /// Enqueues a task, deduping against any pending/in-progress/retry task with
    /// the same type and params. Returns the existing task's id if one matches.
    #[instrument(level = "debug", skip(pool, params))]
    pub async fn enqueue(
        pool: &DbPool,
        task_type: &str,
        params: &serde_json::Value,
        priority: i16,
        max_attempts: i32,
    ) -> Result<i64> {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM scrape_queue
             WHERE task_type = $1 AND task_params = $2
               AND status IN ('pending', 'in_progress', 'retry')
             LIMIT 1",
        )
        .bind(task_type)
        .bind(params)
        .fetch_optional(pool)
        .await?;

        if let Some((id,)) = existing {
            return Ok(id);
        }

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO scrape_queue (task_type, task_params, priority, max_attempts)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(task_type)
        .bind(params)
        .bind(priority)
        .bind(max_attempts)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    /// Leases the next ready task and marks it in-progress in one transaction,
    /// using `FOR UPDATE SKIP LOCKED` so concurrent workers never double-lease
    /// the same row.
    #[instrument(level = "debug", skip(pool))]
    pub async fn lease_next(pool: &DbPool) -> Result<Option<Self>> {
        let mut tx = pool.begin().await?;

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM scrape_queue
             WHERE status IN ('pending', 'retry')
               AND (next_retry_at IS NULL OR next_retry_at <= now())
             ORDER BY priority ASC, created_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED"
        );

        let task = sqlx::query_as::<_, Self>(&sql)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(task) = task else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE scrape_queue SET status = 'in_progress', started_at = now(), attempts = attempts + 1
             WHERE id = $1",
        )
        .bind(task.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Self {
            status: TaskStatus::InProgress.as_str().to_string(),
            attempts: task.attempts + 1,
            ..task
        }))
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn mark_completed(pool: &DbPool, id: i64) -> Result<()> {
        sqlx::query("UPDATE scrape_queue SET status = 'completed', completed_at = now() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Marks a failed attempt. Retries with exponential backoff
    /// (`5min * 2^(attempts-1)`) plus up to 60s of jitter until `max_attempts`
    /// is exhausted, then fails permanently.
    #[instrument(level = "debug", skip(pool, error))]
    pub async fn mark_failed(pool: &DbPool, id: i64, attempts: i32, max_attempts: i32, error: &str) -> Result<()> {
        let truncated: String = error.chars().take(1000).collect();

        if attempts < max_attempts {
            let delay_minutes = 5u32.saturating_mul(1u32 << (attempts.max(1) as u32 - 1).min(20));
            let jitter_secs = rand::random::<u64>() % 60;
            sqlx::query(
                "UPDATE scrape_queue
                 SET status = 'retry', last_error = $2,
                     next_retry_at = now() + make_interval(mins => $3, secs => $4)
                 WHERE id = $1",
            )
            .bind(id)
            .bind(truncated)
            .bind(delay_minutes as f64)
            .bind(jitter_secs as f64)
            .execute(pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE scrape_queue SET status = 'failed', last_error = $2, completed_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(truncated)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn cancel(pool: &DbPool, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scrape_queue SET status = 'cancelled', completed_at = now()
             WHERE id = $1 AND status IN ('pending', 'retry')",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn pending_count(pool: &DbPool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM scrape_queue WHERE status IN ('pending', 'retry')",
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn cleanup_old_completed(pool: &DbPool, older_than_days: i32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM scrape_queue
             WHERE status = 'completed' AND completed_at < now() - make_interval(days => $1)",
        )
        .bind(older_than_days)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

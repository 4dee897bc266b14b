use crate::error::{AppError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub type DbPool = PgPool;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(Into::into)
}

/// Namespaced keys for `pg_try_advisory_lock`. Each pipeline stage that must run
/// exclusively across processes gets its own key so unrelated stages never contend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum LockKey {
    EloIncremental = 1,
    EloRebuild = 2,
    ResultsIngestion = 3,
    ScrapeQueueDrain = 4,
    MaintenanceDedup = 5,
    Pipeline = 6,
}

/// Attempts to take a process-wide advisory lock, polling until it succeeds or
/// `timeout` elapses. Returns `Ok(true)` once held; the caller is responsible for
/// releasing it with [`release_advisory_lock`] (ideally in all code paths, including
/// error ones).
pub async fn acquire_advisory_lock(
    pool: &DbPool,
    key: LockKey,
    timeout: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key as i64)
            .fetch_one(pool)
            .await?;

        if acquired.0 {
            return Ok(true);
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

pub async fn release_advisory_lock(pool: &DbPool, key: LockKey) -> Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(key as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// Runs `f` while holding the advisory lock for `key`, releasing it (even on error)
/// when `f` completes. Returns [`AppError::LockAcquisitionTimeout`] if the lock isn't
/// free within `timeout`.
pub async fn with_advisory_lock<F, Fut, T>(
    pool: &DbPool,
    key: LockKey,
    timeout: Duration,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    if !acquire_advisory_lock(pool, key, timeout).await? {
        return Err(AppError::LockAcquisitionTimeout {
            stage: format!("{key:?}"),
        });
    }

    let result = f().await;
    release_advisory_lock(pool, key).await?;
    result
}

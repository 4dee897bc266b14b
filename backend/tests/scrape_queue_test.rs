mod common;

use common::setup;
use teelo_backend::models::scrape_queue::{ScrapeTask, PRIORITY_NORMAL};

#[tokio::test]
async fn enqueue_dedupes_identical_pending_task() {
    let ctx = setup::setup_test_db().await;
    let params = serde_json::json!({ "tour": "atp", "year": 2026 });

    let first = ScrapeTask::enqueue(&ctx.pool, "discover", &params, PRIORITY_NORMAL, 3).await.unwrap();
    let second = ScrapeTask::enqueue(&ctx.pool, "discover", &params, PRIORITY_NORMAL, 3).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ScrapeTask::pending_count(&ctx.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn lease_next_returns_highest_priority_first() {
    let ctx = setup::setup_test_db().await;
    let low = serde_json::json!({ "tour": "wta", "year": 2026 });
    let urgent = serde_json::json!({ "tour": "atp", "year": 2026 });

    ScrapeTask::enqueue(&ctx.pool, "discover", &low, teelo_backend::models::scrape_queue::PRIORITY_LOW, 3).await.unwrap();
    let urgent_id = ScrapeTask::enqueue(&ctx.pool, "discover", &urgent, teelo_backend::models::scrape_queue::PRIORITY_URGENT, 3).await.unwrap();

    let leased = ScrapeTask::lease_next(&ctx.pool).await.unwrap().expect("a task should be ready");
    assert_eq!(leased.id, urgent_id);
    assert_eq!(leased.status, "in_progress");
    assert_eq!(leased.attempts, 1);
}

#[tokio::test]
async fn mark_failed_schedules_retry_until_max_attempts() {
    let ctx = setup::setup_test_db().await;
    let params = serde_json::json!({ "edition_id": uuid::Uuid::new_v4(), "edition_ordinal": 1 });
    let id = ScrapeTask::enqueue(&ctx.pool, "scrape_draw", &params, PRIORITY_NORMAL, 2).await.unwrap();

    let leased = ScrapeTask::lease_next(&ctx.pool).await.unwrap().unwrap();
    ScrapeTask::mark_failed(&ctx.pool, id, leased.attempts, 2, "network timeout").await.unwrap();

    let (status, next_retry_at): (String, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as("SELECT status, next_retry_at FROM scrape_queue WHERE id = $1")
            .bind(id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(status, "retry");
    assert!(next_retry_at.is_some());

    // second failure exhausts max_attempts
    sqlx::query("UPDATE scrape_queue SET status = 'pending', next_retry_at = NULL WHERE id = $1")
        .bind(id)
        .execute(&ctx.pool)
        .await
        .unwrap();
    let leased_again = ScrapeTask::lease_next(&ctx.pool).await.unwrap().unwrap();
    ScrapeTask::mark_failed(&ctx.pool, id, leased_again.attempts, 2, "network timeout again").await.unwrap();

    let (final_status,): (String,) = sqlx::query_as("SELECT status FROM scrape_queue WHERE id = $1")
        .bind(id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(final_status, "failed");
}

#[tokio::test]
async fn cancel_only_affects_pending_or_retry_tasks() {
    let ctx = setup::setup_test_db().await;
    let params = serde_json::json!({ "tour": "itf_men", "year": 2026 });
    let id = ScrapeTask::enqueue(&ctx.pool, "discover", &params, PRIORITY_NORMAL, 3).await.unwrap();

    ScrapeTask::lease_next(&ctx.pool).await.unwrap();
    let cancelled = ScrapeTask::cancel(&ctx.pool, id).await.unwrap();
    assert!(!cancelled, "an in-progress task should not be cancellable");

    ScrapeTask::mark_completed(&ctx.pool, id).await.unwrap();
    let cancelled_after_completion = ScrapeTask::cancel(&ctx.pool, id).await.unwrap();
    assert!(!cancelled_after_completion);
}

mod common;

use common::{fixtures, setup};
use std::sync::Arc;
use std::time::Duration;
use teelo_backend::models::match_row::RoundRank;
use teelo_backend::models::tournament::Tour;
use teelo_backend::services::identity::PlayerIdentityService;
use teelo_backend::services::pipeline::{run_pipeline, PipelineDeps, PipelineOptions};
use teelo_backend::services::scraping::NullScraper;
use teelo_backend::services::worker_events::WorkerEventBus;

fn base_options(include: Vec<String>) -> PipelineOptions {
    PipelineOptions {
        include: Some(include),
        skip: vec![],
        fail_fast: true,
        dry_run: false,
        worker_count: 1,
        discover_year: 2026,
        elo_batch_size: 100,
        elo_checkpoint_every_n_batches: 10,
        auto_merge_threshold: 0.95,
        advisory_lock_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn elo_incremental_stage_processes_pending_matches() {
    let ctx = setup::setup_test_db().await;
    fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();

    let winner = fixtures::create_player(&ctx.pool, "Coco Gauff").await.unwrap();
    let loser = fixtures::create_player(&ctx.pool, "Jessica Pegula").await.unwrap();
    let edition_id = fixtures::create_edition(&ctx.pool, "wta_finals", Tour::Wta, 2026).await.unwrap();
    fixtures::insert_completed_match(
        &ctx.pool, edition_id, Tour::Wta, 1, RoundRank::Final,
        winner.id, loser.id, winner.id,
        chrono::NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
    ).await.unwrap();

    let identity = Arc::new(PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85));
    let deps = PipelineDeps { scraper: Arc::new(NullScraper), identity, events: WorkerEventBus::new(16) };
    let options = base_options(vec!["elo_incremental".to_string()]);

    let run = run_pipeline(&ctx.pool, &deps, &options).await.unwrap();
    assert_eq!(run.status, "success");

    let stage_statuses: Vec<(String, String)> = sqlx::query_as(
        "SELECT stage_name, status FROM pipeline_stage_runs WHERE run_id = $1",
    )
    .bind(run.id)
    .fetch_all(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(stage_statuses, vec![("elo_incremental".to_string(), "success".to_string())]);

    let (processed,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM matches WHERE elo_processed_at IS NOT NULL",
    )
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(processed, 1);
}

#[tokio::test]
async fn elo_incremental_stage_fails_without_an_active_parameter_set() {
    let ctx = setup::setup_test_db().await;

    let identity = Arc::new(PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85));
    let deps = PipelineDeps { scraper: Arc::new(NullScraper), identity, events: WorkerEventBus::new(16) };
    let options = base_options(vec!["elo_incremental".to_string()]);

    let run = run_pipeline(&ctx.pool, &deps, &options).await.unwrap();
    assert_eq!(run.status, "failed", "no active elo parameter set should fail the stage, not the whole call");
}

#[tokio::test]
async fn dry_run_does_not_touch_the_scrape_queue() {
    let ctx = setup::setup_test_db().await;
    fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();

    let identity = Arc::new(PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85));
    let deps = PipelineDeps { scraper: Arc::new(NullScraper), identity, events: WorkerEventBus::new(16) };
    let mut options = base_options(vec!["current_events_ingest".to_string(), "elo_incremental".to_string()]);
    options.dry_run = true;

    let run = run_pipeline(&ctx.pool, &deps, &options).await.unwrap();
    assert_eq!(run.status, "success");

    let (queued,): (i64,) = sqlx::query_as("SELECT count(*) FROM scrape_queue")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(queued, 0, "dry run must not enqueue discovery tasks");
}

#[tokio::test]
async fn skip_excludes_a_default_stage() {
    let ctx = setup::setup_test_db().await;
    fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();

    let identity = Arc::new(PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85));
    let deps = PipelineDeps { scraper: Arc::new(NullScraper), identity, events: WorkerEventBus::new(16) };
    let mut options = base_options(vec![]);
    options.include = None;
    options.skip = vec!["current_events_ingest".to_string()];

    let run = run_pipeline(&ctx.pool, &deps, &options).await.unwrap();
    assert_eq!(run.status, "success");

    let ran_stages: Vec<(String,)> = sqlx::query_as("SELECT stage_name FROM pipeline_stage_runs WHERE run_id = $1")
        .bind(run.id)
        .fetch_all(&ctx.pool)
        .await
        .unwrap();
    let names: Vec<&str> = ran_stages.iter().map(|(n,)| n.as_str()).collect();
    assert!(!names.contains(&"current_events_ingest"));
    assert!(names.contains(&"elo_incremental"));
}

//! Worker pool: N tokio tasks, each leasing scrape-queue rows and driving a
//! scraper + the ingestion services against them. Mirrors the structure of
//! `ScrapeTask::lease_next`/`mark_completed`/`mark_failed` (§4.4) directly —
//! the loop here is the only caller of that trio outside tests.

use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::scrape_queue::ScrapeTask;
use crate::models::tournament::{Tour, Tournament, TournamentEdition};
use crate::services::identity::PlayerIdentityService;
use crate::services::ingestion::{draw, results, schedule};
use crate::services::scraping::Scraper;
use crate::services::worker_events::{WorkerEventBus, WorkerStatus, WorkerStatusEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// `task_params` shapes this worker recognizes, keyed by `scrape_queue.task_type`.
pub const TASK_DISCOVER: &str = "discover";
pub const TASK_SCRAPE_DRAW: &str = "scrape_draw";
pub const TASK_SCRAPE_FIXTURES: &str = "scrape_fixtures";
pub const TASK_SCRAPE_RESULTS: &str = "scrape_results";

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerPoolStats {
    pub tasks_completed: usize,
    pub tasks_failed: usize,
}

/// Runs `worker_count` concurrent lease-process-ack loops until the queue is
/// empty of ready work, then returns. A worker that finds no task idles
/// briefly and rechecks rather than exiting immediately, so a task enqueued
/// by a sibling worker's `discover` step is picked up without a restart.
#[instrument(skip(pool, scraper, identity, events))]
pub async fn run_worker_pool(
    pool: DbPool,
    scraper: Arc<dyn Scraper>,
    identity: Arc<PlayerIdentityService>,
    events: WorkerEventBus,
    worker_count: usize,
    idle_exit_after: Duration,
) -> Result<WorkerPoolStats> {
    let mut handles = Vec::with_capacity(worker_count);

    for worker_id in 0..worker_count {
        let pool = pool.clone();
        let scraper = scraper.clone();
        let identity = identity.clone();
        let events = events.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(worker_id, pool, scraper, identity, events, idle_exit_after).await
        }));
    }

    let mut stats = WorkerPoolStats::default();
    for handle in handles {
        let worker_stats = handle
            .await
            .map_err(|e| AppError::Internal(format!("worker task panicked: {e}")))??;
        stats.tasks_completed += worker_stats.tasks_completed;
        stats.tasks_failed += worker_stats.tasks_failed;
    }

    Ok(stats)
}

async fn worker_loop(
    worker_id: usize,
    pool: DbPool,
    scraper: Arc<dyn Scraper>,
    identity: Arc<PlayerIdentityService>,
    events: WorkerEventBus,
    idle_exit_after: Duration,
) -> Result<WorkerPoolStats> {
    let mut stats = WorkerPoolStats::default();
    let mut idle_since: Option<tokio::time::Instant> = None;

    loop {
        let Some(task) = ScrapeTask::lease_next(&pool).await? else {
            events.publish(WorkerStatusEvent { worker_id, status: WorkerStatus::Idle, task_id: None, detail: None });
            match idle_since {
                None => idle_since = Some(tokio::time::Instant::now()),
                Some(since) if since.elapsed() >= idle_exit_after => return Ok(stats),
                Some(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue;
        };
        idle_since = None;

        events.publish(WorkerStatusEvent { worker_id, status: WorkerStatus::Running, task_id: Some(task.id), detail: None });

        match process_task(&pool, scraper.as_ref(), &identity, &task).await {
            Ok(()) => {
                ScrapeTask::mark_completed(&pool, task.id).await?;
                events.publish(WorkerStatusEvent { worker_id, status: WorkerStatus::Done, task_id: Some(task.id), detail: None });
                stats.tasks_completed += 1;
            }
            Err(e) => {
                ScrapeTask::mark_failed(&pool, task.id, task.attempts, task.max_attempts, &e.to_string()).await?;
                events.publish(WorkerStatusEvent { worker_id, status: WorkerStatus::Failed, task_id: Some(task.id), detail: Some(e.to_string()) });
                stats.tasks_failed += 1;
            }
        }
    }
}

async fn process_task(
    pool: &DbPool,
    scraper: &dyn Scraper,
    identity: &PlayerIdentityService,
    task: &ScrapeTask,
) -> Result<()> {
    match task.task_type.as_str() {
        TASK_DISCOVER => process_discover(pool, scraper, task).await,
        TASK_SCRAPE_DRAW => process_scrape_draw(pool, scraper, identity, task).await,
        TASK_SCRAPE_FIXTURES => process_scrape_fixtures(pool, scraper, identity, task).await,
        TASK_SCRAPE_RESULTS => process_scrape_results(pool, scraper, identity, task).await,
        other => Err(AppError::InvalidInput(format!("unknown scrape task type {other:?}"))),
    }
}

async fn process_discover(pool: &DbPool, scraper: &dyn Scraper, task: &ScrapeTask) -> Result<()> {
    let tour: Tour = task_param_str(task, "tour")?.parse()?;
    let year = task_param_i64(task, "year")? as i32;

    let editions = scraper.discover(tour, year).await?;

    for discovered in editions {
        let tournament_code = slugify(&discovered.tournament_name);
        let tournament = Tournament::find_or_create(
            pool,
            &discovered.tournament_name,
            &tournament_code,
            tour,
            &discovered.level,
            discovered.surface.as_deref(),
            None,
            None,
        )
        .await?;

        let edition = TournamentEdition::upsert(
            pool,
            tournament.id,
            discovered.year,
            discovered.start_date,
            discovered.end_date,
            discovered.draw_size,
            discovered.surface.as_deref(),
            discovered.external_id.as_deref(),
        )
        .await?;

        let ordinal = edition_ordinal(&tournament_code);
        let params = serde_json::json!({ "edition_id": edition.id, "edition_ordinal": ordinal });

        for task_type in [TASK_SCRAPE_DRAW, TASK_SCRAPE_FIXTURES, TASK_SCRAPE_RESULTS] {
            ScrapeTask::enqueue(pool, task_type, &params, crate::models::scrape_queue::PRIORITY_NORMAL, 3).await?;
        }
    }

    Ok(())
}

async fn process_scrape_draw(pool: &DbPool, scraper: &dyn Scraper, identity: &PlayerIdentityService, task: &ScrapeTask) -> Result<()> {
    let (edition, ordinal) = load_edition(pool, task).await?;
    let entries = scraper.scrape_draw(&discovered_from_edition(pool, &edition).await?).await?;
    draw::ingest_draw(pool, identity, &entries, &edition, ordinal).await?;
    Ok(())
}

async fn process_scrape_fixtures(pool: &DbPool, scraper: &dyn Scraper, identity: &PlayerIdentityService, task: &ScrapeTask) -> Result<()> {
    let (edition, ordinal) = load_edition(pool, task).await?;
    let fixtures = scraper.scrape_fixtures(&discovered_from_edition(pool, &edition).await?).await?;
    schedule::ingest_schedule(pool, identity, &fixtures, &edition, ordinal).await?;
    Ok(())
}

async fn process_scrape_results(pool: &DbPool, scraper: &dyn Scraper, identity: &PlayerIdentityService, task: &ScrapeTask) -> Result<()> {
    let (edition, ordinal) = load_edition(pool, task).await?;
    let scraped = scraper.scrape_tournament_results(&discovered_from_edition(pool, &edition).await?).await?;
    results::ingest_results(pool, identity, &scraped, &edition, ordinal, true).await?;
    Ok(())
}

async fn load_edition(pool: &DbPool, task: &ScrapeTask) -> Result<(TournamentEdition, i64)> {
    let edition_id: uuid::Uuid = task_param_uuid(task, "edition_id")?;
    let ordinal = task_param_i64(task, "edition_ordinal")?;
    let edition = TournamentEdition::find_by_id(pool, edition_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tournament edition {edition_id}")))?;
    Ok((edition, ordinal))
}

/// Reconstructs the minimal `DiscoveredEdition` a `Scraper` call needs from a
/// persisted edition row, since the worker loop only carries the id across
/// the queue, not the full discovery payload.
async fn discovered_from_edition(pool: &DbPool, edition: &TournamentEdition) -> Result<crate::services::scraping::DiscoveredEdition> {
    let tournament = Tournament::find_by_id(pool, edition.tournament_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tournament {}", edition.tournament_id)))?;
    Ok(crate::services::scraping::DiscoveredEdition {
        tournament_name: tournament.name,
        tour: tournament.tour()?,
        year: edition.year,
        start_date: edition.start_date,
        end_date: edition.end_date,
        draw_size: edition.draw_size,
        surface: edition.surface.clone(),
        level: tournament.level,
        external_id: edition.external_id.clone(),
    })
}

fn task_param_str<'a>(task: &'a ScrapeTask, key: &str) -> Result<&'a str> {
    task.task_params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::InvalidInput(format!("task {} missing {key:?} param", task.id)))
}

fn task_param_i64(task: &ScrapeTask, key: &str) -> Result<i64> {
    task.task_params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| AppError::InvalidInput(format!("task {} missing {key:?} param", task.id)))
}

fn task_param_uuid(task: &ScrapeTask, key: &str) -> Result<uuid::Uuid> {
    task_param_str(task, key)?
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("task {} has malformed {key:?} param", task.id)))
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A stable small integer derived from the tournament code, used as the
/// `edition_ordinal` term in `temporal_order` (see `models::match_row`). Only
/// needs to be consistent for a given tournament, not globally unique.
fn edition_ordinal(tournament_code: &str) -> i64 {
    let mut hash: i64 = 0;
    for b in tournament_code.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(b as i64);
    }
    hash.rem_euclid(100)
}

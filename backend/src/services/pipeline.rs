//! Named-stage orchestrator. A `pipeline` run resolves an effective stage
//! list, takes the pipeline-wide advisory lock, and executes each stage in
//! order, persisting a `PipelineRun`/`PipelineStageRun` row per attempt so a
//! restarted process (or an operator looking at the database) can see
//! exactly what ran and how it went.

use crate::db::{with_advisory_lock, DbPool, LockKey};
use crate::error::{AppError, Result};
use crate::models::elo_parameter_set::EloParameterSet;
use crate::models::pipeline_run::{PipelineRun, PipelineStageRun};
use crate::models::scrape_queue::PRIORITY_NORMAL;
use crate::models::tournament::Tour;
use crate::services::elo::EloEngine;
use crate::services::identity::PlayerIdentityService;
use crate::services::maintenance;
use crate::services::scraping::Scraper;
use crate::services::worker::{self, TASK_DISCOVER};
use crate::services::worker_events::WorkerEventBus;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct StageSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub enabled_by_default: bool,
}

pub const STAGES: &[StageSpec] = &[
    StageSpec {
        name: "current_events_ingest",
        description: "discover current-year editions, drain the scrape queue, ingest draws/fixtures/results",
        enabled_by_default: true,
    },
    StageSpec {
        name: "elo_incremental",
        description: "run the incremental Elo engine over unprocessed matches, both rating pools",
        enabled_by_default: true,
    },
    StageSpec {
        name: "player_enrichment_incremental",
        description: "duplicate detection, auto-merge, and merge-alias recovery over the player graph",
        enabled_by_default: false,
    },
];

pub struct PipelineOptions {
    pub include: Option<Vec<String>>,
    pub skip: Vec<String>,
    pub fail_fast: bool,
    pub dry_run: bool,
    pub worker_count: usize,
    pub discover_year: i32,
    pub elo_batch_size: usize,
    pub elo_checkpoint_every_n_batches: usize,
    pub auto_merge_threshold: f64,
    pub advisory_lock_timeout: Duration,
}

pub struct PipelineDeps {
    pub scraper: Arc<dyn Scraper>,
    pub identity: Arc<PlayerIdentityService>,
    pub events: WorkerEventBus,
}

/// Runs the pipeline end to end, always returning the finalized
/// `PipelineRun` row (whose `status` reflects success/failure) rather than
/// an `Err` for a stage failure — only lock acquisition and persistence
/// errors propagate as `Err`, per the error-handling design: the
/// orchestrator surfaces stage status, not individual failures.
#[instrument(skip(pool, deps, options))]
pub async fn run_pipeline(pool: &DbPool, deps: &PipelineDeps, options: &PipelineOptions) -> Result<PipelineRun> {
    let effective_stages = resolve_stages(options);

    let run = PipelineRun::start(pool, "teelo_pipeline").await?;
    let lock_timeout = options.advisory_lock_timeout;

    let outcome = with_advisory_lock(pool, LockKey::Pipeline, lock_timeout, || async {
        run_stages(pool, deps, options, &effective_stages, run.id).await
    })
    .await;

    let (status, summary) = match outcome {
        Ok((true, summary)) => ("success", summary),
        Ok((false, summary)) => ("failed", summary),
        Err(AppError::LockAcquisitionTimeout { .. }) => {
            let summary = serde_json::json!({ "error": "could not acquire pipeline advisory lock" });
            PipelineRun::finish(pool, run.id, "failed", summary.clone()).await?;
            return Err(AppError::LockAcquisitionTimeout { stage: "pipeline".to_string() });
        }
        Err(e) => (
            "failed",
            serde_json::json!({ "error": e.to_string() }),
        ),
    };

    PipelineRun::finish(pool, run.id, status, summary.clone()).await?;
    Ok(PipelineRun {
        status: status.to_string(),
        finished_at: Some(chrono::Utc::now()),
        stats: Some(summary),
        ..run
    })
}

async fn run_stages(
    pool: &DbPool,
    deps: &PipelineDeps,
    options: &PipelineOptions,
    stages: &[&'static StageSpec],
    run_id: uuid::Uuid,
) -> Result<(bool, serde_json::Value)> {
    let mut stage_summaries = serde_json::Map::new();
    let mut any_failed = false;

    for stage in stages {
        let stage_run = PipelineStageRun::start(pool, run_id, stage.name).await?;

        let result = if options.dry_run {
            Ok(serde_json::json!({ "dry_run": true }))
        } else {
            match stage.name {
                "current_events_ingest" => run_current_events_ingest(pool, deps, options).await,
                "elo_incremental" => run_elo_incremental(pool, options).await,
                "player_enrichment_incremental" => run_player_enrichment(pool, deps, options).await,
                other => Err(AppError::Internal(format!("no runner registered for stage {other:?}"))),
            }
        };

        let (status, stats) = match result {
            Ok(stats) => ("success", stats),
            Err(e) => ("failed", serde_json::json!({ "error": e.to_string() })),
        };

        PipelineStageRun::finish(pool, stage_run.id, status, stats.clone()).await?;
        stage_summaries.insert(stage.name.to_string(), serde_json::json!({ "status": status, "stats": stats }));

        if status == "failed" {
            any_failed = true;
            if options.fail_fast {
                break;
            }
        }
    }

    Ok((!any_failed, serde_json::Value::Object(stage_summaries)))
}

fn resolve_stages(options: &PipelineOptions) -> Vec<&'static StageSpec> {
    STAGES
        .iter()
        .filter(|s| match &options.include {
            Some(include) => include.iter().any(|n| n == s.name),
            None => s.enabled_by_default,
        })
        .filter(|s| !options.skip.iter().any(|n| n == s.name))
        .collect()
}

async fn run_current_events_ingest(pool: &DbPool, deps: &PipelineDeps, options: &PipelineOptions) -> Result<serde_json::Value> {
    for tour in [Tour::Atp, Tour::Wta, Tour::Challenger, Tour::Wta125, Tour::ItfMen, Tour::ItfWomen] {
        let params = serde_json::json!({ "tour": tour.as_str(), "year": options.discover_year });
        crate::models::scrape_queue::ScrapeTask::enqueue(pool, TASK_DISCOVER, &params, PRIORITY_NORMAL, 3).await?;
    }

    let stats = worker::run_worker_pool(
        pool.clone(),
        deps.scraper.clone(),
        deps.identity.clone(),
        deps.events.clone(),
        options.worker_count.max(1),
        Duration::from_secs(2),
    )
    .await?;

    Ok(serde_json::to_value(stats).unwrap_or_default())
}

async fn run_elo_incremental(pool: &DbPool, options: &PipelineOptions) -> Result<serde_json::Value> {
    let active = EloParameterSet::active(pool)
        .await?
        .ok_or_else(|| AppError::FatalConfigError("no active elo_parameter_sets row".to_string()))?;
    let params = active.as_params()?;

    let engine = EloEngine::new(pool.clone(), params, active.name.clone());
    let men = engine.run_incremental(options.elo_batch_size, false, options.elo_checkpoint_every_n_batches).await?;
    let women = engine.run_incremental(options.elo_batch_size, true, options.elo_checkpoint_every_n_batches).await?;

    Ok(serde_json::json!({ "men": men, "women": women, "params_version": active.name }))
}

async fn run_player_enrichment(pool: &DbPool, _deps: &PipelineDeps, options: &PipelineOptions) -> Result<serde_json::Value> {
    let candidates = maintenance::find_duplicate_candidates(pool).await?;
    let identity = PlayerIdentityService::new(pool.clone(), 1.0, options.auto_merge_threshold);
    let merged = maintenance::auto_merge_duplicates(pool, &identity, options.auto_merge_threshold).await?;
    let recovered = maintenance::recover_missing_merge_aliases(pool, options.auto_merge_threshold).await?;

    Ok(serde_json::json!({
        "duplicate_candidates_found": candidates.len(),
        "duplicates_merged": merged,
        "merge_aliases_recovered": recovered,
    }))
}

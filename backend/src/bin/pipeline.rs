use chrono::Datelike;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teelo_backend::cli_support::{append_status_event, StageMetrics, StatusEvent};
use teelo_backend::config::Config;
use teelo_backend::db::create_pool;
use teelo_backend::error::{AppError, Result};
use teelo_backend::observability::{init_telemetry, shutdown_telemetry};
use teelo_backend::services::identity::PlayerIdentityService;
use teelo_backend::services::pipeline::{run_pipeline, PipelineDeps, PipelineOptions, STAGES};
use teelo_backend::services::scraping::NullScraper;
use teelo_backend::services::worker_events::WorkerEventBus;

#[derive(Parser)]
#[command(name = "pipeline", about = "Runs the full named-stage pipeline end to end")]
struct Cli {
    /// Comma-separated stage names to run, overriding each stage's default
    /// enabled/disabled state. Omit to run the default stage set.
    #[arg(long, value_delimiter = ',')]
    stages: Option<Vec<String>>,

    /// Comma-separated stage names to skip even if included by default or `--stages`.
    #[arg(long, value_delimiter = ',', default_value = "")]
    skip: Vec<String>,

    #[arg(long, default_value_t = true)]
    fail_fast: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value_t = 4)]
    worker_count: usize,

    #[arg(long)]
    discover_year: Option<i32>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    elo_checkpoint_every_n_batches: Option<usize>,

    #[arg(long)]
    auto_merge_threshold: Option<f64>,

    /// Accepted for CLI-surface parity; the pipeline run is keyed by its own
    /// `pipeline_runs`/`pipeline_stage_runs` rows rather than a single
    /// external cursor, so this has no effect.
    #[arg(long, default_value = "pipeline")]
    checkpoint_key: String,
    #[arg(long)]
    no_resume: bool,

    #[arg(long)]
    metrics_json: Option<PathBuf>,
    #[arg(long)]
    status_jsonl: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(AppError::FatalConfigError(msg)) => {
            eprintln!("configuration error: {msg}");
            2
        }
        Err(e) => {
            eprintln!("pipeline failed: {e}");
            1
        }
    };
    shutdown_telemetry();
    std::process::exit(code);
}

/// Returns `Ok(true)` when the pipeline run succeeded, `Ok(false)` when it
/// finished but at least one stage failed (distinct from an `Err`, which
/// means the run itself could not complete — lock timeout, DB error, etc).
async fn run(cli: Cli) -> Result<bool> {
    let config = Config::from_env()?;
    init_telemetry(&config.service_name, config.otlp_endpoint.as_deref())?;
    tracing::debug!(checkpoint_key = %cli.checkpoint_key, no_resume = cli.no_resume, "pipeline tracks progress via pipeline_runs, not an external checkpoint");

    if let Some(names) = &cli.stages {
        for name in names {
            if !STAGES.iter().any(|s| s.name == name) {
                return Err(AppError::InvalidInput(format!("unknown stage {name:?}")));
            }
        }
    }

    let pool = create_pool(&config.database_url, config.database_max_connections()).await?;
    let identity = Arc::new(PlayerIdentityService::new(
        pool.clone(),
        config.player_exact_match_threshold,
        config.player_suggestion_threshold,
    ));
    let scraper = Arc::new(NullScraper);
    let events = WorkerEventBus::new(256);

    let status_path = cli.status_jsonl.clone();
    let mut status_task = None;
    if let Some(path) = status_path {
        let mut rx = events.subscribe();
        status_task = Some(tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let _ = append_status_event(&path, &StatusEvent::WorkerStatus(event));
            }
        }));
    }

    let options = PipelineOptions {
        include: cli.stages.clone(),
        skip: cli.skip.clone(),
        fail_fast: cli.fail_fast,
        dry_run: cli.dry_run,
        worker_count: cli.worker_count,
        discover_year: cli.discover_year.unwrap_or_else(|| chrono::Utc::now().year()),
        elo_batch_size: cli.batch_size.unwrap_or(config.elo_batch_size),
        elo_checkpoint_every_n_batches: cli.elo_checkpoint_every_n_batches.unwrap_or(config.elo_checkpoint_every_n_batches),
        auto_merge_threshold: cli.auto_merge_threshold.unwrap_or(config.player_exact_match_threshold),
        advisory_lock_timeout: Duration::from_secs(config.advisory_lock_timeout_secs),
    };

    let deps = PipelineDeps { scraper, identity, events };

    if let Some(path) = &cli.status_jsonl {
        let stage_names: Vec<String> = STAGES
            .iter()
            .filter(|s| match &options.include {
                Some(include) => include.iter().any(|n| n == s.name),
                None => s.enabled_by_default,
            })
            .filter(|s| !options.skip.iter().any(|n| n == s.name))
            .map(|s| s.name.to_string())
            .collect();
        append_status_event(path, &StatusEvent::PipelineStarted { run_id: uuid::Uuid::nil(), stages: stage_names })?;
    }

    let started_at = chrono::Utc::now();
    let started = std::time::Instant::now();

    let run = run_pipeline(&pool, &deps, &options).await?;

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::StageFinished { stage: "pipeline".to_string(), status: run.status.clone() })?;
    }
    if let Some(task) = status_task {
        task.abort();
    }

    if let Some(path) = &cli.metrics_json {
        let metrics = StageMetrics {
            stage: "pipeline".to_string(),
            started_at,
            ended_at: chrono::Utc::now(),
            duration_s: started.elapsed().as_secs_f64(),
            status: run.status.clone(),
            processed: 0,
            updated: 0,
            skipped: 0,
            errors: if run.status == "success" { 0 } else { 1 },
            error_examples: vec![],
            batches: 0,
            checkpoint_in: None,
            checkpoint_out: run.stats.clone(),
        };
        metrics.write_to(path)?;
    }

    println!("pipeline run {} finished: {}", run.id, run.status);
    Ok(run.status == "success")
}

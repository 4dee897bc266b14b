use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teelo_backend::cli_support::{append_status_event, StageMetrics, StatusEvent};
use teelo_backend::config::Config;
use teelo_backend::db::create_pool;
use teelo_backend::error::{AppError, Result};
use teelo_backend::models::scrape_queue::ScrapeTask;
use teelo_backend::observability::{init_telemetry, shutdown_telemetry};
use teelo_backend::services::identity::PlayerIdentityService;
use teelo_backend::services::scraping::NullScraper;
use teelo_backend::services::worker::run_worker_pool;
use teelo_backend::services::worker_events::WorkerEventBus;

#[derive(Parser)]
#[command(name = "worker", about = "Drains the scrape queue with a pool of concurrent workers")]
struct Cli {
    /// Number of concurrent lease-process-ack loops.
    #[arg(long, default_value_t = 4)]
    worker_count: usize,

    /// Seconds a worker waits on an empty queue before exiting.
    #[arg(long, default_value_t = 10)]
    idle_exit_after_secs: u64,

    /// Accepted for CLI-surface parity with the other stage binaries; the
    /// worker pool has no batch-size knob of its own (it leases one task at
    /// a time per worker).
    #[arg(long, default_value_t = 0)]
    batch_size: usize,

    #[arg(long, default_value = "worker")]
    checkpoint_key: String,
    #[arg(long)]
    no_resume: bool,

    /// Reports how many tasks are ready to lease without running any.
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    metrics_json: Option<PathBuf>,
    #[arg(long)]
    status_jsonl: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(AppError::FatalConfigError(msg)) => {
            eprintln!("configuration error: {msg}");
            2
        }
        Err(e) => {
            eprintln!("worker failed: {e}");
            1
        }
    };
    shutdown_telemetry();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    init_telemetry(&config.service_name, config.otlp_endpoint.as_deref())?;
    tracing::debug!(
        checkpoint_key = %cli.checkpoint_key,
        no_resume = cli.no_resume,
        batch_size = cli.batch_size,
        "worker pool has no checkpoint/batch-size concept of its own; flags kept for CLI parity"
    );

    let pool = create_pool(&config.database_url, config.database_max_connections()).await?;

    if cli.dry_run {
        let ready = ScrapeTask::pending_count(&pool).await?;
        println!("dry run: {ready} scrape_queue tasks ready to lease");
        return Ok(());
    }

    let identity = Arc::new(PlayerIdentityService::new(
        pool.clone(),
        config.player_exact_match_threshold,
        config.player_suggestion_threshold,
    ));
    // No HTML-parsing scraper ships with this pipeline; operators wire in a
    // real implementation of `Scraper` when one exists. `NullScraper` lets
    // the queue-drain/ingestion machinery run (and be tested) end to end.
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

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskStarted { stage: "worker".to_string() })?;
    }

    let started_at = chrono::Utc::now();
    let started = Instant::now();
    let idle_exit_after = Duration::from_secs(cli.idle_exit_after_secs);

    let stats = run_worker_pool(pool, scraper, identity, events, cli.worker_count, idle_exit_after).await?;

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskFinished { stage: "worker".to_string(), status: "success".to_string() })?;
    }
    if let Some(task) = status_task {
        task.abort();
    }

    if let Some(path) = &cli.metrics_json {
        let metrics = StageMetrics {
            stage: "worker".to_string(),
            started_at,
            ended_at: chrono::Utc::now(),
            duration_s: started.elapsed().as_secs_f64(),
            status: "success".to_string(),
            processed: (stats.tasks_completed + stats.tasks_failed) as u64,
            updated: stats.tasks_completed as u64,
            skipped: 0,
            errors: stats.tasks_failed as u64,
            error_examples: vec![],
            batches: 0,
            checkpoint_in: None,
            checkpoint_out: None,
        };
        metrics.write_to(path)?;
    }

    println!("worker done: {} completed, {} failed", stats.tasks_completed, stats.tasks_failed);
    Ok(())
}

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use teelo_backend::cli_support::{append_status_event, StageMetrics, StatusEvent};
use teelo_backend::config::Config;
use teelo_backend::db::{create_pool, with_advisory_lock, LockKey};
use teelo_backend::error::{AppError, Result};
use teelo_backend::models::elo_parameter_set::EloParameterSet;
use teelo_backend::models::pipeline_run::PipelineCheckpoint;
use teelo_backend::observability::{init_telemetry, shutdown_telemetry};
use teelo_backend::services::elo::EloEngine;

#[derive(Parser)]
#[command(name = "elo-incremental", about = "Runs the incremental Elo engine over unprocessed matches")]
struct Cli {
    /// Matches fetched per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop after this many batches per rating pool (0 = unbounded).
    #[arg(long, default_value_t = 0)]
    max_batches: usize,

    /// Checkpoint key prefix override (defaults to `elo_incremental`).
    #[arg(long, default_value = "elo_incremental")]
    checkpoint_key: String,

    /// Reset the checkpoint cursor before running instead of continuing from it.
    #[arg(long)]
    no_resume: bool,

    /// Report what would run without writing anything.
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
            eprintln!("elo-incremental failed: {e}");
            1
        }
    };
    shutdown_telemetry();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    init_telemetry(&config.service_name, config.otlp_endpoint.as_deref())?;

    let pool = create_pool(&config.database_url, config.database_max_connections()).await?;
    let batch_size = cli.batch_size.unwrap_or(config.elo_batch_size);
    let resume = !cli.no_resume;
    let started_at = chrono::Utc::now();
    let started = Instant::now();
    tracing::debug!(checkpoint_key = %cli.checkpoint_key, "elo-incremental checkpoint key override (informational)");

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskStarted { stage: "elo_incremental".to_string() })?;
    }

    // The engine checkpoints per rating pool under its own fixed keys
    // (`elo_incremental:men`/`elo_incremental:women`); `--checkpoint-key` is
    // accepted for CLI-surface consistency with the other stage binaries but
    // doesn't redirect where the engine itself persists its cursor.
    let men_checkpoint_key = "elo_incremental:men";
    let women_checkpoint_key = "elo_incremental:women";
    let checkpoint_in = serde_json::json!({
        "men": PipelineCheckpoint::get(&pool, men_checkpoint_key).await?.and_then(|c| c.cursor),
        "women": PipelineCheckpoint::get(&pool, women_checkpoint_key).await?.and_then(|c| c.cursor),
    });
    if !resume {
        PipelineCheckpoint::save(&pool, men_checkpoint_key, serde_json::json!({ "reset": true })).await?;
        PipelineCheckpoint::save(&pool, women_checkpoint_key, serde_json::json!({ "reset": true })).await?;
    }

    if cli.dry_run {
        let men_pending = teelo_backend::models::match_row::Match::pending_elo_count(&pool, false).await?;
        let women_pending = teelo_backend::models::match_row::Match::pending_elo_count(&pool, true).await?;
        println!("dry run: {men_pending} men's matches and {women_pending} women's matches pending Elo processing");
        return Ok(());
    }

    let active = EloParameterSet::active(&pool)
        .await?
        .ok_or_else(|| AppError::FatalConfigError("no active elo_parameter_sets row".to_string()))?;
    let params = active.as_params()?;

    let lock_timeout = std::time::Duration::from_secs(config.advisory_lock_timeout_secs);
    let (men_stats, women_stats) = with_advisory_lock(&pool, LockKey::EloIncremental, lock_timeout, || async {
        let engine = EloEngine::new(pool.clone(), params, active.name.clone());
        let checkpoint_every = if cli.max_batches == 0 {
            config.elo_checkpoint_every_n_batches
        } else {
            cli.max_batches.min(config.elo_checkpoint_every_n_batches)
        };
        let men = engine.run_incremental(batch_size, false, checkpoint_every).await?;
        let women = engine.run_incremental(batch_size, true, checkpoint_every).await?;
        Ok((men, women))
    })
    .await?;

    let checkpoint_out = serde_json::json!({
        "men": PipelineCheckpoint::get(&pool, men_checkpoint_key).await?.and_then(|c| c.cursor),
        "women": PipelineCheckpoint::get(&pool, women_checkpoint_key).await?.and_then(|c| c.cursor),
    });

    if let Some(path) = &cli.metrics_json {
        let ended_at = chrono::Utc::now();
        let metrics = StageMetrics {
            stage: "elo_incremental".to_string(),
            started_at,
            ended_at,
            duration_s: started.elapsed().as_secs_f64(),
            status: "success".to_string(),
            processed: (men_stats.matches_processed + women_stats.matches_processed) as u64,
            updated: 0,
            skipped: (men_stats.backfills_detected + women_stats.backfills_detected) as u64,
            errors: 0,
            error_examples: vec![],
            batches: (men_stats.batches_run + women_stats.batches_run) as u64,
            checkpoint_in: Some(checkpoint_in),
            checkpoint_out: Some(checkpoint_out),
        };
        metrics.write_to(path)?;
    }

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskFinished { stage: "elo_incremental".to_string(), status: "success".to_string() })?;
    }

    println!(
        "elo-incremental done: {} men's matches, {} women's matches, {} backfills detected",
        men_stats.matches_processed, women_stats.matches_processed,
        men_stats.backfills_detected + women_stats.backfills_detected,
    );

    Ok(())
}

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use teelo_backend::cli_support::{append_status_event, StageMetrics, StatusEvent};
use teelo_backend::config::Config;
use teelo_backend::db::{create_pool, with_advisory_lock, LockKey};
use teelo_backend::error::{AppError, Result};
use teelo_backend::models::elo_parameter_set::EloParameterSet;
use teelo_backend::observability::{init_telemetry, shutdown_telemetry};
use teelo_backend::services::elo::EloEngine;

#[derive(Parser)]
#[command(name = "elo-rebuild", about = "Wipes and replays Elo state for one or both rating pools from scratch")]
struct Cli {
    /// `men`, `women`, or `both` (default).
    #[arg(long, default_value = "both")]
    pool: String,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Accepted for CLI-surface parity with the other stage binaries; a
    /// rebuild has no cap semantics of its own (it always replays to
    /// completion).
    #[arg(long, default_value_t = 0)]
    max_batches: usize,

    #[arg(long, default_value = "elo_rebuild")]
    checkpoint_key: String,

    /// A rebuild always starts from scratch; this flag exists only so the
    /// CLI surface matches the other stage binaries and must be passed
    /// explicitly to acknowledge that.
    #[arg(long)]
    no_resume: bool,

    /// Reports how many matches would be wiped and replayed without doing it.
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
            eprintln!("elo-rebuild failed: {e}");
            1
        }
    };
    shutdown_telemetry();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    init_telemetry(&config.service_name, config.otlp_endpoint.as_deref())?;

    let (rebuild_men, rebuild_women) = match cli.pool.as_str() {
        "men" => (true, false),
        "women" => (false, true),
        "both" => (true, true),
        other => return Err(AppError::InvalidInput(format!("--pool must be men, women, or both, got {other:?}"))),
    };

    let pool = create_pool(&config.database_url, config.database_max_connections()).await?;
    let batch_size = cli.batch_size.unwrap_or(config.elo_batch_size);
    tracing::debug!(checkpoint_key = %cli.checkpoint_key, no_resume = cli.no_resume, "elo-rebuild always replays from scratch");

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskStarted { stage: "elo_rebuild".to_string() })?;
    }

    if cli.dry_run {
        let men_pending = if rebuild_men { teelo_backend::models::elo_state::PlayerEloState::count(&pool, false).await? } else { 0 };
        let women_pending = if rebuild_women { teelo_backend::models::elo_state::PlayerEloState::count(&pool, true).await? } else { 0 };
        println!("dry run: would wipe and replay {men_pending} men's and {women_pending} women's player_elo_state rows");
        return Ok(());
    }

    let active = EloParameterSet::active(&pool)
        .await?
        .ok_or_else(|| AppError::FatalConfigError("no active elo_parameter_sets row".to_string()))?;
    let params = active.as_params()?;

    let started_at = chrono::Utc::now();
    let started = Instant::now();
    let lock_timeout = std::time::Duration::from_secs(config.advisory_lock_timeout_secs);

    let (men_stats, women_stats) = with_advisory_lock(&pool, LockKey::EloRebuild, lock_timeout, || async {
        let engine = EloEngine::new(pool.clone(), params, active.name.clone());
        let men = if rebuild_men { Some(engine.rebuild_full(false, batch_size).await?) } else { None };
        let women = if rebuild_women { Some(engine.rebuild_full(true, batch_size).await?) } else { None };
        Ok((men, women))
    })
    .await?;

    if let Some(path) = &cli.metrics_json {
        let processed = men_stats.as_ref().map(|s| s.matches_processed).unwrap_or(0)
            + women_stats.as_ref().map(|s| s.matches_processed).unwrap_or(0);
        let batches = men_stats.as_ref().map(|s| s.batches_run).unwrap_or(0)
            + women_stats.as_ref().map(|s| s.batches_run).unwrap_or(0);
        let metrics = StageMetrics {
            stage: "elo_rebuild".to_string(),
            started_at,
            ended_at: chrono::Utc::now(),
            duration_s: started.elapsed().as_secs_f64(),
            status: "success".to_string(),
            processed: processed as u64,
            updated: 0,
            skipped: 0,
            errors: 0,
            error_examples: vec![],
            batches: batches as u64,
            checkpoint_in: None,
            checkpoint_out: None,
        };
        metrics.write_to(path)?;
    }

    if let Some(path) = &cli.status_jsonl {
        append_status_event(path, &StatusEvent::TaskFinished { stage: "elo_rebuild".to_string(), status: "success".to_string() })?;
    }

    println!("elo-rebuild done: pool={} men={:?} women={:?}", cli.pool, men_stats.map(|s| s.matches_processed), women_stats.map(|s| s.matches_processed));
    Ok(())
}

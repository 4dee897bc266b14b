use crate::error::{AppError, Result};
use std::env;
use std::time::Duration;

/// Process-wide configuration, loaded once at startup from the environment
/// (and a `.env` file in the working directory, if present).
///
/// There is no remote secret store here: every pipeline binary is a plain
/// operator-run process, so `std::env` plus `dotenv` is the whole story.
#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub database_url: String,
    pub db_pool_size: u32,
    pub db_max_overflow: u32,

    pub scrape_headless: bool,
    pub scrape_virtual_display: bool,
    pub scrape_timeout: Duration,
    pub scrape_delay_min: Duration,
    pub scrape_delay_max: Duration,
    pub scrape_max_retries: u32,

    pub player_exact_match_threshold: f64,
    pub player_suggestion_threshold: f64,

    pub log_level: String,
    pub log_format: LogFormat,
    pub otlp_endpoint: Option<String>,

    pub advisory_lock_timeout_secs: u64,
    pub elo_batch_size: usize,
    pub elo_checkpoint_every_n_batches: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url = required_env("DATABASE_URL")?;

        let player_exact_match_threshold = env_f64("PLAYER_EXACT_MATCH_THRESHOLD", 0.98)?;
        let player_suggestion_threshold = env_f64("PLAYER_SUGGESTION_THRESHOLD", 0.85)?;
        if !(0.0..=1.0).contains(&player_exact_match_threshold)
            || !(0.0..=1.0).contains(&player_suggestion_threshold)
            || player_suggestion_threshold > player_exact_match_threshold
        {
            return Err(AppError::FatalConfigError(
                "PLAYER_SUGGESTION_THRESHOLD must be <= PLAYER_EXACT_MATCH_THRESHOLD, both in [0,1]"
                    .to_string(),
            ));
        }

        let log_format = match env_string("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(AppError::FatalConfigError(format!(
                    "LOG_FORMAT must be 'pretty' or 'json', got {other:?}"
                )));
            }
        };

        Ok(Self {
            service_name: env_string("SERVICE_NAME", "teelo-pipeline"),
            database_url,
            db_pool_size: env_u32("DB_POOL_SIZE", 10)?,
            db_max_overflow: env_u32("DB_MAX_OVERFLOW", 5)?,

            scrape_headless: env_bool("SCRAPE_HEADLESS", true)?,
            scrape_virtual_display: env_bool("SCRAPE_VIRTUAL_DISPLAY", false)?,
            scrape_timeout: Duration::from_secs(env_u64("SCRAPE_TIMEOUT_SECS", 30)?),
            scrape_delay_min: Duration::from_millis(env_u64("SCRAPE_DELAY_MIN_MS", 500)?),
            scrape_delay_max: Duration::from_millis(env_u64("SCRAPE_DELAY_MAX_MS", 2000)?),
            scrape_max_retries: env_u32("SCRAPE_MAX_RETRIES", 3)?,

            player_exact_match_threshold,
            player_suggestion_threshold,

            log_level: env_string("LOG_LEVEL", "info"),
            log_format,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),

            advisory_lock_timeout_secs: env_u64("ADVISORY_LOCK_TIMEOUT_SECS", 30)?,
            elo_batch_size: env_u64("ELO_BATCH_SIZE", 500)? as usize,
            elo_checkpoint_every_n_batches: env_u64("ELO_CHECKPOINT_EVERY_N_BATCHES", 10)? as usize,
        })
    }

    pub fn database_max_connections(&self) -> u32 {
        self.db_pool_size + self.db_max_overflow
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| {
        AppError::FatalConfigError(format!("{key} must be set (env var or .env entry)"))
    })
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(AppError::FatalConfigError(format!(
                "{key} must be a boolean, got {v:?}"
            ))),
        },
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::FatalConfigError(format!("{key} must be a u32, got {v:?}"))),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::FatalConfigError(format!("{key} must be a u64, got {v:?}"))),
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::FatalConfigError(format!("{key} must be a float, got {v:?}"))),
    }
}

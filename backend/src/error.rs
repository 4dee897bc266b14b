use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// A scraped or ingested value could not be parsed (score grammar, date, name token).
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Identity resolution could not place a scraped name with sufficient confidence and
    /// no external id was available to auto-create the player.
    #[error("Player not resolved: name={name:?} source={source:?}")]
    PlayerNotResolved { name: String, source: String },

    /// A pipeline stage could not acquire its advisory lock within the configured timeout,
    /// meaning another process already holds it.
    #[error("Timed out waiting for advisory lock on stage {stage:?}")]
    LockAcquisitionTimeout { stage: String },

    /// A data invariant the pipeline depends on (temporal ordering, unique external ids,
    /// zero-sum rating deltas) was violated.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// Configuration is missing or malformed badly enough that the process cannot start.
    #[error("Configuration error: {0}")]
    FatalConfigError(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

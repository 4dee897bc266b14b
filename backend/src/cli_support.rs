//! Shared shape for the metrics/status artifacts every stage binary writes,
//! per the CLI surface all four share: `--metrics-json PATH` and
//! `--status-jsonl PATH`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_s: f64,
    pub status: String,
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub error_examples: Vec<String>,
    pub batches: u64,
    pub checkpoint_in: Option<serde_json::Value>,
    pub checkpoint_out: Option<serde_json::Value>,
}

impl StageMetrics {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum StatusEvent {
    #[serde(rename = "pipeline_started")]
    PipelineStarted { run_id: uuid::Uuid, stages: Vec<String> },
    #[serde(rename = "stage_finished")]
    StageFinished { stage: String, status: String },
    #[serde(rename = "task_started")]
    TaskStarted { stage: String },
    #[serde(rename = "task_finished")]
    TaskFinished { stage: String, status: String },
    #[serde(rename = "worker_status")]
    WorkerStatus(crate::services::worker_events::WorkerStatusEvent),
}

/// Appends one newline-delimited JSON event, with an ISO-8601 timestamp
/// alongside the event payload. Opens and closes the file per call rather
/// than holding a handle open across a long-running stage, since events are
/// infrequent relative to a stage's duration.
pub fn append_status_event(path: &Path, event: &StatusEvent) -> Result<()> {
    let mut value = serde_json::to_value(event).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("timestamp".to_string(), serde_json::to_value(Utc::now()).unwrap());
    }
    let line = serde_json::to_string(&value).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn exit_code_for(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(crate::error::AppError::FatalConfigError(_)) => 2,
        Err(_) => 1,
    }
}

//! In-process pub/sub for worker pool status, consumed by the pipeline
//! orchestrator's status reporting (`--status-jsonl`) and available to any
//! other in-process observer. Workers are always run within a single
//! process in this pipeline, so this stays a `tokio::sync::broadcast`
//! channel rather than a cross-process relay over Postgres LISTEN/NOTIFY.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatusEvent {
    pub worker_id: usize,
    pub status: WorkerStatus,
    pub task_id: Option<i64>,
    pub detail: Option<String>,
}

/// Holds the broadcast sender; every worker and every consumer clones a
/// handle to the same bus. Lagging receivers silently drop the oldest
/// events rather than blocking a worker — status is best-effort, not a
/// durable log (the pipeline's checkpoint/run tables are that).
#[derive(Clone)]
pub struct WorkerEventBus {
    sender: broadcast::Sender<WorkerStatusEvent>,
}

impl WorkerEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: WorkerStatusEvent) {
        // No receivers is the common case outside a `--status-jsonl` run;
        // a send error there is expected and not worth surfacing.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerStatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for WorkerEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

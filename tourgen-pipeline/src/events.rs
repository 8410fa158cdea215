//! Pipeline progress events
//!
//! Sent best-effort over an mpsc channel; a full or closed channel drops the
//! event and never slows the pipeline down.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::SourceId;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Aggregate,
    Verify,
    Generate,
    Anchor,
}

/// Outcome of one fact source in one aggregation round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded { facts: usize },
    Empty,
    Failed { error: String },
    /// Still pending when the aggregation budget ran out
    Abandoned,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    StageStarted {
        run_id: Uuid,
        stage: Stage,
    },
    StageCompleted {
        run_id: Uuid,
        stage: Stage,
        elapsed_ms: u64,
    },
    SourceOutcome {
        run_id: Uuid,
        source: SourceId,
        #[serde(flatten)]
        status: SourceStatus,
        elapsed_ms: u64,
    },
    Warning {
        run_id: Uuid,
        message: String,
    },
}

/// Optional event sink handed to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!("Pipeline event dropped: {}", e);
            }
        }
    }
}

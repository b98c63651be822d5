use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::SharedState;

/// Final status of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed { stage: String, reason: String },
    Cancelled,
}

impl RunStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Done)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An analyst stage errored; its report stays empty.
    AnalystFailure,
    /// A voice errored; the round was discarded.
    DebateVoiceFailure,
    /// No routing rule matched; defaults were applied.
    RouterUnclassifiable,
    /// Memory retrieval failed; an empty result was used.
    MemoryUnavailable,
    /// A mandatory sequential stage failed.
    StageFailure,
}

/// A failure recorded against a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: &str, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Everything a caller can inspect after a run, whatever its status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub state: SharedState,
    pub failures: Vec<StageFailure>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &StageFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}

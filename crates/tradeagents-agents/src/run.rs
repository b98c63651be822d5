use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tradeagents_models::{RunConfig, RunOutcome};
use uuid::Uuid;

use crate::error::AgentError;
use crate::orchestrator::LayerOrchestrator;

/// A run executing on the tokio runtime.
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, AgentError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation. Takes effect at the next layer or round boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the run's token, for cancelling from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunOutcome, AgentError> {
        self.task
            .await
            .map_err(|e| AgentError::stage("run", format!("run task failed: {e}")))?
    }
}

impl LayerOrchestrator {
    /// Spawn a run and return immediately.
    pub fn start_run(
        self: &Arc<Self>,
        instrument_id: &str,
        as_of_date: NaiveDate,
        config: RunConfig,
    ) -> RunHandle {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(self);
        let instrument_id = instrument_id.to_string();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            orchestrator
                .execute(run_id, &instrument_id, as_of_date, &config, &token)
                .await
        });

        RunHandle {
            run_id,
            cancel,
            task,
        }
    }
}

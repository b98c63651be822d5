use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::AgentError;

/// One call to the LLM on behalf of a stage.
#[derive(Debug, Clone, Copy)]
pub struct LlmRequest<'a> {
    /// Stage or role making the call; used in logs and errors.
    pub stage: &'a str,
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

/// The seam to the external LLM collaborator. Prompt construction stays in
/// the stages; model selection is passed through.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(&self, request: LlmRequest<'_>) -> Result<String, AgentError>;
}

/// Invokes the `claude` CLI in print mode, one process per call.
pub struct ClaudeCliInvoker {
    timeout: Duration,
}

impl ClaudeCliInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// True when `claude --version` runs and exits cleanly.
    pub async fn is_available() -> bool {
        match Command::new("claude").arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LlmInvoker for ClaudeCliInvoker {
    async fn invoke(&self, request: LlmRequest<'_>) -> Result<String, AgentError> {
        let LlmRequest {
            stage,
            model,
            system_prompt,
            user_prompt,
        } = request;
        debug!(stage, model, prompt_len = user_prompt.len(), "Invoking claude CLI");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("claude")
                .args([
                    "-p",
                    user_prompt,
                    "--system-prompt",
                    system_prompt,
                    "--model",
                    model,
                    "--output-format",
                    "text",
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AgentError::Timeout {
            stage: stage.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        })?
        .map_err(|e| AgentError::Cli(format!("{stage}: could not spawn claude: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stage, model, status = %output.status, stderr = %stderr, "Claude CLI failed");
            return Err(AgentError::Cli(format!(
                "{stage}: claude ({model}) exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(AgentError::Cli(format!(
                "{stage}: claude ({model}) returned an empty response"
            )));
        }
        Ok(stdout)
    }
}

/// Bounds the number of outstanding calls to an inner invoker.
///
/// One `GatedInvoker` is shared by every run so the LLM limit is global.
pub struct GatedInvoker {
    inner: Arc<dyn LlmInvoker>,
    permits: Arc<Semaphore>,
}

impl GatedInvoker {
    pub fn new(inner: Arc<dyn LlmInvoker>, limit: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl LlmInvoker for GatedInvoker {
    async fn invoke(&self, request: LlmRequest<'_>) -> Result<String, AgentError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AgentError::Cli(format!("LLM gate closed: {e}")))?;
        debug!(
            stage = request.stage,
            available = self.permits.available_permits(),
            "LLM permit acquired"
        );
        self.inner.invoke(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the peak number of concurrent calls.
    struct SlowInvoker {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmInvoker for SlowInvoker {
        async fn invoke(&self, request: LlmRequest<'_>) -> Result<String, AgentError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(request.user_prompt.to_string())
        }
    }

    #[tokio::test]
    async fn gate_bounds_concurrency() {
        let slow = Arc::new(SlowInvoker {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gated = Arc::new(GatedInvoker::new(slow.clone(), 2));

        let mut handles = Vec::new();
        for i in 0..6 {
            let gated = Arc::clone(&gated);
            handles.push(tokio::spawn(async move {
                let user = format!("call {i}");
                gated
                    .invoke(LlmRequest {
                        stage: "bull",
                        model: "m",
                        system_prompt: "sys",
                        user_prompt: &user,
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gated.available_permits(), 2);
    }

    #[test]
    fn zero_limit_still_admits_one_call() {
        let slow = Arc::new(SlowInvoker {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gated = GatedInvoker::new(slow, 0);
        assert_eq!(gated.available_permits(), 1);
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tradeagents_models::{ReportKind, StateView};

use crate::error::AgentError;

/// Well-known role names for the non-analyst stages.
pub mod roles {
    pub const BULL: &str = "bull";
    pub const BEAR: &str = "bear";
    pub const RESEARCH_JUDGE: &str = "research_judge";
    pub const RESEARCH_MANAGER: &str = "research_manager";
    pub const TRADER: &str = "trader";
    pub const AGGRESSIVE: &str = "aggressive";
    pub const NEUTRAL: &str = "neutral";
    pub const CONSERVATIVE: &str = "conservative";
    pub const RISK_JUDGE: &str = "risk_judge";
    pub const RISK_MANAGER: &str = "risk_manager";
}

/// Await a stage call under `timeout`; expiry becomes `AgentError::Timeout`.
pub async fn timed<T>(
    stage: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
        Err(AgentError::Timeout {
            stage: stage.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    })
}

/// An Analysis-layer stage. Owns exactly one report field.
#[async_trait]
pub trait AnalystStage: Send + Sync {
    fn name(&self) -> &str;
    fn report(&self) -> ReportKind;

    async fn analyze(&self, view: &StateView) -> Result<String, AgentError>;
}

/// One debate participant. Produces a single turn per round.
#[async_trait]
pub trait DebateVoice: Send + Sync {
    fn name(&self) -> &str;

    async fn speak(&self, view: &StateView) -> Result<String, AgentError>;
}

/// Inspects debate history and decides or defers.
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    /// Render a decision, or `None` to let the debate continue.
    async fn evaluate(&self, view: &StateView) -> Result<Option<String>, AgentError>;

    /// Decide unconditionally. Called once the round ceiling is reached.
    async fn force(&self, view: &StateView) -> Result<String, AgentError>;
}

/// Produces a plan or decision from everything visible in the view
/// (research manager, trader, risk manager).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, view: &StateView) -> Result<String, AgentError>;
}

/// A registered stage, tagged by kind.
#[derive(Clone)]
pub enum StageKind {
    Analyst(Arc<dyn AnalystStage>),
    Voice(Arc<dyn DebateVoice>),
    Judge(Arc<dyn Judge>),
    Synthesizer(Arc<dyn Synthesizer>),
}

impl StageKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StageKind::Analyst(_) => "analyst",
            StageKind::Voice(_) => "voice",
            StageKind::Judge(_) => "judge",
            StageKind::Synthesizer(_) => "synthesizer",
        }
    }
}

/// Role name → stage. Adding an analyst is one `register` call; the
/// orchestrator's control flow does not change.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<String, StageKind>,
    /// Analyst registration order; the order reports are merged in.
    analyst_order: Vec<String>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under a role name, replacing any previous entry.
    pub fn register(&mut self, role: &str, stage: StageKind) -> &mut Self {
        if matches!(stage, StageKind::Analyst(_)) {
            if !self.analyst_order.iter().any(|r| r == role) {
                self.analyst_order.push(role.to_string());
            }
        } else {
            self.analyst_order.retain(|r| r != role);
        }
        self.stages.insert(role.to_string(), stage);
        self
    }

    pub fn analyst(&mut self, stage: Arc<dyn AnalystStage>) -> &mut Self {
        let role = stage.name().to_string();
        self.register(&role, StageKind::Analyst(stage))
    }

    pub fn voice(&mut self, role: &str, stage: Arc<dyn DebateVoice>) -> &mut Self {
        self.register(role, StageKind::Voice(stage))
    }

    pub fn judge(&mut self, role: &str, stage: Arc<dyn Judge>) -> &mut Self {
        self.register(role, StageKind::Judge(stage))
    }

    pub fn synthesizer(&mut self, role: &str, stage: Arc<dyn Synthesizer>) -> &mut Self {
        self.register(role, StageKind::Synthesizer(stage))
    }

    pub fn get(&self, role: &str) -> Option<&StageKind> {
        self.stages.get(role)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Registered analysts in registration order.
    pub fn analysts(&self) -> Vec<Arc<dyn AnalystStage>> {
        self.analyst_order
            .iter()
            .filter_map(|role| match self.stages.get(role) {
                Some(StageKind::Analyst(stage)) => Some(Arc::clone(stage)),
                _ => None,
            })
            .collect()
    }

    pub fn require_voice(&self, role: &str) -> Result<Arc<dyn DebateVoice>, AgentError> {
        match self.stages.get(role) {
            Some(StageKind::Voice(stage)) => Ok(Arc::clone(stage)),
            _ => Err(AgentError::MissingStage(format!("{role} (voice)"))),
        }
    }

    pub fn require_judge(&self, role: &str) -> Result<Arc<dyn Judge>, AgentError> {
        match self.stages.get(role) {
            Some(StageKind::Judge(stage)) => Ok(Arc::clone(stage)),
            _ => Err(AgentError::MissingStage(format!("{role} (judge)"))),
        }
    }

    pub fn require_synthesizer(&self, role: &str) -> Result<Arc<dyn Synthesizer>, AgentError> {
        match self.stages.get(role) {
            Some(StageKind::Synthesizer(stage)) => Ok(Arc::clone(stage)),
            _ => Err(AgentError::MissingStage(format!("{role} (synthesizer)"))),
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tradeagents_models::{AgentsConfig, DebateKind, ReportKind, StateView};

use crate::error::AgentError;
use crate::invoker::{LlmInvoker, LlmRequest};
use crate::parser::parse_verdict;
use crate::prompts::{
    analyst_system_prompt, judge_system_prompt, render_view, synthesizer_system_prompt,
    voice_system_prompt,
};
use crate::stage::{roles, AnalystStage, DebateVoice, Judge, StageRegistry, Synthesizer};

fn require_text(stage: &str, raw: String) -> Result<String, AgentError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AgentError::stage(stage, "empty response"));
    }
    Ok(text.to_string())
}

/// An analyst that asks the LLM for one report.
pub struct LlmAnalyst {
    name: String,
    report: ReportKind,
    model: String,
    invoker: Arc<dyn LlmInvoker>,
}

impl LlmAnalyst {
    pub fn new(name: &str, report: ReportKind, model: &str, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            name: name.to_string(),
            report,
            model: model.to_string(),
            invoker,
        }
    }
}

#[async_trait]
impl AnalystStage for LlmAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn report(&self) -> ReportKind {
        self.report
    }

    async fn analyze(&self, view: &StateView) -> Result<String, AgentError> {
        let system = analyst_system_prompt(self.report, &view.market);
        let user = render_view(view);
        let raw = self
            .invoker
            .invoke(LlmRequest {
                stage: &self.name,
                model: &self.model,
                system_prompt: &system,
                user_prompt: &user,
            })
            .await?;
        require_text(&self.name, raw)
    }
}

pub struct LlmVoice {
    role: String,
    model: String,
    invoker: Arc<dyn LlmInvoker>,
}

impl LlmVoice {
    pub fn new(role: &str, model: &str, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            role: role.to_string(),
            model: model.to_string(),
            invoker,
        }
    }
}

#[async_trait]
impl DebateVoice for LlmVoice {
    fn name(&self) -> &str {
        &self.role
    }

    async fn speak(&self, view: &StateView) -> Result<String, AgentError> {
        let system = voice_system_prompt(&self.role, &view.market);
        let user = render_view(view);
        let raw = self
            .invoker
            .invoke(LlmRequest {
                stage: &self.role,
                model: &self.model,
                system_prompt: &system,
                user_prompt: &user,
            })
            .await?;
        require_text(&self.role, raw)
    }
}

/// Judge answering with a `{"decision": ...}` JSON verdict.
pub struct LlmJudge {
    role: String,
    kind: DebateKind,
    model: String,
    invoker: Arc<dyn LlmInvoker>,
}

impl LlmJudge {
    pub fn new(role: &str, kind: DebateKind, model: &str, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            role: role.to_string(),
            kind,
            model: model.to_string(),
            invoker,
        }
    }

    async fn ask(&self, view: &StateView, forced: bool) -> Result<Option<String>, AgentError> {
        let system = judge_system_prompt(self.kind, forced, &view.market);
        let user = render_view(view);
        let raw = self
            .invoker
            .invoke(LlmRequest {
                stage: &self.role,
                model: &self.model,
                system_prompt: &system,
                user_prompt: &user,
            })
            .await?;
        let verdict = parse_verdict(&raw)?;
        debug!(judge = %self.role, forced, decided = verdict.is_some(), "Judge verdict parsed");
        Ok(verdict)
    }
}

#[async_trait]
impl Judge for LlmJudge {
    fn name(&self) -> &str {
        &self.role
    }

    async fn evaluate(&self, view: &StateView) -> Result<Option<String>, AgentError> {
        self.ask(view, false).await
    }

    async fn force(&self, view: &StateView) -> Result<String, AgentError> {
        self.ask(view, true).await?.ok_or_else(|| {
            AgentError::Parse(format!("{} deferred when forced to decide", self.role))
        })
    }
}

/// Research manager, trader and risk manager.
pub struct LlmSynthesizer {
    role: String,
    model: String,
    invoker: Arc<dyn LlmInvoker>,
}

impl LlmSynthesizer {
    pub fn new(role: &str, model: &str, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            role: role.to_string(),
            model: model.to_string(),
            invoker,
        }
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    fn name(&self) -> &str {
        &self.role
    }

    async fn synthesize(&self, view: &StateView) -> Result<String, AgentError> {
        let system = synthesizer_system_prompt(&self.role, &view.market);
        let user = render_view(view);
        let raw = self
            .invoker
            .invoke(LlmRequest {
                stage: &self.role,
                model: &self.model,
                system_prompt: &system,
                user_prompt: &user,
            })
            .await?;
        require_text(&self.role, raw)
    }
}

/// Registry of LLM-backed stages: enabled analysts from `config` plus every
/// voice, judge and synthesizer role. Voices and analysts use the quick
/// model; judges and synthesizers use the deep model.
pub fn llm_registry(config: &AgentsConfig, invoker: Arc<dyn LlmInvoker>) -> StageRegistry {
    let mut registry = StageRegistry::new();

    for analyst in config.analysts.iter().filter(|a| a.enabled) {
        let model = analyst.model.as_deref().unwrap_or(&config.quick_model);
        registry.analyst(Arc::new(LlmAnalyst::new(
            &analyst.name,
            analyst.report,
            model,
            Arc::clone(&invoker),
        )));
    }

    for role in [
        roles::BULL,
        roles::BEAR,
        roles::AGGRESSIVE,
        roles::NEUTRAL,
        roles::CONSERVATIVE,
    ] {
        registry.voice(
            role,
            Arc::new(LlmVoice::new(role, &config.quick_model, Arc::clone(&invoker))),
        );
    }

    for (role, kind) in [
        (roles::RESEARCH_JUDGE, DebateKind::Research),
        (roles::RISK_JUDGE, DebateKind::Risk),
    ] {
        registry.judge(
            role,
            Arc::new(LlmJudge::new(role, kind, &config.deep_model, Arc::clone(&invoker))),
        );
    }

    for role in [roles::RESEARCH_MANAGER, roles::TRADER, roles::RISK_MANAGER] {
        registry.synthesizer(
            role,
            Arc::new(LlmSynthesizer::new(role, &config.deep_model, Arc::clone(&invoker))),
        );
    }

    registry
}

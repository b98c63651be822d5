//! Layer-by-layer driver for one trade-decision run.
//!
//! `Analysis → Research → Execution → Risk → Management → Done`, forward
//! only. Analysts fan out in parallel; every later layer is sequential and
//! mandatory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tradeagents_memory::MemoryStore;
use tradeagents_models::{
    AnalystConfig, DebateKind, FailureKind, MarketCategory, MemoryMatch, MemoryMetadata,
    RunConfig, RunOutcome, RunStatus, SharedState, StageFailure, TranscriptEntry,
};
use uuid::Uuid;

use crate::debate::{DebateEngine, DebateEvent, DebateReport};
use crate::error::AgentError;
use crate::router::ToolRouter;
use crate::stage::{roles, timed, AnalystStage, DebateVoice, Judge, StageRegistry, Synthesizer};

/// Sender recorded on orchestrator-authored transcript entries.
const ORCHESTRATOR: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Analysis,
    Research,
    Execution,
    Risk,
    Management,
    Done,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Analysis => "analysis",
            Layer::Research => "research",
            Layer::Execution => "execution",
            Layer::Risk => "risk",
            Layer::Management => "management",
            Layer::Done => "done",
        }
    }

    pub fn next(&self) -> Layer {
        match self {
            Layer::Analysis => Layer::Research,
            Layer::Research => Layer::Execution,
            Layer::Execution => Layer::Risk,
            Layer::Risk => Layer::Management,
            Layer::Management | Layer::Done => Layer::Done,
        }
    }

    /// First layer with work left for `state`. Lets a partially filled
    /// state resume without rewriting fields that are already set.
    pub fn resume_point(state: &SharedState) -> Layer {
        if state.is_terminal() {
            Layer::Done
        } else if state.trader_plan().is_some() {
            Layer::Risk
        } else if state.investment_plan().is_some() {
            Layer::Execution
        } else if !state.reports().written().is_empty() || state.research_debate().round_count() > 0 {
            Layer::Research
        } else {
            Layer::Analysis
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a layer stopped the run.
struct Halt {
    stage: String,
    error: AgentError,
}

fn halt(stage: &str) -> impl FnOnce(AgentError) -> Halt + '_ {
    move |error| Halt {
        stage: stage.to_string(),
        error,
    }
}

/// Voices, judge and follow-up synthesizer for one debate layer.
struct DebateLayer {
    kind: DebateKind,
    voices: Vec<(String, Arc<dyn DebateVoice>)>,
    judge: Arc<dyn Judge>,
}

impl DebateLayer {
    fn from_registry(
        registry: &StageRegistry,
        kind: DebateKind,
        voice_roles: &[&str],
        judge_role: &str,
    ) -> Result<Self, AgentError> {
        let voices = voice_roles
            .iter()
            .map(|role| Ok((role.to_string(), registry.require_voice(role)?)))
            .collect::<Result<Vec<_>, AgentError>>()?;
        Ok(Self {
            kind,
            voices,
            judge: registry.require_judge(judge_role)?,
        })
    }

    fn engine(&self, max_rounds: u32, config: &RunConfig) -> DebateEngine {
        DebateEngine::new(self.kind, self.voices.clone(), Arc::clone(&self.judge), max_rounds)
            .with_retry_limit(config.voice_retry_limit)
            .with_turn_timeout(Duration::from_millis(config.stage_timeout_ms))
    }
}

/// Accumulates what a run records besides the state itself.
struct RunLog {
    failures: Vec<StageFailure>,
}

impl RunLog {
    /// Record a recoverable failure with a matching error transcript entry.
    fn record(&mut self, state: &mut SharedState, failure: StageFailure) -> Result<(), Halt> {
        state
            .append_transcript(TranscriptEntry::error(
                &failure.stage,
                format!("{:?}: {}", failure.kind, failure.reason),
            ))
            .map_err(|e| halt(&failure.stage)(e.into()))?;
        self.failures.push(failure);
        Ok(())
    }
}

pub struct LayerOrchestrator {
    analysts: Vec<Arc<dyn AnalystStage>>,
    /// Per-analyst configuration. An analyst without an entry runs everywhere.
    analyst_configs: Vec<AnalystConfig>,
    research: DebateLayer,
    risk: DebateLayer,
    research_manager: Arc<dyn Synthesizer>,
    trader: Arc<dyn Synthesizer>,
    risk_manager: Arc<dyn Synthesizer>,
    memory: Arc<dyn MemoryStore>,
    router: ToolRouter,
}

impl LayerOrchestrator {
    /// Build from a registry. Every non-analyst role must be registered.
    pub fn from_registry(
        registry: &StageRegistry,
        memory: Arc<dyn MemoryStore>,
        router: ToolRouter,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            analysts: registry.analysts(),
            analyst_configs: Vec::new(),
            research: DebateLayer::from_registry(
                registry,
                DebateKind::Research,
                &[roles::BULL, roles::BEAR],
                roles::RESEARCH_JUDGE,
            )?,
            risk: DebateLayer::from_registry(
                registry,
                DebateKind::Risk,
                &[roles::AGGRESSIVE, roles::NEUTRAL, roles::CONSERVATIVE],
                roles::RISK_JUDGE,
            )?,
            research_manager: registry.require_synthesizer(roles::RESEARCH_MANAGER)?,
            trader: registry.require_synthesizer(roles::TRADER)?,
            risk_manager: registry.require_synthesizer(roles::RISK_MANAGER)?,
            memory,
            router,
        })
    }

    /// Apply per-analyst market restrictions from configuration.
    pub fn with_analyst_config(mut self, analysts: &[AnalystConfig]) -> Self {
        self.analyst_configs = analysts.to_vec();
        self
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Analysts that apply to `category`, in registration order.
    pub fn analysts_for(&self, category: MarketCategory) -> Vec<&str> {
        self.applicable_analysts(category)
            .map(|a| a.name())
            .collect()
    }

    fn applicable_analysts(
        &self,
        category: MarketCategory,
    ) -> impl Iterator<Item = &Arc<dyn AnalystStage>> {
        self.analysts.iter().filter(move |a| {
            self.analyst_configs
                .iter()
                .find(|c| c.name == a.name())
                .map_or(true, |c| c.applies_to(category))
        })
    }

    /// Route the instrument and run every layer with a fresh run id.
    pub async fn run(
        &self,
        instrument_id: &str,
        as_of_date: NaiveDate,
        config: &RunConfig,
    ) -> Result<RunOutcome, AgentError> {
        self.execute(
            Uuid::new_v4(),
            instrument_id,
            as_of_date,
            config,
            &CancellationToken::new(),
        )
        .await
    }

    /// Route the instrument, create the state and run every layer.
    pub async fn execute(
        &self,
        run_id: Uuid,
        instrument_id: &str,
        as_of_date: NaiveDate,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        config.validate().map_err(AgentError::Config)?;

        let classification = self.router.classify_detailed(instrument_id);
        let market = tradeagents_models::MarketContext::for_category(classification.category);
        let mut state = SharedState::new(instrument_id, as_of_date, market);
        let mut log = RunLog {
            failures: Vec::new(),
        };

        info!(
            %run_id,
            instrument = instrument_id,
            market = %classification.category,
            "Starting run"
        );

        if !classification.matched {
            let failure = StageFailure::new(
                "router",
                FailureKind::RouterUnclassifiable,
                format!(
                    "no routing rule matched {instrument_id:?}; using {}",
                    classification.category
                ),
            );
            log.record(&mut state, failure)
                .map_err(|h| h.error)?;
        }

        Ok(self.drive(run_id, state, log, config, cancel).await)
    }

    /// Continue a run from whatever `state` already holds.
    ///
    /// A terminal state is rejected: no stage may run after the final decision.
    /// So is a state whose debates break the round invariants, such as an
    /// edited serialized state.
    pub async fn resume(
        &self,
        run_id: Uuid,
        state: SharedState,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        if state.is_terminal() {
            return Err(AgentError::TerminalState);
        }
        state.validate()?;
        config.validate().map_err(AgentError::Config)?;
        let log = RunLog {
            failures: Vec::new(),
        };
        Ok(self.drive(run_id, state, log, config, cancel).await)
    }

    async fn drive(
        &self,
        run_id: Uuid,
        mut state: SharedState,
        mut log: RunLog,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let start = Instant::now();
        let mut layer = Layer::resume_point(&state);
        let mut status = RunStatus::Done;

        while layer != Layer::Done {
            if cancel.is_cancelled() {
                warn!(%run_id, %layer, "Run cancelled");
                status = RunStatus::Cancelled;
                break;
            }

            info!(%run_id, %layer, instrument = state.instrument_id(), "Entering layer");
            let layer_start = Instant::now();
            let result = match layer {
                Layer::Analysis => self.analysis(&mut state, &mut log, config).await,
                Layer::Research => self.research(&mut state, &mut log, config, cancel).await,
                Layer::Execution => self.execution(&mut state, &mut log, config).await,
                Layer::Risk => self.risk(&mut state, &mut log, config, cancel).await,
                Layer::Management => self.management(&mut state, config).await,
                Layer::Done => Ok(()),
            };

            match result {
                Ok(()) => {
                    info!(
                        %run_id,
                        %layer,
                        elapsed_ms = layer_start.elapsed().as_millis() as u64,
                        "Layer complete"
                    );
                    layer = layer.next();
                }
                Err(Halt {
                    error: AgentError::Cancelled,
                    ..
                }) => {
                    warn!(%run_id, %layer, "Run cancelled");
                    status = RunStatus::Cancelled;
                    break;
                }
                Err(Halt { stage, error: e }) => {
                    error!(%run_id, %layer, stage = %stage, error = %e, "Mandatory stage failed");
                    let reason = e.to_string();
                    let failure = StageFailure::new(&stage, FailureKind::StageFailure, reason.clone());
                    if let Err(h) = log.record(&mut state, failure.clone()) {
                        error!(stage = %h.stage, error = %h.error, "Could not annotate transcript");
                        log.failures.push(failure);
                    }
                    status = RunStatus::Failed { stage, reason };
                    break;
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %run_id,
            instrument = state.instrument_id(),
            status = ?status,
            failures = log.failures.len(),
            elapsed_ms,
            "Run finished"
        );

        if status.is_done() && config.record_decisions {
            if let Some(write) = self.remember_outcome(&state, None) {
                let timeout = Duration::from_millis(config.stage_timeout_ms);
                match tokio::time::timeout(timeout, write).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(%run_id, error = %e, "Memory write task panicked"),
                    Err(_) => warn!(
                        %run_id,
                        timeout_ms = config.stage_timeout_ms,
                        "Memory write still pending; no longer waiting"
                    ),
                }
            }
        }

        RunOutcome {
            run_id,
            status,
            state,
            failures: log.failures,
            elapsed_ms,
        }
    }

    async fn analysis(
        &self,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
    ) -> Result<(), Halt> {
        let category = state.market().market_category;
        let permits = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
        let view = Arc::new(state.view());
        let timeout = Duration::from_millis(config.analyst_timeout_ms);

        let mut handles = Vec::new();
        for analyst in self.applicable_analysts(category) {
            if state.report(analyst.report()).is_some() {
                continue;
            }
            let analyst = Arc::clone(analyst);
            let permits = Arc::clone(&permits);
            let view = Arc::clone(&view);
            let name = analyst.name().to_string();

            let handle = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| AgentError::stage(analyst.name(), e))?;
                let started = Instant::now();
                let text = timed(analyst.name(), timeout, analyst.analyze(&view)).await?;
                Ok::<_, AgentError>((analyst.report(), text, started.elapsed()))
            });
            handles.push((name, handle));
        }

        // Collected in registration order so merged reports are deterministic.
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok((report, text, elapsed))) => {
                    info!(
                        stage = %name,
                        report = report.field_name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Analyst succeeded"
                    );
                    let entry = TranscriptEntry::assistant(&name, text.as_str());
                    match state.write_report(report, text, &name) {
                        Ok(()) => state.append_transcript(entry).map_err(|e| halt(&name)(e.into()))?,
                        Err(e) => {
                            warn!(stage = %name, error = %e, "Analyst report rejected");
                            log.record(
                                state,
                                StageFailure::new(&name, FailureKind::AnalystFailure, e.to_string()),
                            )?;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(stage = %name, error = %e, "Analyst failed");
                    log.record(
                        state,
                        StageFailure::new(&name, FailureKind::AnalystFailure, e.to_string()),
                    )?;
                }
                Err(e) => {
                    error!(stage = %name, error = %e, "Analyst task panicked");
                    log.record(
                        state,
                        StageFailure::new(&name, FailureKind::AnalystFailure, format!("task panicked: {e}")),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Run one debate to a decision and install it in `state`. A debate
    /// that is already decided is left alone.
    async fn debate(
        &self,
        layer: &DebateLayer,
        max_rounds: u32,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let kind = layer.kind;
        let mut debate = state.debate(kind).clone();
        if debate.is_decided() {
            return Ok(());
        }

        let engine = layer.engine(max_rounds, config);
        let mut report = DebateReport::new(kind);
        let result = engine.run_into(state, &mut debate, cancel, &mut report).await;

        let stage = kind.as_str();
        for event in report.events {
            match event {
                DebateEvent::Turn(entry) => {
                    state.append_transcript(entry).map_err(|e| halt(stage)(e.into()))?
                }
                DebateEvent::Failure(failure) => log.record(state, failure)?,
            }
        }
        let decision = debate.judge_decision().map(str::to_string);

        // Committed rounds are kept even when the debate failed.
        state
            .commit_debate(kind, debate, layer.judge.name())
            .map_err(|e| halt(stage)(e.into()))?;
        result.map_err(halt(stage))?;

        if let Some(decision) = decision {
            let note = if report.forced {
                format!("{decision}\n(decided at round ceiling)")
            } else {
                decision
            };
            state
                .append_transcript(TranscriptEntry::assistant(layer.judge.name(), note))
                .map_err(|e| halt(stage)(e.into()))?;
        }
        Ok(())
    }

    async fn synthesize(
        &self,
        stage: &Arc<dyn Synthesizer>,
        view: &tradeagents_models::StateView,
        config: &RunConfig,
    ) -> Result<String, Halt> {
        let timeout = Duration::from_millis(config.stage_timeout_ms);
        timed(stage.name(), timeout, stage.synthesize(view))
            .await
            .map_err(halt(stage.name()))
    }

    async fn research(
        &self,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        self.debate(&self.research, config.max_research_rounds, state, log, config, cancel)
            .await?;
        if cancel.is_cancelled() {
            return Err(halt(DebateKind::Research.as_str())(AgentError::Cancelled));
        }

        let manager = self.research_manager.name().to_string();
        let plan = self
            .synthesize(&self.research_manager, &state.view(), config)
            .await?;
        state
            .append_transcript(TranscriptEntry::assistant(&manager, plan.as_str()))
            .and_then(|()| state.set_investment_plan(plan, &manager))
            .map_err(|e| halt(&manager)(e.into()))
    }

    async fn execution(
        &self,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
    ) -> Result<(), Halt> {
        let memories = self.recall(state, log, config).await?;
        let trader = self.trader.name().to_string();
        let view = state.view().with_memories(memories);
        let plan = self.synthesize(&self.trader, &view, config).await?;
        state
            .append_transcript(TranscriptEntry::assistant(&trader, plan.as_str()))
            .and_then(|()| state.set_trader_plan(plan, &trader))
            .map_err(|e| halt(&trader)(e.into()))
    }

    /// Best-effort memory lookup. Any failure yields an empty result.
    async fn recall(
        &self,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
    ) -> Result<Vec<MemoryMatch>, Halt> {
        let situation = state.reports().situation();
        let timeout = Duration::from_millis(config.stage_timeout_ms);
        let lookup = async {
            self.memory
                .retrieve(&situation, config.memory_k)
                .await
                .map_err(AgentError::from)
        };

        match timed("memory", timeout, lookup).await {
            Ok(matches) => {
                let matches: Vec<MemoryMatch> = matches.collect();
                info!(found = matches.len(), k = config.memory_k, "Memories retrieved");
                Ok(matches)
            }
            Err(e) => {
                warn!(error = %e, "Memory unavailable; continuing without past situations");
                log.record(
                    state,
                    StageFailure::new("memory", FailureKind::MemoryUnavailable, e.to_string()),
                )?;
                Ok(Vec::new())
            }
        }
    }

    async fn risk(
        &self,
        state: &mut SharedState,
        log: &mut RunLog,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        self.debate(&self.risk, config.max_risk_rounds, state, log, config, cancel)
            .await
    }

    async fn management(&self, state: &mut SharedState, config: &RunConfig) -> Result<(), Halt> {
        let manager = self.risk_manager.name().to_string();
        let decision = self
            .synthesize(&self.risk_manager, &state.view(), config)
            .await?;
        // The transcript closes once the final decision is set.
        state
            .append_transcript(TranscriptEntry::assistant(&manager, decision.as_str()))
            .and_then(|()| state.set_final_decision(decision, &manager))
            .map_err(|e| halt(&manager)(e.into()))
    }

    /// Record the run's situation and decision in memory.
    ///
    /// Fire-and-forget: the write is spawned and failures are only logged.
    /// Returns `None` when the state has no final decision yet.
    pub fn remember_outcome(
        &self,
        state: &SharedState,
        reflection: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        let decision = state.final_decision()?;
        let recommendation = match reflection {
            Some(reflection) => format!("{decision}\n\nReflection: {reflection}"),
            None => decision.to_string(),
        };
        let situation = state.reports().situation();
        let metadata = MemoryMetadata {
            instrument_id: Some(state.instrument_id().to_string()),
            as_of_date: Some(state.as_of_date()),
            ..MemoryMetadata::new(recommendation)
        };
        let memory = Arc::clone(&self.memory);
        let instrument = state.instrument_id().to_string();

        Some(tokio::spawn(async move {
            match memory.add(&situation, metadata).await {
                Ok(()) => info!(instrument = %instrument, "Outcome recorded in memory"),
                Err(e) => warn!(instrument = %instrument, error = %e, "Failed to record outcome"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stub_registry, FixedMemory, ScriptedAnalyst};
    use tradeagents_models::ReportKind;

    fn orchestrator(registry: &StageRegistry) -> LayerOrchestrator {
        LayerOrchestrator::from_registry(
            registry,
            Arc::new(FixedMemory::default()),
            ToolRouter::default(),
        )
        .unwrap()
    }

    #[test]
    fn layers_advance_forward_only() {
        let mut layer = Layer::Analysis;
        let mut seen = vec![layer];
        while layer != Layer::Done {
            layer = layer.next();
            seen.push(layer);
        }
        assert_eq!(
            seen,
            vec![
                Layer::Analysis,
                Layer::Research,
                Layer::Execution,
                Layer::Risk,
                Layer::Management,
                Layer::Done
            ]
        );
        assert_eq!(Layer::Done.next(), Layer::Done);
    }

    #[test]
    fn missing_roles_fail_construction() {
        let mut registry = StageRegistry::new();
        registry.analyst(Arc::new(ScriptedAnalyst::ok("market_analyst", ReportKind::Market, "m")));

        let err = LayerOrchestrator::from_registry(
            &registry,
            Arc::new(FixedMemory::default()),
            ToolRouter::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AgentError::MissingStage(_)));
    }

    #[test]
    fn analyst_market_filter() {
        let mut registry = stub_registry();
        registry.analyst(Arc::new(ScriptedAnalyst::ok(
            "china_market_analyst",
            ReportKind::Specialist,
            "Northbound inflows",
        )));
        let orch = orchestrator(&registry)
            .with_analyst_config(&tradeagents_models::AgentsConfig::default().analysts);

        assert!(orch
            .analysts_for(MarketCategory::DomesticEquity)
            .contains(&"china_market_analyst"));
        assert!(!orch
            .analysts_for(MarketCategory::UsEquity)
            .contains(&"china_market_analyst"));
        assert_eq!(orch.analysts_for(MarketCategory::UsEquity).len(), 4);
    }

    #[test]
    fn resume_point_follows_written_fields() {
        let mut state = SharedState::new(
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            tradeagents_models::MarketContext::for_category(MarketCategory::UsEquity),
        );
        assert_eq!(Layer::resume_point(&state), Layer::Analysis);

        state
            .write_report(ReportKind::Market, "m".to_string(), "market_analyst")
            .unwrap();
        assert_eq!(Layer::resume_point(&state), Layer::Research);

        state.set_investment_plan("p".to_string(), "rm").unwrap();
        assert_eq!(Layer::resume_point(&state), Layer::Execution);

        state.set_trader_plan("t".to_string(), "trader").unwrap();
        assert_eq!(Layer::resume_point(&state), Layer::Risk);

        state.set_final_decision("BUY".to_string(), "risk_manager").unwrap();
        assert_eq!(Layer::resume_point(&state), Layer::Done);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_running() {
        let orch = orchestrator(&stub_registry());
        let config = RunConfig {
            max_research_rounds: 0,
            ..RunConfig::default()
        };
        let err = orch
            .run("AAPL", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}

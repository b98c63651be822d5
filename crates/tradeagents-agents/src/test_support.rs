//! Scripted stages and memories for exercising the orchestrator without an LLM.
//!
//! Every stub records what it was shown so tests can assert on visibility
//! rules (e.g. that no voice sees a same-round turn).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tradeagents_memory::{MemoryError, MemoryMatches, MemoryStore};
use tradeagents_models::{MemoryMatch, MemoryMetadata, ReportKind, StateView};

use crate::error::AgentError;
use crate::stage::{roles, AnalystStage, DebateVoice, Judge, StageRegistry, Synthesizer};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Analyst returning a fixed report, failing, or sleeping first.
pub struct ScriptedAnalyst {
    name: String,
    report: ReportKind,
    text: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAnalyst {
    pub fn ok(name: &str, report: ReportKind, text: &str) -> Self {
        Self {
            name: name.to_string(),
            report,
            text: Some(text.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, report: ReportKind) -> Self {
        Self {
            text: None,
            ..Self::ok(name, report, "")
        }
    }

    pub fn slow(name: &str, report: ReportKind, text: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(name, report, text)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalystStage for ScriptedAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn report(&self) -> ReportKind {
        self.report
    }

    async fn analyze(&self, _view: &StateView) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.text
            .clone()
            .ok_or_else(|| AgentError::stage(&self.name, "scripted analyst failure"))
    }
}

/// Voice that answers `"<name> r<round>"` and can be told to fail.
pub struct ScriptedVoice {
    name: String,
    /// Remaining failures keyed by round number.
    failures: Mutex<HashMap<u32, u32>>,
    always_fail: bool,
    seen: Mutex<Vec<StateView>>,
}

impl ScriptedVoice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failures: Mutex::new(HashMap::new()),
            always_fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` attempts at `round`.
    pub fn failing_on_round(name: &str, round: u32, times: u32) -> Self {
        let voice = Self::new(name);
        lock(&voice.failures).insert(round, times);
        voice
    }

    pub fn always_failing(name: &str) -> Self {
        Self {
            always_fail: true,
            ..Self::new(name)
        }
    }

    /// Every view this voice was handed, in call order.
    pub fn seen(&self) -> Vec<StateView> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl DebateVoice for ScriptedVoice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn speak(&self, view: &StateView) -> Result<String, AgentError> {
        lock(&self.seen).push(view.clone());
        let round = view.debate.as_ref().map_or(0, |d| d.round);

        if self.always_fail {
            return Err(AgentError::stage(&self.name, "scripted voice failure"));
        }
        {
            let mut failures = lock(&self.failures);
            if let Some(remaining) = failures.get_mut(&round) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AgentError::stage(
                        &self.name,
                        format!("scripted failure in round {round}"),
                    ));
                }
            }
        }
        Ok(format!("{} r{round}", self.name))
    }
}

/// Judge that defers until a number of rounds have completed.
pub struct ScriptedJudge {
    name: String,
    decide_after: Option<u32>,
    decision: String,
    evaluations: AtomicUsize,
    forced: AtomicUsize,
}

impl ScriptedJudge {
    /// Decide `decision` once `rounds` rounds have completed.
    pub fn deciding_after(rounds: u32, decision: &str) -> Self {
        Self {
            name: "scripted_judge".to_string(),
            decide_after: Some(rounds),
            decision: decision.to_string(),
            evaluations: AtomicUsize::new(0),
            forced: AtomicUsize::new(0),
        }
    }

    /// Always defers; only a forced call yields `decision`.
    pub fn never_deciding(decision: &str) -> Self {
        Self {
            decide_after: None,
            ..Self::deciding_after(0, decision)
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn forced_calls(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, view: &StateView) -> Result<Option<String>, AgentError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let completed = view.debate.as_ref().map_or(0, |d| d.completed_rounds);
        Ok(self
            .decide_after
            .filter(|after| completed >= *after)
            .map(|_| self.decision.clone()))
    }

    async fn force(&self, _view: &StateView) -> Result<String, AgentError> {
        self.forced.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} (forced)", self.decision))
    }
}

/// Synthesizer returning a fixed text, or failing.
pub struct ScriptedSynthesizer {
    name: String,
    text: Option<String>,
    seen: Mutex<Vec<StateView>>,
}

impl ScriptedSynthesizer {
    pub fn ok(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: Some(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            text: None,
            ..Self::ok(name, "")
        }
    }

    pub fn seen(&self) -> Vec<StateView> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, view: &StateView) -> Result<String, AgentError> {
        lock(&self.seen).push(view.clone());
        self.text
            .clone()
            .ok_or_else(|| AgentError::stage(&self.name, "scripted synthesizer failure"))
    }
}

/// Memory returning a fixed set of matches and recording additions.
#[derive(Default)]
pub struct FixedMemory {
    matches: Vec<MemoryMatch>,
    added: Mutex<Vec<(String, MemoryMetadata)>>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FixedMemory {
    pub fn new(matches: Vec<MemoryMatch>) -> Self {
        Self {
            matches,
            ..Self::default()
        }
    }

    pub fn added(&self) -> Vec<(String, MemoryMetadata)> {
        lock(&self.added).clone()
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl MemoryStore for FixedMemory {
    async fn retrieve(&self, situation: &str, k: usize) -> Result<MemoryMatches, MemoryError> {
        lock(&self.queries).push((situation.to_string(), k));
        Ok(MemoryMatches::new(
            self.matches.iter().take(k).cloned().collect(),
        ))
    }

    async fn add(&self, situation: &str, metadata: MemoryMetadata) -> Result<(), MemoryError> {
        lock(&self.added).push((situation.to_string(), metadata));
        Ok(())
    }
}

/// Memory whose every call fails.
pub struct UnavailableMemory;

#[async_trait]
impl MemoryStore for UnavailableMemory {
    async fn retrieve(&self, _situation: &str, _k: usize) -> Result<MemoryMatches, MemoryError> {
        Err(MemoryError::Unavailable("scripted outage".to_string()))
    }

    async fn add(&self, _situation: &str, _metadata: MemoryMetadata) -> Result<(), MemoryError> {
        Err(MemoryError::Unavailable("scripted outage".to_string()))
    }
}

pub fn memory_match(situation: &str, recommendation: &str, score: f64) -> MemoryMatch {
    MemoryMatch {
        situation: situation.to_string(),
        recommendation: recommendation.to_string(),
        similarity_score: score,
    }
}

/// A complete registry of well-behaved stubs: four core analysts, all five
/// voices, judges that only decide when forced, and the three synthesizers.
pub fn stub_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry
        .analyst(Arc::new(ScriptedAnalyst::ok(
            "market_analyst",
            ReportKind::Market,
            "Price above 50-day average",
        )))
        .analyst(Arc::new(ScriptedAnalyst::ok(
            "social_media_analyst",
            ReportKind::Sentiment,
            "Sentiment mildly positive",
        )))
        .analyst(Arc::new(ScriptedAnalyst::ok(
            "news_analyst",
            ReportKind::News,
            "No material news",
        )))
        .analyst(Arc::new(ScriptedAnalyst::ok(
            "fundamentals_analyst",
            ReportKind::Fundamentals,
            "Margins stable",
        )));

    for role in [
        roles::BULL,
        roles::BEAR,
        roles::AGGRESSIVE,
        roles::NEUTRAL,
        roles::CONSERVATIVE,
    ] {
        registry.voice(role, Arc::new(ScriptedVoice::new(role)));
    }

    registry
        .judge(
            roles::RESEARCH_JUDGE,
            Arc::new(ScriptedJudge::never_deciding("Research verdict: BUY")),
        )
        .judge(
            roles::RISK_JUDGE,
            Arc::new(ScriptedJudge::never_deciding("Risk verdict: moderate size")),
        )
        .synthesizer(
            roles::RESEARCH_MANAGER,
            Arc::new(ScriptedSynthesizer::ok(roles::RESEARCH_MANAGER, "Plan: accumulate")),
        )
        .synthesizer(
            roles::TRADER,
            Arc::new(ScriptedSynthesizer::ok(
                roles::TRADER,
                "FINAL TRANSACTION PROPOSAL: **BUY**",
            )),
        )
        .synthesizer(
            roles::RISK_MANAGER,
            Arc::new(ScriptedSynthesizer::ok(roles::RISK_MANAGER, "Decision: BUY")),
        );
    registry
}

//! Round-based adversarial debate driver.
//!
//! A round is a transaction: every voice speaks once against the same
//! snapshot of the last committed round, and the turns are committed
//! together or not at all. After each committed round the judge may decide;
//! once the round ceiling is reached (or a round keeps failing) the judge
//! is forced to decide on the history that exists.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tradeagents_models::{
    DebateKind, DebateState, FailureKind, SharedState, StageFailure, TranscriptEntry,
};

use crate::error::AgentError;
use crate::stage::{timed, DebateVoice, Judge};

/// Something that happened during a debate, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum DebateEvent {
    /// A turn of a committed round.
    Turn(TranscriptEntry),
    /// A discarded round attempt.
    Failure(StageFailure),
}

/// What happened during one `DebateEngine::run`.
#[derive(Debug, Clone)]
pub struct DebateReport {
    pub kind: DebateKind,
    pub rounds_completed: u32,
    /// The decision came from a forced judge call.
    pub forced: bool,
    /// Committed turns and discarded attempts, chronologically.
    pub events: Vec<DebateEvent>,
}

impl DebateReport {
    pub fn new(kind: DebateKind) -> Self {
        Self {
            kind,
            rounds_completed: 0,
            forced: false,
            events: Vec::new(),
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.events.iter().filter_map(|event| match event {
            DebateEvent::Turn(entry) => Some(entry),
            DebateEvent::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageFailure> {
        self.events.iter().filter_map(|event| match event {
            DebateEvent::Failure(failure) => Some(failure),
            DebateEvent::Turn(_) => None,
        })
    }
}

pub struct DebateEngine {
    kind: DebateKind,
    voices: Vec<(String, Arc<dyn DebateVoice>)>,
    judge: Arc<dyn Judge>,
    max_rounds: u32,
    retry_limit: u32,
    turn_timeout: Duration,
}

impl DebateEngine {
    /// `voices` fixes the speaking order for every round.
    pub fn new(
        kind: DebateKind,
        voices: Vec<(String, Arc<dyn DebateVoice>)>,
        judge: Arc<dyn Judge>,
        max_rounds: u32,
    ) -> Self {
        Self {
            kind,
            voices,
            judge,
            max_rounds: max_rounds.max(1),
            retry_limit: 1,
            turn_timeout: Duration::from_secs(180),
        }
    }

    /// How many times a failed round is replayed before forcing the judge.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Timeout for each voice turn and judge call.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Drive `debate` to a judge decision.
    ///
    /// `state` supplies everything else voices may read. On error `debate`
    /// holds the last fully committed round.
    pub async fn run(
        &self,
        state: &SharedState,
        debate: &mut DebateState,
        cancel: &CancellationToken,
    ) -> Result<DebateReport, AgentError> {
        let mut report = DebateReport::new(self.kind);
        self.run_into(state, debate, cancel, &mut report).await?;
        Ok(report)
    }

    /// Like [`run`](Self::run), but records into `report` so discarded
    /// rounds stay visible when the debate ends in an error.
    pub async fn run_into(
        &self,
        state: &SharedState,
        debate: &mut DebateState,
        cancel: &CancellationToken,
        report: &mut DebateReport,
    ) -> Result<(), AgentError> {
        let order: Vec<String> = self.voices.iter().map(|(name, _)| name.clone()).collect();
        if debate.voices() != order.as_slice() {
            return Err(AgentError::Config(format!(
                "{} configured with voices {:?} but state has {:?}",
                self.kind,
                order,
                debate.voices()
            )));
        }
        if debate.is_decided() {
            return Err(tradeagents_models::StateError::DebateAlreadyDecided {
                debate: self.kind.to_string(),
            }
            .into());
        }

        let mut last_failure = None;

        while debate.round_count() < self.max_rounds {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            match self.play_round_with_retries(state, debate, cancel, report).await {
                Ok(turns) => {
                    let entries: Vec<DebateEvent> = turns
                        .iter()
                        .map(|(voice, text)| {
                            DebateEvent::Turn(TranscriptEntry::assistant(voice, text.as_str()))
                        })
                        .collect();
                    debate.commit_round(turns)?;
                    report.events.extend(entries);
                    report.rounds_completed += 1;
                    info!(
                        debate = %self.kind,
                        round = debate.round_count(),
                        "Debate round committed"
                    );
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    warn!(
                        debate = %self.kind,
                        round = debate.round_count() + 1,
                        error = %e,
                        "Round failed after retries; forcing judge"
                    );
                    last_failure = Some(e);
                    break;
                }
            }

            let view = state.debate_view(self.kind, debate);
            let verdict = timed(self.judge.name(), self.turn_timeout, self.judge.evaluate(&view)).await?;
            if let Some(decision) = verdict {
                debate.set_judge_decision(decision)?;
                info!(debate = %self.kind, rounds = debate.round_count(), "Judge decided");
                return Ok(());
            }
        }

        if debate.round_count() == 0 {
            return Err(AgentError::NoCompletedRounds {
                debate: format!(
                    "{} ({})",
                    self.kind,
                    last_failure.map_or_else(|| "no rounds played".to_string(), |e| e.to_string())
                ),
            });
        }

        let view = state.debate_view(self.kind, debate);
        let decision = timed(self.judge.name(), self.turn_timeout, self.judge.force(&view)).await?;
        debate.set_judge_decision(decision)?;
        report.forced = true;
        info!(debate = %self.kind, rounds = debate.round_count(), "Judge forced to decide");
        Ok(())
    }

    async fn play_round_with_retries(
        &self,
        state: &SharedState,
        debate: &DebateState,
        cancel: &CancellationToken,
        report: &mut DebateReport,
    ) -> Result<Vec<(String, String)>, AgentError> {
        let mut attempt = 0;
        loop {
            match self.play_round(state, debate).await {
                Ok(turns) => return Ok(turns),
                Err(e) => {
                    let stage = match &e {
                        AgentError::Voice { voice, .. } => voice.clone(),
                        _ => self.kind.to_string(),
                    };
                    warn!(debate = %self.kind, voice = %stage, attempt, error = %e, "Round discarded");
                    report.events.push(DebateEvent::Failure(StageFailure::new(
                        &stage,
                        FailureKind::DebateVoiceFailure,
                        e.to_string(),
                    )));

                    if attempt >= self.retry_limit {
                        return Err(e);
                    }
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt at the next round. Nothing is recorded here; the caller
    /// commits the returned turns.
    async fn play_round(
        &self,
        state: &SharedState,
        debate: &DebateState,
    ) -> Result<Vec<(String, String)>, AgentError> {
        let round = debate.round_count() + 1;
        let snapshot = state.debate_view(self.kind, debate);

        let mut turns = Vec::with_capacity(self.voices.len());
        for (name, voice) in &self.voices {
            let view = snapshot.clone().speaking_as(name);
            let text = timed(name, self.turn_timeout, voice.speak(&view))
                .await
                .map_err(|e| AgentError::Voice {
                    voice: name.clone(),
                    round,
                    cause: Box::new(e),
                })?;
            turns.push((name.clone(), text));
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedJudge, ScriptedVoice};
    use chrono::NaiveDate;
    use tradeagents_models::{MarketCategory, MarketContext};

    fn state() -> SharedState {
        SharedState::new(
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            MarketContext::for_category(MarketCategory::UsEquity),
        )
    }

    fn research_engine(
        bull: Arc<ScriptedVoice>,
        bear: Arc<ScriptedVoice>,
        judge: Arc<ScriptedJudge>,
        max_rounds: u32,
    ) -> DebateEngine {
        DebateEngine::new(
            DebateKind::Research,
            vec![
                ("bull".to_string(), bull as Arc<dyn DebateVoice>),
                ("bear".to_string(), bear as Arc<dyn DebateVoice>),
            ],
            judge,
            max_rounds,
        )
    }

    #[tokio::test]
    async fn judge_decides_early() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let judge = Arc::new(ScriptedJudge::deciding_after(2, "BUY"));
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::new("bear")),
            judge.clone(),
            5,
        );

        let report = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(debate.round_count(), 2);
        assert_eq!(debate.judge_decision(), Some("BUY"));
        assert!(!report.forced);
        assert_eq!(judge.forced_calls(), 0);
        assert_eq!(report.turns().count(), 4);
    }

    #[tokio::test]
    async fn ceiling_forces_judge() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let judge = Arc::new(ScriptedJudge::never_deciding("HOLD"));
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::new("bear")),
            judge.clone(),
            3,
        );

        let report = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(debate.round_count(), 3);
        assert!(report.forced);
        assert_eq!(debate.judge_decision(), Some("HOLD (forced)"));
        assert_eq!(judge.evaluations(), 3);
        assert_eq!(judge.forced_calls(), 1);
    }

    #[tokio::test]
    async fn voices_never_see_same_round_turns() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let bull = Arc::new(ScriptedVoice::new("bull"));
        let bear = Arc::new(ScriptedVoice::new("bear"));
        let engine = research_engine(
            bull.clone(),
            bear.clone(),
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            2,
        );

        engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        let bear_views = bear.seen();
        assert_eq!(bear_views.len(), 2);
        // Round 1: bear sees nothing, not even bull's round-1 turn.
        let first = bear_views[0].debate.as_ref().unwrap();
        assert_eq!(first.merged_history, "");
        assert!(first.previous_responses.is_empty());
        // Round 2: bear sees round 1 only.
        let second = bear_views[1].debate.as_ref().unwrap();
        assert_eq!(second.merged_history, "bull: bull r1\nbear: bear r1");
        assert_eq!(second.own_history, "bear: bear r1");
        assert_eq!(second.opponent_responses(), vec![("bull", "bull r1")]);
    }

    #[tokio::test]
    async fn failed_round_is_discarded_and_retried() {
        let state = state();
        let mut debate = state.research_debate().clone();
        // Bear fails once in round 2; the retry succeeds.
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::failing_on_round("bear", 2, 1)),
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            2,
        );

        let report = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(debate.round_count(), 2);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "bear");
        assert_eq!(failures[0].kind, FailureKind::DebateVoiceFailure);
        // Bull spoke three times but only two turns were kept.
        assert_eq!(debate.per_voice_history()["bull"].len(), 2);
        assert_eq!(debate.render_merged_history(), debate.merged_history());
    }

    #[tokio::test]
    async fn events_follow_the_order_they_happened_in() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::failing_on_round("bear", 2, 1)),
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            3,
        );

        let report = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        let order: Vec<String> = report
            .events
            .iter()
            .map(|event| match event {
                DebateEvent::Turn(entry) => entry.content.clone(),
                DebateEvent::Failure(failure) => format!("failed {}", failure.stage),
            })
            .collect();
        assert_eq!(
            order,
            vec![
                "bull r1",
                "bear r1",
                "failed bear",
                "bull r2",
                "bear r2",
                "bull r3",
                "bear r3",
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_force_judge_on_existing_history() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::failing_on_round("bear", 2, 5)),
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            3,
        )
        .with_retry_limit(2);

        let report = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(debate.round_count(), 1);
        assert_eq!(report.failures().count(), 3);
        assert!(report.forced);
        assert_eq!(debate.merged_history(), "bull: bull r1\nbear: bear r1");
    }

    #[tokio::test]
    async fn failure_with_no_completed_rounds_is_an_error() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let judge = Arc::new(ScriptedJudge::never_deciding("HOLD"));
        let engine = research_engine(
            Arc::new(ScriptedVoice::always_failing("bull")),
            Arc::new(ScriptedVoice::new("bear")),
            judge.clone(),
            1,
        )
        .with_retry_limit(0);

        let err = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::NoCompletedRounds { .. }));
        assert_eq!(debate.round_count(), 0);
        assert_eq!(debate.merged_history(), "");
        assert!(debate.judge_decision().is_none());
        assert_eq!(judge.forced_calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_before_first_round() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let engine = research_engine(
            Arc::new(ScriptedVoice::new("bull")),
            Arc::new(ScriptedVoice::new("bear")),
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            2,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine.run(&state, &mut debate, &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(debate.round_count(), 0);
    }

    #[tokio::test]
    async fn mismatched_voice_order_is_rejected() {
        let state = state();
        let mut debate = state.research_debate().clone();
        let engine = DebateEngine::new(
            DebateKind::Research,
            vec![
                ("bear".to_string(), Arc::new(ScriptedVoice::new("bear")) as Arc<dyn DebateVoice>),
                ("bull".to_string(), Arc::new(ScriptedVoice::new("bull")) as Arc<dyn DebateVoice>),
            ],
            Arc::new(ScriptedJudge::never_deciding("HOLD")),
            1,
        );

        let err = engine
            .run(&state, &mut debate, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}

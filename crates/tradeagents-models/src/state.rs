use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::debate::{DebateKind, DebateState};
use crate::error::StateError;
use crate::market::MarketContext;
use crate::memory::MemoryMatch;
use crate::transcript::{Transcript, TranscriptEntry};

pub const RESEARCH_VOICES: [&str; 2] = ["bull", "bear"];
pub const RISK_VOICES: [&str; 3] = ["aggressive", "neutral", "conservative"];

/// The report slot an analyst stage owns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Market,
    Sentiment,
    News,
    Fundamentals,
    /// Optional market-specific specialist (e.g. domestic market structure).
    Specialist,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::Market,
        ReportKind::Sentiment,
        ReportKind::News,
        ReportKind::Fundamentals,
        ReportKind::Specialist,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            ReportKind::Market => "market_report",
            ReportKind::Sentiment => "sentiment_report",
            ReportKind::News => "news_report",
            ReportKind::Fundamentals => "fundamentals_report",
            ReportKind::Specialist => "specialist_report",
        }
    }
}

/// One text report per analyst role. `None` until the owning stage writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalystReports {
    pub market_report: Option<String>,
    pub sentiment_report: Option<String>,
    pub news_report: Option<String>,
    pub fundamentals_report: Option<String>,
    pub specialist_report: Option<String>,
}

impl AnalystReports {
    pub fn get(&self, kind: ReportKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    fn slot(&self, kind: ReportKind) -> &Option<String> {
        match kind {
            ReportKind::Market => &self.market_report,
            ReportKind::Sentiment => &self.sentiment_report,
            ReportKind::News => &self.news_report,
            ReportKind::Fundamentals => &self.fundamentals_report,
            ReportKind::Specialist => &self.specialist_report,
        }
    }

    fn slot_mut(&mut self, kind: ReportKind) -> &mut Option<String> {
        match kind {
            ReportKind::Market => &mut self.market_report,
            ReportKind::Sentiment => &mut self.sentiment_report,
            ReportKind::News => &mut self.news_report,
            ReportKind::Fundamentals => &mut self.fundamentals_report,
            ReportKind::Specialist => &mut self.specialist_report,
        }
    }

    /// Written reports in fixed kind order.
    pub fn written(&self) -> Vec<(ReportKind, &str)> {
        ReportKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).map(|text| (*k, text)))
            .collect()
    }

    /// The situation description used for memory retrieval: the four core
    /// reports joined in order. Missing reports are skipped.
    pub fn situation(&self) -> String {
        [
            ReportKind::Market,
            ReportKind::Sentiment,
            ReportKind::News,
            ReportKind::Fundamentals,
        ]
        .iter()
        .filter_map(|k| self.get(*k))
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

/// The single mutable record for one analysis run.
///
/// Every field outside the identity is write-once; all writes go through
/// methods that enforce single-writer and terminal-state rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedState {
    instrument_id: String,
    as_of_date: NaiveDate,
    originating_stage: Option<String>,
    market: MarketContext,
    reports: AnalystReports,
    research_debate: DebateState,
    investment_plan: Option<String>,
    trader_plan: Option<String>,
    risk_debate: DebateState,
    final_decision: Option<String>,
    transcript: Transcript,
}

impl SharedState {
    pub fn new(instrument_id: impl Into<String>, as_of_date: NaiveDate, market: MarketContext) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            as_of_date,
            originating_stage: None,
            market,
            reports: AnalystReports::default(),
            research_debate: DebateState::new(RESEARCH_VOICES),
            investment_plan: None,
            trader_plan: None,
            risk_debate: DebateState::new(RISK_VOICES),
            final_decision: None,
            transcript: Transcript::new(),
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn originating_stage(&self) -> Option<&str> {
        self.originating_stage.as_deref()
    }

    pub fn market(&self) -> &MarketContext {
        &self.market
    }

    pub fn reports(&self) -> &AnalystReports {
        &self.reports
    }

    pub fn report(&self, kind: ReportKind) -> Option<&str> {
        self.reports.get(kind)
    }

    pub fn debate(&self, kind: DebateKind) -> &DebateState {
        match kind {
            DebateKind::Research => &self.research_debate,
            DebateKind::Risk => &self.risk_debate,
        }
    }

    pub fn research_debate(&self) -> &DebateState {
        &self.research_debate
    }

    pub fn risk_debate(&self) -> &DebateState {
        &self.risk_debate
    }

    pub fn investment_plan(&self) -> Option<&str> {
        self.investment_plan.as_deref()
    }

    pub fn trader_plan(&self) -> Option<&str> {
        self.trader_plan.as_deref()
    }

    pub fn final_decision(&self) -> Option<&str> {
        self.final_decision.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// A run is complete once the final decision is set.
    pub fn is_terminal(&self) -> bool {
        self.final_decision.is_some()
    }

    /// Check both debates: configured voice sets and round invariants.
    ///
    /// Needed before continuing from a state that was deserialized rather
    /// than built up through the write methods.
    pub fn validate(&self) -> Result<(), StateError> {
        for (debate, voices) in [
            (&self.research_debate, &RESEARCH_VOICES[..]),
            (&self.risk_debate, &RISK_VOICES[..]),
        ] {
            if debate.voices() != voices {
                return Err(StateError::RoundMismatch {
                    expected: voices.iter().map(|v| v.to_string()).collect(),
                    actual: debate.voices().to_vec(),
                });
            }
            debate.check_consistency()?;
        }
        Ok(())
    }

    fn ensure_open(&self, field: &str) -> Result<(), StateError> {
        if self.is_terminal() {
            return Err(StateError::TerminalStateViolation {
                field: field.to_string(),
            });
        }
        Ok(())
    }

    pub fn write_report(
        &mut self,
        kind: ReportKind,
        text: String,
        sender: &str,
    ) -> Result<(), StateError> {
        self.ensure_open(kind.field_name())?;
        write_once(self.reports.slot_mut(kind), kind.field_name(), text)?;
        self.originating_stage = Some(sender.to_string());
        Ok(())
    }

    pub fn set_investment_plan(&mut self, text: String, sender: &str) -> Result<(), StateError> {
        self.ensure_open("investment_plan")?;
        write_once(&mut self.investment_plan, "investment_plan", text)?;
        self.originating_stage = Some(sender.to_string());
        Ok(())
    }

    pub fn set_trader_plan(&mut self, text: String, sender: &str) -> Result<(), StateError> {
        self.ensure_open("trader_plan")?;
        write_once(&mut self.trader_plan, "trader_plan", text)?;
        self.originating_stage = Some(sender.to_string());
        Ok(())
    }

    /// Sets the terminal field. After this every write is rejected.
    pub fn set_final_decision(&mut self, text: String, sender: &str) -> Result<(), StateError> {
        self.ensure_open("final_decision")?;
        write_once(&mut self.final_decision, "final_decision", text)?;
        self.originating_stage = Some(sender.to_string());
        Ok(())
    }

    /// Install a debate state advanced outside of `self` (by the debate engine).
    pub fn commit_debate(
        &mut self,
        kind: DebateKind,
        debate: DebateState,
        sender: &str,
    ) -> Result<(), StateError> {
        self.ensure_open(kind.as_str())?;
        let current = self.debate(kind);

        if debate.voices() != current.voices() {
            return Err(StateError::RoundMismatch {
                expected: current.voices().to_vec(),
                actual: debate.voices().to_vec(),
            });
        }
        if debate.round_count() < current.round_count() {
            return Err(StateError::RoundRegression {
                debate: kind.to_string(),
                current: current.round_count(),
                proposed: debate.round_count(),
            });
        }
        if current.is_decided() && debate.judge_decision() != current.judge_decision() {
            return Err(StateError::DebateAlreadyDecided {
                debate: kind.to_string(),
            });
        }

        match kind {
            DebateKind::Research => self.research_debate = debate,
            DebateKind::Risk => self.risk_debate = debate,
        }
        self.originating_stage = Some(sender.to_string());
        Ok(())
    }

    pub fn append_transcript(&mut self, entry: TranscriptEntry) -> Result<(), StateError> {
        self.ensure_open("transcript")?;
        self.transcript.push(entry);
        Ok(())
    }

    /// Read-only projection handed to stages.
    pub fn view(&self) -> StateView {
        StateView {
            instrument_id: self.instrument_id.clone(),
            as_of_date: self.as_of_date,
            market: self.market.clone(),
            reports: self.reports.clone(),
            investment_plan: self.investment_plan.clone(),
            trader_plan: self.trader_plan.clone(),
            research_history: self.research_debate.merged_history().to_string(),
            research_decision: self.research_debate.judge_decision().map(str::to_string),
            risk_history: self.risk_debate.merged_history().to_string(),
            risk_decision: self.risk_debate.judge_decision().map(str::to_string),
            debate: None,
            memories: Vec::new(),
        }
    }

    /// Projection for a debate in progress. `debate` is the last committed
    /// state, so no voice can see a turn from the round being played.
    pub fn debate_view(&self, kind: DebateKind, debate: &DebateState) -> StateView {
        let mut view = self.view();
        match kind {
            DebateKind::Research => {
                view.research_history = debate.merged_history().to_string();
                view.research_decision = debate.judge_decision().map(str::to_string);
            }
            DebateKind::Risk => {
                view.risk_history = debate.merged_history().to_string();
                view.risk_decision = debate.judge_decision().map(str::to_string);
            }
        }
        view.debate = Some(DebateSnapshot {
            kind,
            voice: None,
            round: debate.round_count() + 1,
            completed_rounds: debate.round_count(),
            merged_history: debate.merged_history().to_string(),
            own_history: String::new(),
            previous_responses: debate.current_responses().clone(),
            per_voice_history: debate.per_voice_history().clone(),
        });
        view
    }
}

fn write_once(slot: &mut Option<String>, field: &str, value: String) -> Result<(), StateError> {
    if slot.is_some() {
        return Err(StateError::FieldAlreadyWritten {
            field: field.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}

/// Debate context visible to a voice or judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateSnapshot {
    pub kind: DebateKind,
    /// The voice about to speak, if any.
    pub voice: Option<String>,
    /// 1-based number of the round being played.
    pub round: u32,
    pub completed_rounds: u32,
    pub merged_history: String,
    pub own_history: String,
    /// Each voice's turn from the last completed round.
    pub previous_responses: BTreeMap<String, String>,
    per_voice_history: BTreeMap<String, Vec<String>>,
}

impl DebateSnapshot {
    /// Other voices' turns from the last completed round.
    pub fn opponent_responses(&self) -> Vec<(&str, &str)> {
        self.previous_responses
            .iter()
            .filter(|(voice, _)| Some(voice.as_str()) != self.voice.as_deref())
            .map(|(voice, text)| (voice.as_str(), text.as_str()))
            .collect()
    }
}

/// Owned, read-only snapshot of a [`SharedState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateView {
    pub instrument_id: String,
    pub as_of_date: NaiveDate,
    pub market: MarketContext,
    pub reports: AnalystReports,
    pub investment_plan: Option<String>,
    pub trader_plan: Option<String>,
    pub research_history: String,
    pub research_decision: Option<String>,
    pub risk_history: String,
    pub risk_decision: Option<String>,
    pub debate: Option<DebateSnapshot>,
    /// Similar past situations; populated for the Execution layer.
    pub memories: Vec<MemoryMatch>,
}

impl StateView {
    /// Narrow a debate view to the voice about to speak.
    pub fn speaking_as(mut self, voice: &str) -> Self {
        if let Some(snapshot) = self.debate.as_mut() {
            snapshot.voice = Some(voice.to_string());
            snapshot.own_history = snapshot
                .per_voice_history
                .get(voice)
                .map(|turns| {
                    turns
                        .iter()
                        .map(|t| format!("{voice}: {t}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
        }
        self
    }

    pub fn with_memories(mut self, memories: Vec<MemoryMatch>) -> Self {
        self.memories = memories;
        self
    }
}

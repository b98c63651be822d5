use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Which of the two debates a `DebateState` belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebateKind {
    Research,
    Risk,
}

impl DebateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateKind::Research => "research_debate",
            DebateKind::Risk => "risk_debate",
        }
    }
}

impl std::fmt::Display for DebateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round-based debate record, generic over its voice set.
///
/// Mutated only through [`DebateState::commit_round`] and
/// [`DebateState::set_judge_decision`], which keep the derived fields
/// consistent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebateState {
    /// Speaking order, fixed when the debate is configured.
    voices: Vec<String>,
    per_voice_history: BTreeMap<String, Vec<String>>,
    merged_history: String,
    current_responses: BTreeMap<String, String>,
    last_speaker: Option<String>,
    judge_decision: Option<String>,
    round_count: u32,
}

impl DebateState {
    pub fn new<I, S>(voices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let voices: Vec<String> = voices.into_iter().map(Into::into).collect();
        let per_voice_history = voices.iter().map(|v| (v.clone(), Vec::new())).collect();
        Self {
            voices,
            per_voice_history,
            merged_history: String::new(),
            current_responses: BTreeMap::new(),
            last_speaker: None,
            judge_decision: None,
            round_count: 0,
        }
    }

    pub fn voices(&self) -> &[String] {
        &self.voices
    }

    pub fn per_voice_history(&self) -> &BTreeMap<String, Vec<String>> {
        &self.per_voice_history
    }

    pub fn merged_history(&self) -> &str {
        &self.merged_history
    }

    pub fn current_responses(&self) -> &BTreeMap<String, String> {
        &self.current_responses
    }

    pub fn current_response(&self, voice: &str) -> Option<&str> {
        self.current_responses.get(voice).map(String::as_str)
    }

    pub fn last_speaker(&self) -> Option<&str> {
        self.last_speaker.as_deref()
    }

    pub fn judge_decision(&self) -> Option<&str> {
        self.judge_decision.as_deref()
    }

    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    pub fn is_decided(&self) -> bool {
        self.judge_decision.is_some()
    }

    /// All turns of one voice, rendered the same way as the merged history.
    pub fn voice_transcript(&self, voice: &str) -> String {
        self.per_voice_history
            .get(voice)
            .map(|turns| {
                turns
                    .iter()
                    .map(|t| render_turn(voice, t))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// Commit one complete round. `turns` must contain every voice exactly
    /// once, in configured order; otherwise nothing is recorded.
    pub fn commit_round(&mut self, turns: Vec<(String, String)>) -> Result<(), StateError> {
        if self.judge_decision.is_some() {
            return Err(StateError::DebateAlreadyDecided {
                debate: self.voices.join("/"),
            });
        }

        let actual: Vec<String> = turns.iter().map(|(voice, _)| voice.clone()).collect();
        if actual != self.voices {
            return Err(StateError::RoundMismatch {
                expected: self.voices.clone(),
                actual,
            });
        }

        for (voice, text) in turns {
            self.per_voice_history
                .entry(voice.clone())
                .or_default()
                .push(text.clone());
            self.current_responses.insert(voice.clone(), text);
            self.last_speaker = Some(voice);
        }
        self.round_count += 1;
        self.merged_history = self.render_merged_history();
        Ok(())
    }

    /// Record the judge's decision. Allowed once per debate.
    pub fn set_judge_decision(&mut self, decision: String) -> Result<(), StateError> {
        if self.judge_decision.is_some() {
            return Err(StateError::DebateAlreadyDecided {
                debate: self.voices.join("/"),
            });
        }
        self.judge_decision = Some(decision);
        Ok(())
    }

    /// Check the derived fields against the per-voice turns.
    ///
    /// Always holds for a debate built through `commit_round`; a
    /// deserialized debate may not.
    pub fn check_consistency(&self) -> Result<(), StateError> {
        let inconsistent = |reason: String| StateError::InconsistentDebate {
            debate: self.voices.join("/"),
            reason,
        };

        if self.per_voice_history.len() != self.voices.len() {
            return Err(inconsistent(format!(
                "history kept for {:?}, voices are {:?}",
                self.per_voice_history.keys().collect::<Vec<_>>(),
                self.voices
            )));
        }
        for voice in &self.voices {
            let turns = self
                .per_voice_history
                .get(voice)
                .ok_or_else(|| inconsistent(format!("no history for {voice}")))?;
            if turns.len() != self.round_count as usize {
                return Err(inconsistent(format!(
                    "{voice} has {} turns after {} rounds",
                    turns.len(),
                    self.round_count
                )));
            }
            if self.current_responses.get(voice) != turns.last() {
                return Err(inconsistent(format!(
                    "current response of {voice} is not its last turn"
                )));
            }
        }
        if self.current_responses.len() > self.voices.len() {
            return Err(inconsistent("responses from unknown voices".to_string()));
        }
        let expected_speaker = if self.round_count == 0 {
            None
        } else {
            self.voices.last()
        };
        if self.last_speaker.as_ref() != expected_speaker {
            return Err(inconsistent(format!(
                "last speaker {:?}, expected {:?}",
                self.last_speaker, expected_speaker
            )));
        }
        if self.merged_history != self.render_merged_history() {
            return Err(inconsistent(
                "merged history does not match per-voice turns".to_string(),
            ));
        }
        Ok(())
    }

    /// Rebuild the merged history from per-voice turns: round by round,
    /// each round in speaking order.
    pub fn render_merged_history(&self) -> String {
        let mut lines = Vec::new();
        for round in 0..self.round_count as usize {
            for voice in &self.voices {
                if let Some(text) = self
                    .per_voice_history
                    .get(voice)
                    .and_then(|turns| turns.get(round))
                {
                    lines.push(render_turn(voice, text));
                }
            }
        }
        lines.join("\n")
    }
}

fn render_turn(voice: &str, text: &str) -> String {
    format!("{voice}: {text}")
}

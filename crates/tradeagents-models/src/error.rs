use thiserror::Error;

/// Violations of the shared-state ownership rules.
///
/// These indicate an orchestration bug, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Field already written: {field}")]
    FieldAlreadyWritten { field: String },

    #[error("State is terminal; rejected write to {field}")]
    TerminalStateViolation { field: String },

    #[error("Debate already decided: {debate}")]
    DebateAlreadyDecided { debate: String },

    #[error("Round mismatch: expected voices {expected:?}, got {actual:?}")]
    RoundMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Debate {debate} is inconsistent: {reason}")]
    InconsistentDebate { debate: String, reason: String },

    #[error("Debate {debate} would regress from round {current} to {proposed}")]
    RoundRegression {
        debate: String,
        current: u32,
        proposed: u32,
    },
}

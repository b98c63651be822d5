use thiserror::Error;
use tradeagents_models::StateError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Stage {stage} timed out after {timeout_ms} ms")]
    Timeout { stage: String, timeout_ms: u64 },

    #[error("Stage {stage} failed: {cause}")]
    Stage { stage: String, cause: String },

    #[error("Voice {voice} failed in round {round}: {cause}")]
    Voice {
        voice: String,
        round: u32,
        cause: Box<AgentError>,
    },

    #[error("Debate {debate} completed no rounds; refusing to judge an empty history")]
    NoCompletedRounds { debate: String },

    #[error("No stage registered for role: {0}")]
    MissingStage(String),

    #[error("Run is already complete; no further stages may execute")]
    TerminalState,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Memory error: {0}")]
    Memory(#[from] tradeagents_memory::MemoryError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl AgentError {
    /// Wrap any error as a failure of the named stage.
    pub fn stage(stage: &str, cause: impl std::fmt::Display) -> Self {
        AgentError::Stage {
            stage: stage.to_string(),
            cause: cause.to_string(),
        }
    }
}

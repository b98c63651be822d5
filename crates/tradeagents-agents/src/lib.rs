pub mod debate;
pub mod error;
pub mod invoker;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod router;
pub mod run;
pub mod stage;

pub mod test_support;

pub use debate::{DebateEngine, DebateEvent, DebateReport};
pub use error::AgentError;
pub use invoker::{ClaudeCliInvoker, GatedInvoker, LlmInvoker, LlmRequest};
pub use llm::{llm_registry, LlmAnalyst, LlmJudge, LlmSynthesizer, LlmVoice};
pub use orchestrator::{Layer, LayerOrchestrator};
pub use router::{Classification, ToolRouter};
pub use run::RunHandle;
pub use stage::{AnalystStage, DebateVoice, Judge, StageKind, StageRegistry, Synthesizer};

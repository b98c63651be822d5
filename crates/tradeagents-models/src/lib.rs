pub mod config;
pub mod debate;
pub mod error;
pub mod market;
pub mod memory;
pub mod outcome;
pub mod state;
pub mod transcript;

pub use config::{AgentsConfig, AnalystConfig, MemoryConfig, RouterConfig, RunConfig, TradeAgentsConfig};
pub use debate::{DebateKind, DebateState};
pub use error::StateError;
pub use market::{MarketCategory, MarketContext};
pub use memory::{MemoryMatch, MemoryMetadata, MemoryRow};
pub use outcome::{FailureKind, RunOutcome, RunStatus, StageFailure};
pub use state::{AnalystReports, DebateSnapshot, ReportKind, SharedState, StateView};
pub use transcript::{Transcript, TranscriptEntry, TranscriptRole};

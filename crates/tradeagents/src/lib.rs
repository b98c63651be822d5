//! tradeagents - layered multi-agent trade decision orchestrator
//!
//! Analysts report in parallel, a bull/bear debate produces an investment
//! plan, the trader turns it into a proposal, a three-way risk debate
//! adjusts it and the risk manager issues the final decision. Every stage
//! is a Claude CLI agent reading a shared, write-once run state.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradeagents::models::{TradeAgentsConfig, RunConfig};
//! use tradeagents::agents::{LayerOrchestrator, StageRegistry, ToolRouter};
//! use tradeagents::memory::{MemoryDb, SqliteMemoryStore};
//! ```

pub use tradeagents_agents as agents;
pub use tradeagents_memory as memory;
pub use tradeagents_models as models;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;
use tradeagents_agents::{
    llm_registry, ClaudeCliInvoker, GatedInvoker, LayerOrchestrator, LlmInvoker, RunHandle,
    ToolRouter,
};
use tradeagents_memory::{MemoryDb, MemoryStore, SqliteMemoryStore};
use tradeagents_models::TradeAgentsConfig;

/// Open the memory store described by `config.memory`.
///
/// A disabled memory is an in-process SQLite database: lookups return
/// nothing and recorded outcomes vanish with the process.
pub fn build_memory(config: &TradeAgentsConfig) -> Result<Arc<dyn MemoryStore>, anyhow::Error> {
    let memory = &config.memory;
    let db = if memory.enabled {
        if let Some(parent) = std::path::Path::new(&memory.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        MemoryDb::open(&memory.sqlite_path)?
    } else {
        MemoryDb::open_in_memory()?
    };

    Ok(Arc::new(SqliteMemoryStore::new(
        db,
        &memory.collection,
        memory.vector_cache_capacity,
        Duration::from_secs(memory.vector_cache_ttl_seconds),
    )))
}

/// Build a LayerOrchestrator backed by the Claude CLI from configuration.
///
/// All stages share one gated invoker, so `llm_concurrency_limit` bounds
/// outstanding CLI calls across every run using this orchestrator.
pub fn build_orchestrator(config: &TradeAgentsConfig) -> Result<LayerOrchestrator, anyhow::Error> {
    config.run.validate().map_err(anyhow::Error::msg)?;

    let cli = Arc::new(ClaudeCliInvoker::new(Duration::from_secs(
        config.agents.cli_timeout_seconds,
    )));
    let invoker: Arc<dyn LlmInvoker> =
        Arc::new(GatedInvoker::new(cli, config.agents.llm_concurrency_limit));
    let registry = llm_registry(&config.agents, invoker);

    info!(
        stages = registry.len(),
        memory = config.memory.enabled,
        "Building orchestrator"
    );

    let orchestrator = LayerOrchestrator::from_registry(
        &registry,
        build_memory(config)?,
        ToolRouter::new(&config.router),
    )?
    .with_analyst_config(&config.agents.analysts);
    Ok(orchestrator)
}

/// Start a run on `orchestrator` with the configured run options.
pub fn start_run(
    orchestrator: &Arc<LayerOrchestrator>,
    config: &TradeAgentsConfig,
    instrument_id: &str,
    as_of_date: NaiveDate,
) -> RunHandle {
    orchestrator.start_run(instrument_id, as_of_date, config.run.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_memory_is_empty_and_in_process() {
        let config = TradeAgentsConfig {
            memory: tradeagents_models::MemoryConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let memory = build_memory(&config).unwrap();
        assert_eq!(memory.retrieve("anything", 3).await.unwrap().len(), 0);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config: TradeAgentsConfig =
            toml::from_str(include_str!("../../../config/tradeagents.toml")).unwrap();
        assert_eq!(config, TradeAgentsConfig::default());
    }

    #[test]
    fn invalid_run_config_is_rejected() {
        let mut config = TradeAgentsConfig::default();
        config.memory.enabled = false;
        config.run.concurrency_limit = 0;
        assert!(build_orchestrator(&config).is_err());
    }

    #[test]
    fn default_config_builds() {
        let mut config = TradeAgentsConfig::default();
        config.memory.enabled = false;
        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(
            orchestrator.analysts_for(models::MarketCategory::DomesticEquity).len(),
            5
        );
        assert_eq!(
            orchestrator.analysts_for(models::MarketCategory::HkEquity).len(),
            4
        );
    }
}

use serde::{Deserialize, Serialize};

use crate::market::MarketCategory;
use crate::state::ReportKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradeAgentsConfig {
    pub run: RunConfig,
    pub agents: AgentsConfig,
    pub memory: MemoryConfig,
    pub router: RouterConfig,
}

/// Per-run options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Full bull/bear rounds before the research judge is forced to decide.
    pub max_research_rounds: u32,
    /// Full aggressive/neutral/conservative rounds before the risk judge is forced.
    pub max_risk_rounds: u32,
    /// Number of similar past situations handed to the trader.
    pub memory_k: usize,
    /// Per-analyst timeout in milliseconds.
    pub analyst_timeout_ms: u64,
    /// Timeout for every other stage invocation (voice turn, judge, synthesizer).
    pub stage_timeout_ms: u64,
    /// Maximum number of analysts running at once.
    pub concurrency_limit: usize,
    /// How many times a failed debate round is replayed before forcing the judge.
    pub voice_retry_limit: u32,
    /// Record the final decision in memory once a run is done.
    pub record_decisions: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_research_rounds: 1,
            max_risk_rounds: 1,
            memory_k: 2,
            analyst_timeout_ms: 120_000,
            stage_timeout_ms: 180_000,
            concurrency_limit: 4,
            voice_retry_limit: 1,
            record_decisions: false,
        }
    }
}

impl RunConfig {
    /// Reject settings the orchestrator cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_research_rounds == 0 {
            return Err("max_research_rounds must be at least 1".to_string());
        }
        if self.max_risk_rounds == 0 {
            return Err("max_risk_rounds must be at least 1".to_string());
        }
        if self.concurrency_limit == 0 {
            return Err("concurrency_limit must be at least 1".to_string());
        }
        if self.analyst_timeout_ms == 0 || self.stage_timeout_ms == 0 {
            return Err("timeouts must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Configuration for the LLM-backed stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Model for analysts and debate voices.
    pub quick_model: String,
    /// Model for judges, managers and the trader.
    pub deep_model: String,
    /// Timeout for a single CLI invocation in seconds.
    pub cli_timeout_seconds: u64,
    /// Global cap on outstanding LLM calls, shared by all runs.
    pub llm_concurrency_limit: usize,
    pub analysts: Vec<AnalystConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            quick_model: "claude-3-5-haiku-latest".to_string(),
            deep_model: "claude-sonnet-4-5-20250929".to_string(),
            cli_timeout_seconds: 90,
            llm_concurrency_limit: 8,
            analysts: vec![
                AnalystConfig::new("market_analyst", ReportKind::Market),
                AnalystConfig::new("social_media_analyst", ReportKind::Sentiment),
                AnalystConfig::new("news_analyst", ReportKind::News),
                AnalystConfig::new("fundamentals_analyst", ReportKind::Fundamentals),
                AnalystConfig {
                    markets: Some(vec![MarketCategory::DomesticEquity]),
                    ..AnalystConfig::new("china_market_analyst", ReportKind::Specialist)
                },
            ],
        }
    }
}

/// Configuration for a single analyst stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub name: String,
    pub report: ReportKind,
    /// Override model for this analyst. Falls back to `AgentsConfig::quick_model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Markets this analyst applies to. `None` means every market.
    #[serde(default)]
    pub markets: Option<Vec<MarketCategory>>,
}

fn default_enabled() -> bool {
    true
}

impl AnalystConfig {
    pub fn new(name: &str, report: ReportKind) -> Self {
        Self {
            name: name.to_string(),
            report,
            model: None,
            enabled: true,
            markets: None,
        }
    }

    pub fn applies_to(&self, category: MarketCategory) -> bool {
        self.markets
            .as_ref()
            .map_or(true, |markets| markets.contains(&category))
    }
}

/// Configuration for the situation memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub sqlite_path: String,
    /// Collection name; one store per role memory.
    pub collection: String,
    /// Maximum number of cached term vectors.
    pub vector_cache_capacity: u64,
    pub vector_cache_ttl_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_path: "data/tradeagents_memory.db".to_string(),
            collection: "trader_memory".to_string(),
            vector_cache_capacity: 10_000,
            vector_cache_ttl_seconds: 3600,
        }
    }
}

/// Rule-table overrides for instrument classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Category used when no rule matches.
    pub default_category: MarketCategory,
    pub domestic_allow_list: Vec<String>,
    pub us_allow_list: Vec<String>,
    pub hk_allow_list: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_category: MarketCategory::DomesticEquity,
            domestic_allow_list: Vec::new(),
            us_allow_list: Vec::new(),
            hk_allow_list: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_config_matches_documented_defaults() {
        let run = RunConfig::default();
        assert_eq!(run.max_research_rounds, 1);
        assert_eq!(run.memory_k, 2);
        assert!(run.validate().is_ok());
    }

    #[test]
    fn zero_rounds_rejected() {
        let run = RunConfig {
            max_risk_rounds: 0,
            ..RunConfig::default()
        };
        assert!(run.validate().is_err());
    }

    #[test]
    fn default_analysts() {
        let agents = AgentsConfig::default();
        assert_eq!(agents.analysts.len(), 5);
        let specialist = agents
            .analysts
            .iter()
            .find(|a| a.report == ReportKind::Specialist)
            .unwrap();
        assert!(specialist.applies_to(MarketCategory::DomesticEquity));
        assert!(!specialist.applies_to(MarketCategory::UsEquity));
        assert!(agents.analysts[0].applies_to(MarketCategory::HkEquity));
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[run]
max_research_rounds = 2
max_risk_rounds = 1
memory_k = 3
concurrency_limit = 2

[agents]
quick_model = "claude-3-5-haiku-latest"
deep_model = "claude-sonnet-4-5-20250929"

[[agents.analysts]]
name = "market_analyst"
report = "market"

[[agents.analysts]]
name = "news_analyst"
report = "news"
enabled = false

[memory]
sqlite_path = "/tmp/memory.db"

[router]
default_category = "us_equity"
hk_allow_list = ["TENCENT"]
"#;

        let config: TradeAgentsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.run.max_research_rounds, 2);
        assert_eq!(config.run.analyst_timeout_ms, 120_000);
        assert_eq!(config.agents.analysts.len(), 2);
        assert!(!config.agents.analysts[1].enabled);
        assert_eq!(config.memory.sqlite_path, "/tmp/memory.db");
        assert_eq!(config.memory.collection, "trader_memory");
        assert_eq!(config.router.default_category, MarketCategory::UsEquity);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: TradeAgentsConfig = toml::from_str("").unwrap();
        assert_eq!(config, TradeAgentsConfig::default());
    }
}

use serde::{Deserialize, Serialize};

/// Closed set of markets an instrument can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    DomesticEquity,
    UsEquity,
    HkEquity,
}

impl MarketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::DomesticEquity => "domestic_equity",
            MarketCategory::UsEquity => "us_equity",
            MarketCategory::HkEquity => "hk_equity",
        }
    }
}

impl std::fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable routing result for one run. Every stage reads the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketContext {
    pub market_category: MarketCategory,
    pub currency_code: String,
    pub currency_symbol: String,
    /// Identifier of the data-access tool set downstream agents should use.
    pub tool_set_id: String,
}

impl MarketContext {
    /// The fixed currency/tool table for a category.
    pub fn for_category(category: MarketCategory) -> Self {
        let (code, symbol, tools) = match category {
            MarketCategory::DomesticEquity => ("CNY", "¥", "china_stock_tools"),
            MarketCategory::UsEquity => ("USD", "$", "us_stock_tools"),
            MarketCategory::HkEquity => ("HKD", "HK$", "hk_stock_tools"),
        };
        Self {
            market_category: category,
            currency_code: code.to_string(),
            currency_symbol: symbol.to_string(),
            tool_set_id: tools.to_string(),
        }
    }
}

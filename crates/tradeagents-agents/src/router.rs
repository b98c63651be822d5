//! Instrument classification into market categories.
//!
//! Classification is total: an identifier no rule recognises falls back to
//! the configured default category.

use std::collections::HashSet;

use tracing::debug;
use tradeagents_models::{MarketCategory, MarketContext, RouterConfig};

/// Exchange suffixes, checked case-insensitively after the last `.`.
const DOMESTIC_SUFFIXES: &[&str] = &["SS", "SH", "SZ", "BJ"];
const HK_SUFFIXES: &[&str] = &["HK"];
const US_SUFFIXES: &[&str] = &["US", "O", "N"];

/// Result of classifying one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: MarketCategory,
    /// False when the default category was applied.
    pub matched: bool,
}

#[derive(Debug, Clone)]
pub struct ToolRouter {
    default_category: MarketCategory,
    domestic: HashSet<String>,
    us: HashSet<String>,
    hk: HashSet<String>,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl ToolRouter {
    pub fn new(config: &RouterConfig) -> Self {
        let normalize = |ids: &[String]| ids.iter().map(|id| id.trim().to_uppercase()).collect();
        Self {
            default_category: config.default_category,
            domestic: normalize(&config.domestic_allow_list),
            us: normalize(&config.us_allow_list),
            hk: normalize(&config.hk_allow_list),
        }
    }

    /// Market category for an instrument identifier. Never fails.
    pub fn classify(&self, instrument_id: &str) -> MarketCategory {
        self.classify_detailed(instrument_id).category
    }

    /// Like [`classify`](Self::classify) but reports whether a rule matched.
    pub fn classify_detailed(&self, instrument_id: &str) -> Classification {
        let id = instrument_id.trim().to_uppercase();

        match self.match_rules(&id) {
            Some(category) => Classification {
                category,
                matched: true,
            },
            None => {
                debug!(
                    instrument = instrument_id,
                    default = %self.default_category,
                    "No routing rule matched; using default category"
                );
                Classification {
                    category: self.default_category,
                    matched: false,
                }
            }
        }
    }

    /// Currency, symbol and tool-set for the instrument's market.
    pub fn context(&self, instrument_id: &str) -> MarketContext {
        MarketContext::for_category(self.classify(instrument_id))
    }

    fn match_rules(&self, id: &str) -> Option<MarketCategory> {
        if id.is_empty() {
            return None;
        }

        if self.domestic.contains(id) {
            return Some(MarketCategory::DomesticEquity);
        }
        if self.hk.contains(id) {
            return Some(MarketCategory::HkEquity);
        }
        if self.us.contains(id) {
            return Some(MarketCategory::UsEquity);
        }

        if let Some((code, suffix)) = id.rsplit_once('.') {
            if !code.is_empty() {
                if DOMESTIC_SUFFIXES.contains(&suffix) {
                    return Some(MarketCategory::DomesticEquity);
                }
                if HK_SUFFIXES.contains(&suffix) {
                    return Some(MarketCategory::HkEquity);
                }
                if US_SUFFIXES.contains(&suffix) {
                    return Some(MarketCategory::UsEquity);
                }
            }
        }

        let all_digits = id.bytes().all(|b| b.is_ascii_digit());
        if all_digits && id.len() == 6 {
            return Some(MarketCategory::DomesticEquity);
        }
        if all_digits && (4..=5).contains(&id.len()) {
            return Some(MarketCategory::HkEquity);
        }
        if is_us_ticker(id) {
            return Some(MarketCategory::UsEquity);
        }
        None
    }
}

/// 1-5 letters, optionally followed by one `.` or `-` share-class part of
/// 1-2 letters (e.g. `BRK.B`, `BF-B`).
fn is_us_ticker(id: &str) -> bool {
    let letters = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase());

    match id.split_once(['.', '-']) {
        Some((root, class)) => {
            letters(root) && root.len() <= 5 && letters(class) && class.len() <= 2
        }
        None => letters(id) && id.len() <= 5,
    }
}

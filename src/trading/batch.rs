//! Per-symbol batch results and symbol list helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::exchange::PositionSide;

pub const ALREADY_OPEN: &str = "已有仓位";
pub const IGNORED: &str = "币种已忽略";
pub const NO_POSITION: &str = "该币种没有持仓";
pub const RETRY_SUCCEEDED: &str = "增加仓位后成功";

/// Outcome of one symbol within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOutcome {
    #[serde(rename_all = "camelCase")]
    Success {
        order_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Skipped {
        message: String,
    },
    Failed {
        message: String,
    },
    Closed,
}

/// Result record for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolResult {
    pub symbol: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl SymbolResult {
    pub fn success(symbol: &str, order_id: i64) -> Self {
        Self::new(
            symbol,
            BatchOutcome::Success {
                order_id,
                message: None,
            },
        )
    }

    pub fn retried(symbol: &str, order_id: i64) -> Self {
        Self::new(
            symbol,
            BatchOutcome::Success {
                order_id,
                message: Some(RETRY_SUCCEEDED.to_string()),
            },
        )
    }

    pub fn skipped(symbol: &str, message: &str) -> Self {
        Self::new(
            symbol,
            BatchOutcome::Skipped {
                message: message.to_string(),
            },
        )
    }

    pub fn failed(symbol: &str, message: impl Into<String>) -> Self {
        Self::new(
            symbol,
            BatchOutcome::Failed {
                message: message.into(),
            },
        )
    }

    pub fn closed(symbol: &str) -> Self {
        Self::new(symbol, BatchOutcome::Closed)
    }

    fn new(symbol: &str, outcome: BatchOutcome) -> Self {
        Self {
            symbol: symbol.to_string(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Success { .. } | BatchOutcome::Closed)
    }
}

/// Which positions a close request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseFilter {
    Long,
    Short,
    All,
}

impl CloseFilter {
    pub fn matches(&self, side: PositionSide) -> bool {
        match self {
            CloseFilter::All => true,
            CloseFilter::Long => side == PositionSide::Long,
            CloseFilter::Short => side == PositionSide::Short,
        }
    }
}

impl std::str::FromStr for CloseFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(CloseFilter::Long),
            "SHORT" => Ok(CloseFilter::Short),
            "ALL" => Ok(CloseFilter::All),
            other => anyhow::bail!("Invalid close type: {}", other),
        }
    }
}

/// Parse a trade direction. Only LONG and SHORT open positions.
pub fn parse_side(s: &str) -> anyhow::Result<PositionSide> {
    match s.trim().to_uppercase().as_str() {
        "LONG" => Ok(PositionSide::Long),
        "SHORT" => Ok(PositionSide::Short),
        other => anyhow::bail!("Invalid side: {}", other),
    }
}

/// Exchange symbol for user input: `btc/usdt:usdt` and `BTCUSDT` both map to
/// `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    let symbol = symbol.trim();
    let symbol = symbol.split(':').next().unwrap_or(symbol);
    symbol.replace('/', "").to_uppercase()
}

/// Base asset of a USDT-quoted symbol (`1000PEPEUSDT` → `1000PEPE`).
pub fn base_asset(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if let Some((base, _)) = upper.split_once('/') {
        return base.to_string();
    }
    match upper.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => upper,
    }
}

/// Base assets that are never traded, from a whitespace-separated list.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList(HashSet<String>);

impl IgnoreList {
    pub fn parse(list: &str) -> Self {
        Self(list.split_whitespace().map(str::to_uppercase).collect())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.contains(&base_asset(symbol))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serialization() {
        let value = serde_json::to_value(SymbolResult::success("BTCUSDT", 42)).unwrap();
        assert_eq!(value, json!({"symbol": "BTCUSDT", "status": "SUCCESS", "orderId": 42}));

        let value = serde_json::to_value(SymbolResult::retried("BTCUSDT", 43)).unwrap();
        assert_eq!(value["message"], "增加仓位后成功");

        let value = serde_json::to_value(SymbolResult::skipped("ETHUSDT", ALREADY_OPEN)).unwrap();
        assert_eq!(value, json!({"symbol": "ETHUSDT", "status": "SKIPPED", "message": "已有仓位"}));

        let value = serde_json::to_value(SymbolResult::closed("SOLUSDT")).unwrap();
        assert_eq!(value, json!({"symbol": "SOLUSDT", "status": "CLOSED"}));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BTC/USDT:USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol(" ethusdt "), "ETHUSDT");
        assert_eq!(normalize_symbol("1000PEPE/USDT"), "1000PEPEUSDT");
    }

    #[test]
    fn test_base_asset() {
        assert_eq!(base_asset("BTCUSDT"), "BTC");
        assert_eq!(base_asset("1000PEPEUSDT"), "1000PEPE");
        assert_eq!(base_asset("SOL/USDT:USDT"), "SOL");
        assert_eq!(base_asset("USDT"), "USDT");
    }

    #[test]
    fn test_ignore_list_case_insensitive() {
        let ignored = IgnoreList::parse("  doge\tPEPE\n shib ");
        assert!(ignored.contains("DOGEUSDT"));
        assert!(ignored.contains("pepe/usdt:usdt"));
        assert!(ignored.contains("SHIBUSDT"));
        assert!(!ignored.contains("BTCUSDT"));
        assert!(IgnoreList::parse("   ").is_empty());
    }

    #[test]
    fn test_close_filter() {
        assert!(CloseFilter::All.matches(PositionSide::Short));
        assert!(CloseFilter::Long.matches(PositionSide::Long));
        assert!(!CloseFilter::Long.matches(PositionSide::Short));
        assert_eq!("short".parse::<CloseFilter>().unwrap(), CloseFilter::Short);
        assert!("BOTH".parse::<CloseFilter>().is_err());
    }

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side("long").unwrap(), PositionSide::Long);
        assert!(parse_side("BOTH").is_err());
    }
}

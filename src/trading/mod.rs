//! Trading logic.
//!
//! Contains the core logic for:
//! - Position sizing against exchange limits
//! - Take-profit / stop-loss trigger derivation
//! - Batch open / add / close execution with typed per-symbol results
//! - Ranking lists and the positions reader

mod batch;
mod executor;
mod positions;
mod ranking;
pub mod sizing;
pub mod tpsl;

pub use batch::{
    base_asset, normalize_symbol, parse_side, BatchOutcome, CloseFilter, IgnoreList, SymbolResult,
    ALREADY_OPEN, IGNORED, NO_POSITION, RETRY_SUCCEEDED,
};
pub use executor::BatchExecutor;
pub use positions::{PositionReader, PositionView, PositionsSnapshot};
pub use ranking::{format_market_cap, format_volume, MarketRanker, RankingItem, Rankings};
pub use tpsl::TriggerPrices;

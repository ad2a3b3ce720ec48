pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod types;
pub mod utils;

pub use crate::config::{AppConfig, HistoryConfig};
pub use crate::core::engine::TradeHistoryEngine;
pub use crate::core::feed::TickFeed;
pub use crate::core::snapshot::HistorySnapshot;
pub use crate::core::traits::{TradeHistory, UpdatableTradeHistory};
pub use crate::error::HistoryError;
pub use crate::types::{ChangeSummary, DataPoint, RangeBounds, Tick, TickRange, Timestamp};

// src/core/feed.rs
use crate::core::engine::TradeHistoryEngine;
use crate::core::traits::{TradeHistory, UpdatableTradeHistory};
use crate::types::Tick;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Drains a tick channel into an engine until every sender is gone.
pub struct TickFeed {
    engine: Arc<TradeHistoryEngine>,
    tick_receiver: mpsc::Receiver<Tick>,
}

impl TickFeed {
    pub fn new(engine: Arc<TradeHistoryEngine>, tick_receiver: mpsc::Receiver<Tick>) -> Self {
        Self {
            engine,
            tick_receiver,
        }
    }

    /// Returns the number of ticks ingested.
    pub async fn run(&mut self) -> Result<usize> {
        info!(symbol = %self.engine.symbol(), "Tick feed running");

        let mut ingested = 0;
        while let Some(tick) = self.tick_receiver.recv().await {
            if tick.symbol != self.engine.symbol() {
                warn!(
                    expected = %self.engine.symbol(),
                    received = %tick.symbol,
                    "Dropping tick for another symbol"
                );
                continue;
            }
            self.engine.add_tick(tick, None);
            ingested += 1;
        }

        info!(symbol = %self.engine.symbol(), ingested, "Tick channel closed, feed stopped");
        Ok(ingested)
    }
}

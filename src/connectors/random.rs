use crate::connectors::traits::TickSource;
use crate::types::Tick;
use crate::utils::tick_generator::RandomTickGenerator;
use anyhow::{ensure, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Synthetic live feed: a random walk emitted on a fixed interval.
pub struct RandomTickSource {
    symbol: String,
    period: Duration,
    limit: Option<usize>,
    seed: Option<u64>,
}

impl RandomTickSource {
    pub fn new(symbol: impl Into<String>, period: Duration) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            limit: None,
            seed: None,
        }
    }

    /// Stop after `limit` ticks instead of running until the receiver goes away.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn generator(&self) -> RandomTickGenerator {
        match self.seed {
            Some(seed) => RandomTickGenerator::seeded(self.symbol.clone(), seed),
            None => RandomTickGenerator::new(self.symbol.clone()),
        }
    }
}

#[async_trait]
impl TickSource for RandomTickSource {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn subscribe_ticks(&mut self, sender: mpsc::Sender<Tick>) -> Result<()> {
        ensure!(!self.period.is_zero(), "tick period must be positive");

        let mut generator = self.generator();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let limit = self.limit;
        let symbol = self.symbol.clone();

        info!(%symbol, period_ms = self.period.as_millis() as u64, "Starting random tick task");
        tokio::spawn(async move {
            let mut sent = 0usize;
            while limit.map_or(true, |limit| sent < limit) {
                ticker.tick().await;
                if sender.send(generator.next_tick()).await.is_err() {
                    debug!(%symbol, "Tick receiver dropped");
                    break;
                }
                sent += 1;
            }
            info!(%symbol, sent, "Random tick task finished");
        });

        Ok(())
    }
}

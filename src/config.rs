// src/config.rs

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Retention policy for a single instrument's history.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_data_points_to_keep: usize,
    // Applies while a buy signal is unresolved
    pub max_data_points_to_keep_with_buy_signal: usize,
    pub max_data_point_age_minutes: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_data_points_to_keep: 450,
            max_data_points_to_keep_with_buy_signal: 10_000,
            max_data_point_age_minutes: 35,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub symbol: String,
    pub segment_count: usize,
    pub tick_interval_ms: u64,
    pub render_interval_ms: u64,
    pub log_level: String,
    pub log_file: String,
    pub history_file: String,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("symbol", "BTCUSDT")?
            .set_default("segment_count", 120)?
            .set_default("tick_interval_ms", 250)?
            .set_default("render_interval_ms", 1000)?
            .set_default("log_level", "info")?
            .set_default("log_file", "tick_history.log")?
            .set_default("history_file", "tick_history.json")?
            .add_source(File::with_name("Settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

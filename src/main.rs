// src/main.rs
use anyhow::{Context, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tick_history::connectors::random::RandomTickSource;
use tick_history::connectors::traits::TickSource;
use tick_history::{
    AppConfig, HistorySnapshot, TickFeed, TickRange, TradeHistory, TradeHistoryEngine,
    UpdatableTradeHistory,
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Standard deviations above the baseline that count as a breakout.
const BREAKOUT_DEVIATIONS: Decimal = Decimal::TWO;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = AppConfig::new().context("failed to load configuration")?;
    let _log_guard = init_logging(&config)?;

    println!("========================================");
    println!("       TICK HISTORY - v0.1.0");
    println!("========================================");
    println!("Symbol:   {}", config.symbol);
    println!("Segments: {}", config.segment_count);
    println!("Log file: {}", config.log_file);
    println!("========================================");

    let engine = Arc::new(TradeHistoryEngine::with_config(
        config.symbol.clone(),
        config.history.clone(),
    ));
    load_history(&engine, &config.history_file).await;

    let (tick_tx, tick_rx) = mpsc::channel(256);
    let mut source = RandomTickSource::new(
        config.symbol.clone(),
        Duration::from_millis(config.tick_interval_ms),
    );
    source
        .subscribe_ticks(tick_tx)
        .await
        .context("failed to start tick source")?;

    let render_task = tokio::spawn(render_loop(
        Arc::clone(&engine),
        engine.subscribe(),
        config.segment_count,
        Duration::from_millis(config.render_interval_ms),
    ));

    let mut feed = TickFeed::new(Arc::clone(&engine), tick_rx);
    tokio::select! {
        result = feed.run() => {
            let ingested = result?;
            info!(ingested, "Feed finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
        }
    }

    render_task.abort();
    save_history(&engine, &config.history_file).await;
    Ok(())
}

async fn load_history(engine: &TradeHistoryEngine, path: &str) {
    let Ok(data) = tokio::fs::read_to_string(path).await else {
        return;
    };
    match serde_json::from_str::<TickRange>(&data) {
        Ok(range) => {
            info!(points = range.data_points.len(), path, "Restored history");
            engine.set_tick_range(range);
        }
        Err(e) => warn!("Ignoring unreadable history file {}: {}", path, e),
    }
}

async fn save_history(engine: &TradeHistoryEngine, path: &str) {
    let range = engine.tick_range();
    info!(
        points = range.data_points.len(),
        high = ?range.high.as_ref().map(|p| p.price()),
        low = ?range.low.as_ref().map(|p| p.price()),
        "Saving history"
    );
    match serde_json::to_string_pretty(&range) {
        Ok(data) => {
            if let Err(e) = tokio::fs::write(path, data).await {
                error!("Failed to save history: {}", e);
            }
        }
        Err(e) => error!("Failed to serialize history: {}", e),
    }
}

fn init_logging(config: &AppConfig) -> Result<WorkerGuard> {
    let path = Path::new(&config.log_file);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("log_file must name a file")?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let fallback = config.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&fallback))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

/// Redraws (logs) the downsampled chart whenever the history changed, at most
/// once per `period`, and drives a simple breakout signal off the snapshot.
async fn render_loop(
    engine: Arc<TradeHistoryEngine>,
    mut updates: watch::Receiver<u64>,
    segment_count: usize,
    period: Duration,
) {
    let mut pacing = tokio::time::interval(period);
    loop {
        pacing.tick().await;
        if updates.changed().await.is_err() {
            error!("Engine update channel closed");
            break;
        }

        let snapshot = engine.snapshot();
        update_signals(engine.as_ref(), &snapshot);

        let chart = snapshot.data_points_across_segments(segment_count, true, true);
        info!(
            points = snapshot.len(),
            rendered = chart.len(),
            low = %engine.low(),
            high = %engine.high(),
            average = %engine.average_price(),
            std_dev = %engine.standard_deviation(),
            percent_in_view = %engine.percent_in_view().round_dp(2),
            "Chart refreshed"
        );
    }
}

fn update_signals(engine: &TradeHistoryEngine, snapshot: &HistorySnapshot) {
    let (Some(last), Some(baseline), Some(deviation)) = (
        snapshot.last_point(),
        snapshot.average_price_except_last_two(),
        snapshot.standard_deviation_except_last_two(),
    ) else {
        return;
    };

    if snapshot.buy_signals().is_empty() {
        if !deviation.is_zero() && last.price() > baseline + deviation * BREAKOUT_DEVIATIONS {
            engine.add_buy_signal(snapshot);
        }
        return;
    }

    let entry = snapshot.average_price_at_buy_signal();
    if last.price() < entry {
        engine.add_sell_signal(snapshot);
        engine.sold();
    }
}

// src/core/traits.rs
use crate::core::snapshot::HistorySnapshot;
use crate::error::HistoryError;
use crate::types::{DataPoint, RangeBounds, Tick, TickRange, Timestamp};
use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Read-only view of one instrument's trade history.
pub trait TradeHistory: Send + Sync {
    fn symbol(&self) -> &str;

    /// Consistent point-in-time copy. Cheap when nothing changed since the
    /// previous call.
    fn snapshot(&self) -> Arc<HistorySnapshot>;

    /// Snapshot restricted to the points inside `[start, end]`.
    fn truncated_snapshot(&self, start: Timestamp, end: Timestamp) -> Option<HistorySnapshot>;

    /// See [`HistorySnapshot::data_points_across_segments`].
    fn data_points_across_segments(
        &self,
        segment_count: usize,
        include_change_summaries: bool,
        distribute_across_flats: bool,
    ) -> Vec<DataPoint>;

    fn first_last_low_high(&self, start: Timestamp, end: Timestamp) -> Option<RangeBounds>;
    fn nearest_point_in_time(&self, time: Timestamp) -> Option<DataPoint>;
    fn points_in_range(&self, start: Timestamp, end: Timestamp) -> TickRange;
    fn points_around_time(&self, center: Timestamp, span_seconds: u32) -> TickRange;

    /// Serializable projection of the whole history.
    fn tick_range(&self) -> TickRange;

    fn average_price(&self) -> Decimal;
    fn standard_deviation(&self) -> Decimal;

    fn buy_signals(&self) -> Vec<DataPoint>;
    fn sell_signals(&self) -> Vec<DataPoint>;
    fn average_price_at_buy_signal(&self) -> Decimal;
    fn standard_deviation_at_buy_signal(&self) -> Decimal;

    fn data_point_count(&self) -> usize;
    fn start(&self) -> Timestamp;
    fn end(&self) -> Timestamp;
    fn high(&self) -> Decimal;
    fn low(&self) -> Decimal;

    fn value_span(&self) -> Decimal {
        self.high() - self.low()
    }

    /// How much of the high price the visible span covers, in percent.
    fn percent_in_view(&self) -> Decimal {
        let high = self.high();
        if high.is_zero() {
            return Decimal::ZERO;
        }
        self.value_span() / high * Decimal::ONE_HUNDRED
    }

    fn span_across(&self) -> Duration {
        self.end() - self.start()
    }
}

/// Mutation side of a trade history: ingestion, signals and retention tuning.
pub trait UpdatableTradeHistory: TradeHistory {
    fn add_tick(&self, tick: Tick, time_override: Option<Timestamp>) -> DataPoint;

    fn add_buy_signal(&self, snapshot: &HistorySnapshot);
    fn add_sell_signal(&self, snapshot: &HistorySnapshot);

    /// Position closed: clears signals and resumes normal retention.
    fn sold(&self);

    fn calculate_bounds(&self);
    fn clear(&self);
    fn set_tick_range(&self, tick_range: TickRange);
    fn set_data_points(&self, points: Vec<DataPoint>);

    fn max_data_points_to_keep(&self) -> usize;
    fn set_max_data_points_to_keep(&self, max_points: usize);
    fn max_data_points_to_keep_with_buy_signal(&self) -> usize;
    fn set_max_data_points_to_keep_with_buy_signal(&self, max_points: usize);

    fn changed_since_last_density_query(&self) -> bool;
    fn set_changed_since_last_density_query(&self, changed: bool);

    /// Adds (price, offset-seconds) pairs.
    fn add_test_points(&self, args: &[Decimal]) -> Result<(), HistoryError>;
    /// Adds one price per second, starting at offset zero.
    fn add_test_price_sequence(&self, prices: &[Decimal]) -> Result<(), HistoryError>;
    fn add_test_point(&self, price: Decimal, offset_seconds: f64) -> Result<DataPoint, HistoryError>;
    fn add_test_random_sequence(&self, count: usize);
    fn stretch_time_span_to(&self, target: Duration) -> Result<(), HistoryError>;
}

// src/core/engine.rs
use crate::config::HistoryConfig;
use crate::core::snapshot::{nearest_point, window_around, HistorySnapshot};
use crate::core::stats::weighted_standard_deviation;
use crate::core::traits::{TradeHistory, UpdatableTradeHistory};
use crate::error::HistoryError;
use crate::types::{ChangeSummary, DataPoint, RangeBounds, Tick, TickRange, Timestamp};
use crate::utils::tick_generator::RandomTickGenerator;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Below this many live points bounds are rebuilt from scratch on every tick.
const FULL_RECALCULATION_THRESHOLD: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
struct Eviction {
    removed: usize,
    touched_bounds: bool,
}

/// Everything guarded by the engine lock.
#[derive(Debug)]
struct HistoryState {
    config: HistoryConfig,
    points: VecDeque<DataPoint>,
    change_summaries: VecDeque<ChangeSummary>,
    active_summary: Option<ChangeSummary>,
    on_flat_line: bool,

    start: Timestamp,
    end: Timestamp,
    low: Decimal,
    high: Decimal,

    weighted_total_price: Decimal,
    weighted_count: u64,
    standard_deviation_cache: Option<Decimal>,

    buy_signals: Vec<DataPoint>,
    sell_signals: Vec<DataPoint>,
    average_price_at_buy_signal: Decimal,
    standard_deviation_at_buy_signal: Decimal,

    holds_test_data: bool,
    changed_since_last_snapshot: bool,
    changed_since_last_density_query: bool,
    last_snapshot: Option<Arc<HistorySnapshot>>,
}

impl HistoryState {
    fn new(config: HistoryConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            points: VecDeque::new(),
            change_summaries: VecDeque::new(),
            active_summary: None,
            on_flat_line: false,
            start: now,
            end: now,
            low: Decimal::ZERO,
            high: Decimal::ZERO,
            weighted_total_price: Decimal::ZERO,
            weighted_count: 0,
            standard_deviation_cache: None,
            buy_signals: Vec::new(),
            sell_signals: Vec::new(),
            average_price_at_buy_signal: Decimal::ZERO,
            standard_deviation_at_buy_signal: Decimal::ZERO,
            holds_test_data: false,
            changed_since_last_snapshot: true,
            changed_since_last_density_query: false,
            last_snapshot: None,
        }
    }

    fn has_buy_signal(&self) -> bool {
        !self.buy_signals.is_empty()
    }

    fn retention_cap(&self) -> usize {
        if self.has_buy_signal() {
            self.config.max_data_points_to_keep_with_buy_signal
        } else {
            self.config.max_data_points_to_keep
        }
    }

    fn ingest(&mut self, mut point: DataPoint) -> DataPoint {
        self.weighted_count += 1;
        self.weighted_total_price += point.price();

        self.compress(&mut point);
        self.points.push_back(point.clone());
        self.update_change_summary(&point);

        let aged_out = self.remove_aging_points();
        let excess = self.remove_excess_points();

        if aged_out > 0
            || excess.touched_bounds
            || self.points.len() < FULL_RECALCULATION_THRESHOLD
        {
            self.calculate_bounds();
        } else {
            self.adjust_bounds(&point);
        }
        if aged_out + excess.removed > 0 {
            self.remove_old_change_summaries();
        }

        self.mark_changed();
        point
    }

    /// Collapses flat runs before `point` is appended. The first point of a
    /// run is kept; from the third matching price on, the trailing point is
    /// folded into the incoming one.
    fn compress(&mut self, point: &mut DataPoint) {
        let len = self.points.len();
        if len < 2 {
            return;
        }

        if self.points[len - 1].price() == point.price() {
            // A flat run has begun, so the change run before it is complete.
            if let Some(active) = self.active_summary.take() {
                self.change_summaries.push_back(active);
            }

            if self.points[len - 2].price() == point.price() {
                if let Some(removed) = self.points.pop_back() {
                    point.absorb(&removed);
                }
                self.on_flat_line = true;
            }
        } else if self.on_flat_line {
            self.on_flat_line = false;
            self.active_summary = Some(ChangeSummary::new(point.clone()));
        }
    }

    fn update_change_summary(&mut self, point: &DataPoint) {
        if let Some(active) = self.active_summary.as_mut() {
            if active.end != *point {
                active.extend(point);
            }
        }
    }

    fn evict_front(&mut self) -> Option<DataPoint> {
        let removed = self.points.pop_front()?;
        self.weighted_count = self
            .weighted_count
            .saturating_sub(u64::from(removed.weight));
        self.weighted_total_price -= removed.price() * Decimal::from(removed.weight);
        Some(removed)
    }

    /// Age is measured against the newest point so replayed data ages the
    /// same way live data does.
    fn remove_aging_points(&mut self) -> usize {
        if self.holds_test_data || self.has_buy_signal() {
            return 0;
        }
        let Some(newest) = self.points.back().map(|p| p.time) else {
            return 0;
        };

        let max_age = Duration::minutes(self.config.max_data_point_age_minutes);
        let aged = self
            .points
            .iter()
            .take_while(|p| newest - p.time >= max_age)
            .count();
        for _ in 0..aged {
            self.evict_front();
        }
        if aged > 0 {
            debug!(removed = aged, "Pruned aged data points");
        }
        aged
    }

    fn remove_excess_points(&mut self) -> Eviction {
        let cap = self.retention_cap();
        let mut eviction = Eviction::default();
        while self.points.len() > cap {
            let Some(removed) = self.evict_front() else {
                break;
            };
            eviction.removed += 1;
            if self.is_high_or_low(removed.price()) {
                eviction.touched_bounds = true;
            }
        }
        if eviction.removed > 1 {
            debug!(removed = eviction.removed, cap, "Trimmed history to capacity");
        }
        eviction
    }

    /// Summaries are chronological, so only a leading run can be stale.
    fn remove_old_change_summaries(&mut self) {
        let Some(first_time) = self.points.front().map(|p| p.time) else {
            self.change_summaries.clear();
            return;
        };
        while self
            .change_summaries
            .front()
            .is_some_and(|summary| summary.end.time < first_time)
        {
            self.change_summaries.pop_front();
        }
    }

    fn is_high_or_low(&self, price: Decimal) -> bool {
        price == self.high || price == self.low
    }

    fn adjust_bounds(&mut self, newest: &DataPoint) {
        if newest.price() < self.low {
            self.low = newest.price();
        }
        if newest.price() > self.high {
            self.high = newest.price();
        }
        self.widen_flat_bounds();
        if let Some(first) = self.points.front() {
            self.start = first.time;
        }
        self.end = newest.time;
        self.standard_deviation_cache = None;
    }

    fn calculate_bounds(&mut self) {
        self.set_price_bounds();
        self.set_time_bounds();
        self.standard_deviation_cache = None;
    }

    fn set_price_bounds(&mut self) {
        let mut prices = self.points.iter().map(DataPoint::price);
        let first = prices.next().unwrap_or(Decimal::ZERO);
        let (low, high) = prices.fold((first, first), |(low, high), price| {
            (low.min(price), high.max(price))
        });
        self.low = low;
        self.high = high;
        self.widen_flat_bounds();
    }

    fn set_time_bounds(&mut self) {
        match (self.points.front(), self.points.back()) {
            (Some(first), Some(last)) => {
                self.start = first.time;
                self.end = last.time;
            }
            _ => {
                let now = Utc::now();
                self.start = now;
                self.end = now;
            }
        }
    }

    /// Keeps vertical room on a chart when every price is the same.
    fn widen_flat_bounds(&mut self) {
        if self.high == self.low {
            self.high += Decimal::ONE;
            self.low = (self.low - Decimal::ONE).max(Decimal::ZERO);
        }
    }

    fn recalculate_statistics(&mut self) {
        self.weighted_count = self.points.iter().map(|p| u64::from(p.weight)).sum();
        self.weighted_total_price = self
            .points
            .iter()
            .map(|p| p.price() * Decimal::from(p.weight))
            .sum();
    }

    fn reset_compression(&mut self) {
        self.change_summaries.clear();
        self.active_summary = None;
        self.on_flat_line = false;
    }

    fn mark_changed(&mut self) {
        self.changed_since_last_snapshot = true;
        self.changed_since_last_density_query = true;
    }

    fn average_price(&self) -> Decimal {
        if self.weighted_count == 0 {
            return Decimal::ZERO;
        }
        self.weighted_total_price / Decimal::from(self.weighted_count)
    }

    fn standard_deviation(&mut self) -> Decimal {
        if let Some(cached) = self.standard_deviation_cache {
            return cached;
        }
        let deviation =
            weighted_standard_deviation(&self.points, self.average_price()).unwrap_or(Decimal::ZERO);
        self.standard_deviation_cache = Some(deviation);
        deviation
    }

    fn build_snapshot(&self, symbol: &str) -> HistorySnapshot {
        let mut summaries: Vec<ChangeSummary> = self.change_summaries.iter().cloned().collect();
        if let Some(active) = &self.active_summary {
            summaries.push(active.clone());
        }

        HistorySnapshot::new(
            symbol,
            self.points.iter().cloned().collect(),
            summaries,
            self.start,
            self.end,
            self.low,
            self.high,
        )
        .with_signals(
            self.buy_signals.clone(),
            self.sell_signals.clone(),
            self.average_price_at_buy_signal,
            self.standard_deviation_at_buy_signal,
        )
    }

    /// Scales every offset from `start` by `factor`. Offsets never pass
    /// `max_millis`, which the caller has checked fits after `start`.
    fn rescale_times(&mut self, factor: f64, max_millis: i64) {
        let origin = self.start;
        let rescale = |point: &mut DataPoint| {
            let offset = (point.time - origin).num_milliseconds() as f64 * factor;
            let millis = (offset.round() as i64).clamp(0, max_millis);
            point.time = origin + Duration::milliseconds(millis);
        };

        self.points.iter_mut().for_each(rescale);
        for summary in self
            .change_summaries
            .iter_mut()
            .chain(self.active_summary.iter_mut())
        {
            rescale(&mut summary.start);
            rescale(&mut summary.end);
            rescale(&mut summary.high);
            rescale(&mut summary.low);
        }
    }
}

/// Live, thread-safe price history for one instrument.
///
/// All mutation and direct scans happen under a single lock; readers that
/// need more than a glance should take a [`HistorySnapshot`] and work on
/// that instead.
pub struct TradeHistoryEngine {
    symbol: String,
    state: Mutex<HistoryState>,
    updates: watch::Sender<u64>,
}

impl TradeHistoryEngine {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_config(symbol, HistoryConfig::default())
    }

    pub fn with_config(symbol: impl Into<String>, config: HistoryConfig) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            symbol: symbol.into(),
            state: Mutex::new(HistoryState::new(config)),
            updates,
        }
    }

    /// Version counter bumped after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.updates.borrow()
    }

    fn state(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.updates.send_modify(|version| *version += 1);
    }

    fn mutate<R>(&self, apply: impl FnOnce(&mut HistoryState) -> R) -> R {
        let result = {
            let mut state = self.state();
            let result = apply(&mut state);
            state.mark_changed();
            result
        };
        self.notify();
        result
    }

    fn replay_time(offset_seconds: f64) -> Result<Timestamp, HistoryError> {
        let invalid = || HistoryError::InvalidOffset(offset_seconds.to_string());
        if !offset_seconds.is_finite() || offset_seconds < 0.0 {
            return Err(invalid());
        }
        let millis = (offset_seconds * 1000.0).round() as i64;
        let offset = Duration::try_milliseconds(millis).ok_or_else(invalid)?;
        DateTime::<Utc>::MIN_UTC
            .checked_add_signed(offset)
            .ok_or_else(invalid)
    }
}

impl TradeHistory for TradeHistoryEngine {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn snapshot(&self) -> Arc<HistorySnapshot> {
        let mut state = self.state();
        if !state.changed_since_last_snapshot {
            if let Some(snapshot) = &state.last_snapshot {
                return Arc::clone(snapshot);
            }
        }

        let snapshot = Arc::new(state.build_snapshot(&self.symbol));
        state.last_snapshot = Some(Arc::clone(&snapshot));
        state.changed_since_last_snapshot = false;
        debug!(symbol = %self.symbol, points = snapshot.len(), "Snapshot rebuilt");
        snapshot
    }

    fn truncated_snapshot(&self, start: Timestamp, end: Timestamp) -> Option<HistorySnapshot> {
        let state = self.state();
        let points = state
            .points
            .iter()
            .filter(|p| p.time >= start && p.time <= end)
            .cloned()
            .collect();

        let snapshot = HistorySnapshot::from_points(self.symbol.clone(), points)?;
        Some(snapshot.with_signals(
            state.buy_signals.clone(),
            state.sell_signals.clone(),
            state.average_price_at_buy_signal,
            state.standard_deviation_at_buy_signal,
        ))
    }

    fn data_points_across_segments(
        &self,
        segment_count: usize,
        include_change_summaries: bool,
        distribute_across_flats: bool,
    ) -> Vec<DataPoint> {
        if segment_count == 0 {
            return Vec::new();
        }
        self.state().changed_since_last_density_query = false;
        self.snapshot().data_points_across_segments(
            segment_count,
            include_change_summaries,
            distribute_across_flats,
        )
    }

    fn first_last_low_high(&self, start: Timestamp, end: Timestamp) -> Option<RangeBounds> {
        let state = self.state();
        RangeBounds::from_points(
            state
                .points
                .iter()
                .filter(|p| p.time >= start && p.time <= end),
        )
    }

    fn nearest_point_in_time(&self, time: Timestamp) -> Option<DataPoint> {
        nearest_point(&self.state().points, time).cloned()
    }

    fn points_in_range(&self, start: Timestamp, end: Timestamp) -> TickRange {
        TickRange::collect(&self.state().points, start, end)
    }

    fn points_around_time(&self, center: Timestamp, span_seconds: u32) -> TickRange {
        let (start, end) = window_around(center, span_seconds);
        self.points_in_range(start, end)
    }

    fn tick_range(&self) -> TickRange {
        let state = self.state();
        let mut range = TickRange {
            start: Some(state.start),
            end: Some(state.end),
            value_before_range_starts: state.points.front().cloned(),
            data_points: state.points.iter().cloned().collect(),
            ..TickRange::default()
        };
        range.calculate_low_and_high();
        range
    }

    fn average_price(&self) -> Decimal {
        self.state().average_price()
    }

    fn standard_deviation(&self) -> Decimal {
        self.state().standard_deviation()
    }

    fn buy_signals(&self) -> Vec<DataPoint> {
        self.state().buy_signals.clone()
    }

    fn sell_signals(&self) -> Vec<DataPoint> {
        self.state().sell_signals.clone()
    }

    fn average_price_at_buy_signal(&self) -> Decimal {
        self.state().average_price_at_buy_signal
    }

    fn standard_deviation_at_buy_signal(&self) -> Decimal {
        self.state().standard_deviation_at_buy_signal
    }

    fn data_point_count(&self) -> usize {
        self.state().points.len()
    }

    fn start(&self) -> Timestamp {
        self.state().start
    }

    fn end(&self) -> Timestamp {
        self.state().end
    }

    fn high(&self) -> Decimal {
        self.state().high
    }

    fn low(&self) -> Decimal {
        self.state().low
    }
}

impl UpdatableTradeHistory for TradeHistoryEngine {
    fn add_tick(&self, tick: Tick, time_override: Option<Timestamp>) -> DataPoint {
        let point = DataPoint::new(tick, time_override.unwrap_or_else(Utc::now));
        let added = self.state().ingest(point);
        self.notify();
        added
    }

    fn add_buy_signal(&self, snapshot: &HistorySnapshot) {
        let Some(last) = snapshot.last_point() else {
            warn!(symbol = %self.symbol, "Buy signal ignored: snapshot holds no data points");
            return;
        };

        self.mutate(|state| {
            let first_signal = state.buy_signals.is_empty();
            state.buy_signals.push(last.clone());
            if first_signal {
                state.average_price_at_buy_signal = snapshot
                    .average_price_except_last_two()
                    .unwrap_or(Decimal::ZERO);
                state.standard_deviation_at_buy_signal = snapshot
                    .standard_deviation_except_last_two()
                    .unwrap_or(Decimal::ZERO);
                info!(
                    symbol = %self.symbol,
                    price = %last.price(),
                    average = %state.average_price_at_buy_signal,
                    std_dev = %state.standard_deviation_at_buy_signal,
                    "Buy signal recorded, holding history"
                );
            }
        });
    }

    fn add_sell_signal(&self, snapshot: &HistorySnapshot) {
        let Some(last) = snapshot.last_point() else {
            warn!(symbol = %self.symbol, "Sell signal ignored: snapshot holds no data points");
            return;
        };
        self.mutate(|state| state.sell_signals.push(last.clone()));
    }

    fn sold(&self) {
        let remaining = self.mutate(|state| {
            state.buy_signals.clear();
            state.sell_signals.clear();
            state.remove_aging_points();
            state.remove_excess_points();
            state.calculate_bounds();
            state.remove_old_change_summaries();
            state.points.len()
        });
        info!(symbol = %self.symbol, remaining, "Position closed, normal retention resumed");
    }

    fn calculate_bounds(&self) {
        self.mutate(HistoryState::calculate_bounds);
    }

    fn clear(&self) {
        self.mutate(|state| {
            state.points.clear();
            state.reset_compression();
            state.recalculate_statistics();
            state.calculate_bounds();
        });
    }

    fn set_tick_range(&self, tick_range: TickRange) {
        if tick_range.data_points.is_empty() {
            return;
        }

        self.mutate(|state| {
            state.points = tick_range.data_points.into_iter().collect();
            state.reset_compression();
            state.recalculate_statistics();
            state.calculate_bounds();
            if let Some(start) = tick_range.start {
                state.start = start;
            }
            if let Some(end) = tick_range.end {
                state.end = end;
            }
        });
    }

    fn set_data_points(&self, points: Vec<DataPoint>) {
        if points.is_empty() {
            return;
        }

        self.mutate(|state| {
            state.points.extend(points);
            state.recalculate_statistics();
            state.calculate_bounds();
        });
    }

    fn max_data_points_to_keep(&self) -> usize {
        self.state().config.max_data_points_to_keep
    }

    fn set_max_data_points_to_keep(&self, max_points: usize) {
        self.state().config.max_data_points_to_keep = max_points;
    }

    fn max_data_points_to_keep_with_buy_signal(&self) -> usize {
        self.state().config.max_data_points_to_keep_with_buy_signal
    }

    fn set_max_data_points_to_keep_with_buy_signal(&self, max_points: usize) {
        self.state().config.max_data_points_to_keep_with_buy_signal = max_points;
    }

    fn changed_since_last_density_query(&self) -> bool {
        self.state().changed_since_last_density_query
    }

    fn set_changed_since_last_density_query(&self, changed: bool) {
        self.state().changed_since_last_density_query = changed;
    }

    fn add_test_points(&self, args: &[Decimal]) -> Result<(), HistoryError> {
        if args.len() % 2 != 0 {
            return Err(HistoryError::OddArgumentCount { len: args.len() });
        }

        self.state().holds_test_data = true;
        for pair in args.chunks_exact(2) {
            let offset = pair[1]
                .to_f64()
                .ok_or_else(|| HistoryError::InvalidOffset(pair[1].to_string()))?;
            self.add_test_point(pair[0], offset)?;
        }
        self.calculate_bounds();
        Ok(())
    }

    fn add_test_price_sequence(&self, prices: &[Decimal]) -> Result<(), HistoryError> {
        self.state().holds_test_data = true;
        for (index, price) in prices.iter().enumerate() {
            self.add_test_point(*price, index as f64)?;
        }
        self.calculate_bounds();
        Ok(())
    }

    fn add_test_point(&self, price: Decimal, offset_seconds: f64) -> Result<DataPoint, HistoryError> {
        let time = Self::replay_time(offset_seconds)?;
        self.state().holds_test_data = true;
        Ok(self.add_tick(Tick::at_price(self.symbol.clone(), price), Some(time)))
    }

    fn add_test_random_sequence(&self, count: usize) {
        self.state().holds_test_data = true;
        let mut generator = RandomTickGenerator::new(self.symbol.clone());
        let mut time = DateTime::<Utc>::MIN_UTC;
        for _ in 0..count {
            self.add_tick(generator.next_tick(), Some(time));
            time += Duration::seconds(1);
        }
    }

    fn stretch_time_span_to(&self, target: Duration) -> Result<(), HistoryError> {
        let target_millis = target.num_milliseconds();
        let (span_millis, fits) = {
            let state = self.state();
            let span = (state.end - state.start).num_milliseconds();
            (span, state.start.checked_add_signed(target).is_some())
        };
        if span_millis <= 0 {
            return Err(HistoryError::EmptyTimeSpan);
        }
        if target_millis <= 0 || !fits {
            return Err(HistoryError::InvalidTargetSpan(target_millis));
        }

        let factor = target_millis as f64 / span_millis as f64;
        self.mutate(|state| {
            state.holds_test_data = true;
            state.rescale_times(factor, target_millis);
            state.set_time_bounds();
        });
        Ok(())
    }
}

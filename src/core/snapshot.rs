// src/core/snapshot.rs
use crate::core::stats::{weighted_average, weighted_standard_deviation};
use crate::types::{ChangeSummary, DataPoint, RangeBounds, TickRange, Timestamp};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::OnceLock;

/// Number of trailing points left out of the buy-signal baseline.
const BUY_SIGNAL_EXCLUDED_POINTS: usize = 2;

/// Immutable point-in-time copy of a trade history.
///
/// Statistics are computed on first use and memoized for the lifetime of
/// the snapshot.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub(crate) symbol: String,
    pub(crate) points: Vec<DataPoint>,
    pub(crate) change_summaries: Vec<ChangeSummary>,
    pub(crate) start: Timestamp,
    pub(crate) end: Timestamp,
    pub(crate) low: Decimal,
    pub(crate) high: Decimal,
    pub(crate) buy_signals: Vec<DataPoint>,
    pub(crate) sell_signals: Vec<DataPoint>,
    pub(crate) average_price_at_buy_signal: Decimal,
    pub(crate) standard_deviation_at_buy_signal: Decimal,
    average: OnceLock<Option<Decimal>>,
    average_except_last_two: OnceLock<Option<Decimal>>,
    standard_deviation: OnceLock<Option<Decimal>>,
    standard_deviation_except_last_two: OnceLock<Option<Decimal>>,
}

impl HistorySnapshot {
    pub fn new(
        symbol: impl Into<String>,
        points: Vec<DataPoint>,
        change_summaries: Vec<ChangeSummary>,
        start: Timestamp,
        end: Timestamp,
        low: Decimal,
        high: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            points,
            change_summaries,
            start,
            end,
            low,
            high,
            buy_signals: Vec::new(),
            sell_signals: Vec::new(),
            average_price_at_buy_signal: Decimal::ZERO,
            standard_deviation_at_buy_signal: Decimal::ZERO,
            average: OnceLock::new(),
            average_except_last_two: OnceLock::new(),
            standard_deviation: OnceLock::new(),
            standard_deviation_except_last_two: OnceLock::new(),
        }
    }

    /// Snapshot whose bounds are taken straight from `points`.
    /// Returns `None` for an empty slice.
    pub fn from_points(symbol: impl Into<String>, points: Vec<DataPoint>) -> Option<Self> {
        let bounds = RangeBounds::from_points(&points)?;
        Some(Self::new(
            symbol,
            points,
            Vec::new(),
            bounds.first.time,
            bounds.last.time,
            bounds.low.price(),
            bounds.high.price(),
        ))
    }

    pub fn with_signals(
        mut self,
        buy_signals: Vec<DataPoint>,
        sell_signals: Vec<DataPoint>,
        average_price_at_buy_signal: Decimal,
        standard_deviation_at_buy_signal: Decimal,
    ) -> Self {
        self.buy_signals = buy_signals;
        self.sell_signals = sell_signals;
        self.average_price_at_buy_signal = average_price_at_buy_signal;
        self.standard_deviation_at_buy_signal = standard_deviation_at_buy_signal;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn change_summaries(&self) -> &[ChangeSummary] {
        &self.change_summaries
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn buy_signals(&self) -> &[DataPoint] {
        &self.buy_signals
    }

    pub fn sell_signals(&self) -> &[DataPoint] {
        &self.sell_signals
    }

    pub fn average_price_at_buy_signal(&self) -> Decimal {
        self.average_price_at_buy_signal
    }

    pub fn standard_deviation_at_buy_signal(&self) -> Decimal {
        self.standard_deviation_at_buy_signal
    }

    pub fn last_point(&self) -> Option<&DataPoint> {
        self.point_from_end(0)
    }

    pub fn second_to_last_point(&self) -> Option<&DataPoint> {
        self.point_from_end(1)
    }

    pub fn third_to_last_point(&self) -> Option<&DataPoint> {
        self.point_from_end(2)
    }

    fn point_from_end(&self, offset: usize) -> Option<&DataPoint> {
        let index = self.points.len().checked_sub(offset + 1)?;
        self.points.get(index)
    }

    /// Leading points once `excluded` trailing points are dropped; never
    /// shorter than one point unless the snapshot is empty.
    fn leading_points(&self, excluded: usize) -> &[DataPoint] {
        let keep = self.points.len().saturating_sub(excluded).max(1);
        &self.points[..keep.min(self.points.len())]
    }

    pub fn average_price(&self) -> Option<Decimal> {
        *self.average.get_or_init(|| weighted_average(&self.points))
    }

    /// Weighted average of every point except the two most recent.
    pub fn average_price_except_last_two(&self) -> Option<Decimal> {
        *self.average_except_last_two.get_or_init(|| {
            weighted_average(self.leading_points(BUY_SIGNAL_EXCLUDED_POINTS))
        })
    }

    pub fn standard_deviation(&self) -> Option<Decimal> {
        *self.standard_deviation.get_or_init(|| {
            let mean = self.average_price()?;
            weighted_standard_deviation(&self.points, mean)
        })
    }

    /// Weighted standard deviation of every point except the two most recent.
    pub fn standard_deviation_except_last_two(&self) -> Option<Decimal> {
        *self.standard_deviation_except_last_two.get_or_init(|| {
            let mean = self.average_price_except_last_two()?;
            weighted_standard_deviation(self.leading_points(BUY_SIGNAL_EXCLUDED_POINTS), mean)
        })
    }

    pub fn points_in_range(&self, start: Timestamp, end: Timestamp) -> TickRange {
        TickRange::collect(&self.points, start, end)
    }

    /// Points within `span_seconds / 2` either side of `center`.
    pub fn points_around_time(&self, center: Timestamp, span_seconds: u32) -> TickRange {
        let (start, end) = window_around(center, span_seconds);
        self.points_in_range(start, end)
    }

    pub fn nearest_point_in_time(&self, time: Timestamp) -> Option<&DataPoint> {
        nearest_point(&self.points, time)
    }

    pub fn first_last_low_high(&self, start: Timestamp, end: Timestamp) -> Option<RangeBounds> {
        RangeBounds::from_points(
            self.points
                .iter()
                .filter(|point| point.time >= start && point.time <= end),
        )
    }
}

/// `span_seconds` centered on `center`, clipped to the representable time range.
pub(crate) fn window_around(center: Timestamp, span_seconds: u32) -> (Timestamp, Timestamp) {
    let half_span = Duration::milliseconds(i64::from(span_seconds) * 500);
    let start = center
        .checked_sub_signed(half_span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let end = center
        .checked_add_signed(half_span)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

/// Closest point to `time`; the earlier point wins an exact tie.
pub(crate) fn nearest_point<'a, I>(points: I, time: Timestamp) -> Option<&'a DataPoint>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let mut closest: Option<(&DataPoint, Duration)> = None;
    for point in points {
        let distance = (point.time - time).abs();
        if closest.map_or(true, |(_, best)| distance < best) {
            closest = Some((point, distance));
        }
    }
    closest.map(|(point, _)| point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tick;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn at(seconds: i64) -> Timestamp {
        DateTime::<Utc>::MIN_UTC + Duration::seconds(seconds)
    }

    fn snapshot(prices: &[(Decimal, i64)]) -> HistorySnapshot {
        let points = prices
            .iter()
            .map(|(price, seconds)| DataPoint::new(Tick::at_price("BTC", *price), at(*seconds)))
            .collect();
        HistorySnapshot::from_points("BTC", points).unwrap()
    }

    #[test]
    fn trailing_accessors() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 1), (dec!(3), 2), (dec!(4), 3)]);
        assert_eq!(snap.last_point().map(DataPoint::price), Some(dec!(4)));
        assert_eq!(snap.second_to_last_point().map(DataPoint::price), Some(dec!(3)));
        assert_eq!(snap.third_to_last_point().map(DataPoint::price), Some(dec!(2)));

        let short = snapshot(&[(dec!(1), 0)]);
        assert!(short.second_to_last_point().is_none());
        assert!(short.third_to_last_point().is_none());
    }

    #[test]
    fn average_except_last_two_ignores_newest_points() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 1), (dec!(90), 2), (dec!(100), 3)]);
        assert_eq!(snap.average_price(), Some(dec!(55)));
        assert_eq!(snap.average_price_except_last_two(), Some(dec!(15)));

        let deviation = snap.standard_deviation_except_last_two().unwrap();
        assert!((deviation - dec!(5)).abs() < dec!(0.000001));
    }

    #[test]
    fn average_except_last_two_keeps_first_point() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 1)]);
        assert_eq!(snap.average_price_except_last_two(), Some(dec!(10)));
    }

    #[test]
    fn empty_snapshot_has_no_statistics() {
        let snap = HistorySnapshot::new(
            "BTC",
            Vec::new(),
            Vec::new(),
            at(0),
            at(0),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert_eq!(snap.average_price(), None);
        assert_eq!(snap.standard_deviation(), None);
        assert_eq!(snap.average_price_except_last_two(), None);
        assert!(snap.last_point().is_none());
    }

    #[test]
    fn nearest_point_prefers_earlier_on_tie() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 10), (dec!(3), 20)]);
        assert_eq!(snap.nearest_point_in_time(at(5)).map(DataPoint::price), Some(dec!(1)));
        assert_eq!(snap.nearest_point_in_time(at(16)).map(DataPoint::price), Some(dec!(3)));
        assert_eq!(snap.nearest_point_in_time(at(99)).map(DataPoint::price), Some(dec!(3)));
    }

    #[test]
    fn points_around_time_is_centered() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 5), (dec!(3), 10), (dec!(4), 15)]);
        let range = snap.points_around_time(at(10), 10);
        let prices: Vec<Decimal> = range.data_points.iter().map(DataPoint::price).collect();
        assert_eq!(prices, vec![dec!(2), dec!(3), dec!(4)]);
        assert_eq!(range.value_before_range_starts.map(|p| p.price()), Some(dec!(1)));
    }

    #[test]
    fn window_at_edge_of_time_is_clipped() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 3), (dec!(3), 10)]);
        let range = snap.points_around_time(at(0), 10);
        let prices: Vec<Decimal> = range.data_points.iter().map(DataPoint::price).collect();
        assert_eq!(prices, vec![dec!(1), dec!(2)]);
        assert!(range.value_before_range_starts.is_none());

        let late = DateTime::<Utc>::MAX_UTC;
        assert_eq!(window_around(late, 10), (late - Duration::seconds(5), late));
    }

    #[test]
    fn first_last_low_high_is_inclusive() {
        let snap = snapshot(&[(dec!(5), 0), (dec!(8), 5), (dec!(2), 10), (dec!(6), 15)]);
        let bounds = snap.first_last_low_high(at(5), at(15)).unwrap();
        assert_eq!(bounds.first.price(), dec!(8));
        assert_eq!(bounds.last.price(), dec!(6));
        assert_eq!(bounds.low.price(), dec!(2));
        assert_eq!(bounds.high.price(), dec!(8));
        assert!(snap.first_last_low_high(at(16), at(20)).is_none());
    }
}

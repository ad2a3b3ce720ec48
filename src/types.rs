// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

/// One price quote for an instrument, as produced by the exchange layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub last_trade_price: Decimal,
    pub highest_bid: Decimal,
    pub lowest_ask: Decimal,
    pub quote_volume: Decimal,
}

impl Tick {
    pub fn new(
        symbol: impl Into<String>,
        last_trade_price: Decimal,
        highest_bid: Decimal,
        lowest_ask: Decimal,
        quote_volume: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            last_trade_price,
            highest_bid,
            lowest_ask,
            quote_volume,
        }
    }

    /// A tick whose bid and ask both sit on the trade price.
    pub fn at_price(symbol: impl Into<String>, price: Decimal) -> Self {
        Self::new(symbol, price, price, price, Decimal::ZERO)
    }
}

/// A tick stamped with its arrival time and the number of raw ticks it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub tick: Tick,
    pub time: Timestamp,
    pub weight: u32,
}

impl DataPoint {
    pub fn new(tick: Tick, time: Timestamp) -> Self {
        Self {
            tick,
            time,
            weight: 1,
        }
    }

    pub fn price(&self) -> Decimal {
        self.tick.last_trade_price
    }

    /// Copy of this point's tick at another time, with weight reset to one.
    pub fn clone_at(&self, time: Timestamp) -> Self {
        Self::new(self.tick.clone(), time)
    }

    /// Folds a duplicate-price point that is being dropped into this one.
    pub(crate) fn absorb(&mut self, removed: &DataPoint) {
        self.weight += removed.weight;
        if removed.tick.lowest_ask < self.tick.lowest_ask {
            self.tick.lowest_ask = removed.tick.lowest_ask;
        }
        if removed.tick.highest_bid > self.tick.highest_bid {
            self.tick.highest_bid = removed.tick.highest_bid;
        }
    }
}

/// A non-flat run of points sitting between two flat runs.
///
/// Anchors are stored by value so eviction or compression of the live
/// sequence never leaves a summary pointing at a missing point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub start: DataPoint,
    pub end: DataPoint,
    pub high: DataPoint,
    pub low: DataPoint,
    pub point_count: usize,
}

impl ChangeSummary {
    pub fn new(anchor: DataPoint) -> Self {
        Self {
            start: anchor.clone(),
            end: anchor.clone(),
            high: anchor.clone(),
            low: anchor,
            point_count: 1,
        }
    }

    pub fn extend(&mut self, point: &DataPoint) {
        self.end = point.clone();
        self.point_count += 1;

        if point.price() > self.high.price() {
            self.high = point.clone();
        }
        if point.price() < self.low.price() {
            self.low = point.clone();
        }
    }

    /// The four anchors in the order they are injected into a chart.
    pub fn anchors(&self) -> [&DataPoint; 4] {
        [&self.start, &self.low, &self.high, &self.end]
    }
}

/// A contiguous slice of history, plus the point just before it so a
/// renderer can draw a line into the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub high: Option<DataPoint>,
    pub low: Option<DataPoint>,
    pub value_before_range_starts: Option<DataPoint>,
    pub data_points: Vec<DataPoint>,
}

impl TickRange {
    /// Scans time-ordered points and keeps those within `[start, end]`.
    pub fn collect<'a, I>(points: I, start: Timestamp, end: Timestamp) -> Self
    where
        I: IntoIterator<Item = &'a DataPoint>,
    {
        let mut range = TickRange::default();
        let mut last_before: Option<&DataPoint> = None;

        for point in points {
            if point.time > end {
                break;
            }
            if point.time < start {
                last_before = Some(point);
                continue;
            }
            if range.data_points.is_empty() {
                range.value_before_range_starts = last_before.cloned();
            }
            range.data_points.push(point.clone());
        }

        range.calculate_low_and_high();
        range.start = range.data_points.first().map(|p| p.time);
        range.end = range.data_points.last().map(|p| p.time);
        range
    }

    pub fn calculate_low_and_high(&mut self) {
        let mut lowest: Option<&DataPoint> = None;
        let mut highest: Option<&DataPoint> = None;

        for point in &self.data_points {
            if lowest.map_or(true, |low| point.price() < low.price()) {
                lowest = Some(point);
            }
            if highest.map_or(true, |high| point.price() > high.price()) {
                highest = Some(point);
            }
        }

        self.low = lowest.cloned();
        self.high = highest.cloned();
    }

    pub fn is_empty(&self) -> bool {
        self.data_points.is_empty()
    }
}

/// First, last, lowest and highest point of a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBounds {
    pub first: DataPoint,
    pub last: DataPoint,
    pub low: DataPoint,
    pub high: DataPoint,
}

impl RangeBounds {
    /// Earliest point wins ties on low and high.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a DataPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = RangeBounds {
            first: first.clone(),
            last: first.clone(),
            low: first.clone(),
            high: first.clone(),
        };

        for point in iter {
            if point.price() < bounds.low.price() {
                bounds.low = point.clone();
            }
            if point.price() > bounds.high.price() {
                bounds.high = point.clone();
            }
            bounds.last = point.clone();
        }
        Some(bounds)
    }
}

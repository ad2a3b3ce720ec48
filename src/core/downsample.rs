// src/core/downsample.rs
//! Renders a snapshot down to a fixed number of chart points.
//!
//! The snapshot's time span is cut into equal buckets. Each bucket becomes a
//! single point whose prices are averaged by how long each tick was in
//! effect inside the bucket, so a price that held for a minute outweighs a
//! burst of ticks that lasted a second.

use crate::core::snapshot::HistorySnapshot;
use crate::types::{DataPoint, Tick, Timestamp};
use crate::utils::precision::{are_close, seconds_between};
use chrono::Duration;
use rust_decimal::Decimal;

impl HistorySnapshot {
    /// Returns exactly `segment_count + 1` points: one per bucket plus the
    /// true last point. Empty when the snapshot is empty or `segment_count`
    /// is zero.
    ///
    /// With `include_change_summaries` the anchors of every change summary
    /// are merged in and near-duplicates are thinned, so the count is no
    /// longer fixed. With `distribute_across_flats` the repeats emitted for
    /// empty buckets are stamped at their own bucket start instead of being
    /// stacked on the point they repeat.
    pub fn data_points_across_segments(
        &self,
        segment_count: usize,
        include_change_summaries: bool,
        distribute_across_flats: bool,
    ) -> Vec<DataPoint> {
        let Some(last) = self.last_point() else {
            return Vec::new();
        };
        if segment_count == 0 {
            return Vec::new();
        }

        let bucket = bucket_duration(self.end - self.start, segment_count);
        let mut results = Vec::with_capacity(segment_count + 1);
        let mut left_start_index = 0;
        let mut segment_start = self.start;

        while results.len() < segment_count {
            let segment_end = segment_start + bucket;
            let point = self
                .point_in_range(segment_start, segment_end, &mut left_start_index)
                .or_else(|| results.last().map(|p: &DataPoint| p.clone_at(segment_start)))
                .unwrap_or_else(|| self.points[0].clone_at(segment_start));
            results.push(point);
            segment_start = segment_end;

            // Sparse stretch: repeat the point for every bucket the next
            // real tick has not reached yet.
            let next_index = self.points.partition_point(|p| p.time < segment_start);
            let Some(next) = self.points.get(next_index) else {
                continue;
            };
            let Some(repeated) = results.last().cloned() else {
                continue;
            };
            while results.len() < segment_count && next.time >= segment_start + bucket {
                let stamp = if distribute_across_flats {
                    segment_start
                } else {
                    repeated.time
                };
                results.push(repeated.clone_at(stamp));
                segment_start += bucket;
            }
        }

        results.push(last.clone());

        if include_change_summaries {
            self.add_change_summaries(&mut results, bucket / 4);
        }
        results
    }

    /// Index of the last point at or before `time`, searching from
    /// `left_start_index` onward. `None` when every candidate is later.
    pub fn index_of_point_on_or_before(
        &self,
        time: Timestamp,
        left_start_index: usize,
    ) -> Option<usize> {
        let candidates = self.points.get(left_start_index..)?;
        let after = candidates.partition_point(|p| p.time <= time);
        after.checked_sub(1).map(|offset| left_start_index + offset)
    }

    /// Duration-weighted average of the prices in effect over
    /// `[start_segment, end_segment)`, stamped at `start_segment`.
    ///
    /// `left_start_index` is advanced to the seed point of this bucket so a
    /// left-to-right sweep over all buckets stays linear.
    pub fn point_in_range(
        &self,
        start_segment: Timestamp,
        end_segment: Timestamp,
        left_start_index: &mut usize,
    ) -> Option<DataPoint> {
        let start_index = self.index_of_point_on_or_before(start_segment, *left_start_index)?;
        *left_start_index = start_index;

        let mut total_price = Decimal::ZERO;
        let mut total_bid = Decimal::ZERO;
        let mut total_ask = Decimal::ZERO;
        let mut total_volume = Decimal::ZERO;
        let mut total_seconds = Decimal::ZERO;

        for (index, point) in self.points.iter().enumerate().skip(start_index) {
            if point.time > end_segment {
                break;
            }

            let from = point.time.max(start_segment);
            let to = match self.points.get(index + 1) {
                Some(next) if next.time < end_segment => next.time,
                _ => end_segment,
            };
            let seconds = seconds_between(from, to);
            if seconds <= Decimal::ZERO {
                continue;
            }

            total_seconds += seconds;
            total_price += seconds * point.tick.last_trade_price;
            total_bid += seconds * point.tick.highest_bid;
            total_ask += seconds * point.tick.lowest_ask;
            total_volume += seconds * point.tick.quote_volume;
        }

        if total_seconds.is_zero() {
            return None;
        }

        let tick = Tick::new(
            self.symbol.clone(),
            total_price / total_seconds,
            total_bid / total_seconds,
            total_ask / total_seconds,
            total_volume / total_seconds,
        );
        Some(DataPoint::new(tick, start_segment))
    }

    /// Merges change-summary anchors into bucketed results, then drops
    /// redundant points: of two points closer than `min_spacing`, the one
    /// nearer the mean goes; of three near-equal prices in a row, the
    /// middle goes. The final point is never removed.
    fn add_change_summaries(&self, results: &mut Vec<DataPoint>, min_spacing: Duration) {
        if self.change_summaries.is_empty() || results.is_empty() {
            return;
        }

        for summary in &self.change_summaries {
            results.extend(summary.anchors().into_iter().cloned());
        }
        results.sort_by(|a, b| a.time.cmp(&b.time));

        let sum: Decimal = results.iter().map(DataPoint::price).sum();
        let average = sum / Decimal::from(results.len());

        let final_index = results.len() - 1;
        let mut remove = vec![false; results.len()];
        for index in 1..results.len() {
            let previous = &results[index - 1];
            let current = &results[index];

            if current.time - previous.time < min_spacing {
                let previous_distance = (average - previous.price()).abs();
                let current_distance = (average - current.price()).abs();
                let drop_current = previous_distance > current_distance && index != final_index;
                if drop_current {
                    remove[index] = true;
                } else {
                    remove[index - 1] = true;
                }
            } else if index >= 2 {
                let prior = &results[index - 2];
                if are_close(prior.price(), previous.price())
                    && are_close(previous.price(), current.price())
                {
                    remove[index - 1] = true;
                }
            }
        }

        let mut flags = remove.into_iter();
        results.retain(|_| !flags.next().unwrap_or(false));
    }
}

/// Span of one bucket; zero when the history has no time extent.
fn bucket_duration(span: Duration, segment_count: usize) -> Duration {
    let Ok(count) = i32::try_from(segment_count) else {
        return Duration::zero();
    };
    span / count
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn index_on_or_before_uses_binary_search_bounds() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 10), (dec!(3), 20), (dec!(4), 30)]);
        assert_eq!(snap.index_of_point_on_or_before(at(10), 0), Some(1));
        assert_eq!(snap.index_of_point_on_or_before(at(15), 0), Some(1));
        assert_eq!(snap.index_of_point_on_or_before(at(35), 0), Some(3));
        assert_eq!(snap.index_of_point_on_or_before(at(25), 2), Some(2));
        assert_eq!(snap.index_of_point_on_or_before(at(5), 1), None);
        assert_eq!(snap.index_of_point_on_or_before(at(5), 9), None);
    }

    #[test]
    fn bucket_average_is_weighted_by_time_in_effect() {
        // 10 holds for 3 seconds, 20 for 1 second.
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 3), (dec!(30), 4)]);
        let mut left = 0;
        let point = snap.point_in_range(at(0), at(4), &mut left).unwrap();
        assert_eq!(point.price(), dec!(12.5));
        assert_eq!(point.time, at(0));
    }

    #[test]
    fn bucket_starting_between_ticks_clips_first_duration() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 6), (dec!(30), 10)]);
        let mut left = 0;
        // 10 from 4..6, 20 from 6..8
        let point = snap.point_in_range(at(4), at(8), &mut left).unwrap();
        assert_eq!(point.price(), dec!(15));
        assert_eq!(left, 0);
    }

    #[test]
    fn empty_bucket_takes_value_carried_into_it() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 100)]);
        let mut left = 0;
        let point = snap.point_in_range(at(40), at(50), &mut left).unwrap();
        assert_eq!(point.price(), dec!(10));
    }

    #[test]
    fn zero_length_bucket_has_no_point() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(20), 100)]);
        let mut left = 0;
        assert!(snap.point_in_range(at(40), at(40), &mut left).is_none());
    }

    #[test]
    fn segments_yield_count_plus_one_and_end_on_last_point() {
        let snap = snapshot(&[
            (dec!(10), 0),
            (dec!(11), 7),
            (dec!(9), 13),
            (dec!(12), 29),
            (dec!(14), 60),
        ]);
        for segment_count in [1, 3, 6, 25, 100] {
            let points = snap.data_points_across_segments(segment_count, false, false);
            assert_eq!(points.len(), segment_count + 1);
            assert_eq!(points.last(), snap.last_point());
        }
    }

    #[test]
    fn sparse_buckets_are_distributed_when_requested() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(10.5), 1), (dec!(20), 100)]);
        let points = snap.data_points_across_segments(10, false, true);
        assert_eq!(points.len(), 11);
        for (index, point) in points.iter().take(10).enumerate() {
            assert_eq!(point.time, at(index as i64 * 10));
        }
    }

    #[test]
    fn sparse_buckets_collapse_onto_repeated_point() {
        let snap = snapshot(&[(dec!(10), 0), (dec!(10.5), 1), (dec!(20), 100)]);
        let points = snap.data_points_across_segments(10, false, false);
        assert_eq!(points.len(), 11);
        assert!(points.iter().skip(1).take(9).all(|p| p.time == at(0)));
        assert!(points.windows(2).all(|pair| pair[0].time <= pair[1].time));
    }

    #[test]
    fn single_point_history_still_fills_every_segment() {
        let snap = snapshot(&[(dec!(42), 0)]);
        let points = snap.data_points_across_segments(5, false, false);
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.price() == dec!(42)));
    }

    #[test]
    fn zero_segments_or_empty_snapshot_is_empty() {
        let snap = snapshot(&[(dec!(1), 0), (dec!(2), 1)]);
        assert!(snap.data_points_across_segments(0, true, true).is_empty());

        let empty = HistorySnapshot::new(
            "BTC",
            Vec::new(),
            Vec::new(),
            at(0),
            at(0),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert!(empty.data_points_across_segments(10, false, false).is_empty());
    }
}

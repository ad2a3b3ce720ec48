// src/core/stats.rs
//! Weighted statistics over data points, where each point counts `weight` times.

use crate::types::DataPoint;
use rust_decimal::{Decimal, MathematicalOps};

/// Weighted mean of last-trade prices, `None` when there is no weight.
pub fn weighted_average<'a, I>(points: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let mut total_price = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    for point in points {
        let weight = Decimal::from(point.weight);
        total_price += point.price() * weight;
        total_weight += weight;
    }

    if total_weight.is_zero() {
        return None;
    }
    Some(total_price / total_weight)
}

/// `sqrt(Σ weight·(price − mean)² / Σ weight)`, `None` when there is no weight.
pub fn weighted_standard_deviation<'a, I>(points: I, mean: Decimal) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let mut sum = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    for point in points {
        let weight = Decimal::from(point.weight);
        let deviation = point.price() - mean;
        sum += deviation * deviation * weight;
        total_weight += weight;
    }

    if total_weight.is_zero() {
        return None;
    }
    let variance = sum / total_weight;
    Some(variance.sqrt().unwrap_or(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tick;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn weighted(price: Decimal, weight: u32) -> DataPoint {
        let mut point = DataPoint::new(Tick::at_price("BTC", price), DateTime::<Utc>::MIN_UTC);
        point.weight = weight;
        point
    }

    #[test]
    fn weight_counts_as_repeated_ticks() {
        let points = vec![weighted(dec!(10), 3), weighted(dec!(20), 1)];
        assert_eq!(weighted_average(&points), Some(dec!(12.5)));
    }

    #[test]
    fn standard_deviation_of_two_levels() {
        let points = vec![weighted(dec!(10), 1), weighted(dec!(20), 1)];
        let mean = weighted_average(&points).unwrap();
        let deviation = weighted_standard_deviation(&points, mean).unwrap();
        assert!((deviation - dec!(5)).abs() < dec!(0.000001));
    }

    #[test]
    fn empty_input_has_no_statistics() {
        let points: Vec<DataPoint> = Vec::new();
        assert_eq!(weighted_average(&points), None);
        assert_eq!(weighted_standard_deviation(&points, Decimal::ZERO), None);
    }
}

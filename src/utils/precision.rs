// src/utils/precision.rs
use crate::types::Timestamp;
use rust_decimal::Decimal;

/// Relative tolerance under which two prices count as the same level (0.01%).
const CLOSE_PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Rounds a price to the nearest multiple of `tick_size`.
/// Example: price=100.16, tick=0.1 -> 100.2
pub fn normalize_price(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size.is_zero() {
        return price;
    }
    (price / tick_size).round() * tick_size
}

/// True when the prices differ by less than 0.01% of their midpoint.
pub fn are_close(first: Decimal, second: Decimal) -> bool {
    let midpoint = (first + second) / Decimal::TWO;
    (first - second).abs() < midpoint * CLOSE_PRICE_TOLERANCE
}

/// Signed seconds from `from` to `to`, at millisecond resolution.
pub fn seconds_between(from: Timestamp, to: Timestamp) -> Decimal {
    Decimal::new((to - from).num_milliseconds(), 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_rounds_to_tick() {
        assert_eq!(normalize_price(dec!(100.16), dec!(0.1)), dec!(100.2));
        assert_eq!(normalize_price(dec!(100.14), dec!(0.1)), dec!(100.1));
        assert_eq!(normalize_price(dec!(7.123456), Decimal::ZERO), dec!(7.123456));
    }

    #[test]
    fn close_prices_within_one_basis_point() {
        assert!(are_close(dec!(10000), dec!(10000.5)));
        assert!(!are_close(dec!(10000), dec!(10001.5)));
        assert!(are_close(dec!(42), dec!(42)));
    }

    #[test]
    fn seconds_between_keeps_milliseconds() {
        let start = DateTime::<Utc>::MIN_UTC;
        let end = start + Duration::milliseconds(2_500);
        assert_eq!(seconds_between(start, end), dec!(2.5));
        assert_eq!(seconds_between(end, start), dec!(-2.5));
    }
}

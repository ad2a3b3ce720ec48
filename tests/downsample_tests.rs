use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tick_history::{DataPoint, TradeHistory, TradeHistoryEngine, UpdatableTradeHistory};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC + Duration::seconds(seconds)
}

/// Flat at 10, a one-second spike to 50, then flat at 10 again.
fn spike_engine() -> TradeHistoryEngine {
    let engine = TradeHistoryEngine::new("BTCUSDT");
    for second in 0..20 {
        engine.add_test_point(dec!(10), second as f64).unwrap();
    }
    engine.add_test_point(dec!(50), 20.0).unwrap();
    engine.add_test_point(dec!(11), 21.0).unwrap();
    for second in 22..=40 {
        engine.add_test_point(dec!(10), second as f64).unwrap();
    }
    engine
}

#[test]
fn spike_between_flats_becomes_change_summary() {
    let engine = spike_engine();
    let snapshot = engine.snapshot();
    let summaries = snapshot.change_summaries();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].start.time, at(20));
    assert_eq!(summaries[0].high.price(), dec!(50));
    assert_eq!(summaries[0].low.price(), dec!(10));
    assert_eq!(summaries[0].end.time, at(22));
    assert_eq!(summaries[0].point_count, 3);
}

#[test]
fn bucket_average_smears_the_spike() {
    let engine = spike_engine();
    let points = engine.data_points_across_segments(4, false, false);

    let prices: Vec<Decimal> = points.iter().map(DataPoint::price).collect();
    assert_eq!(prices, vec![dec!(10), dec!(10), dec!(14.1), dec!(14.1), dec!(10)]);
    assert_eq!(points[2].time, at(20));
    // Nothing ticks between 30s and 40s, so the spike bucket is repeated.
    assert_eq!(points[3].time, at(20));
    assert_eq!(points.last().map(|p| p.time), Some(at(40)));

    let distributed = engine.data_points_across_segments(4, false, true);
    assert_eq!(distributed[3].price(), dec!(14.1));
    assert_eq!(distributed[3].time, at(30));
}

#[test]
fn change_summaries_restore_the_spike() {
    let engine = spike_engine();
    let points = engine.data_points_across_segments(4, true, false);

    assert!(points.iter().any(|p| p.price() == dec!(50)));
    assert!(points.windows(2).all(|pair| pair[0].time <= pair[1].time));
    assert_eq!(points.last().map(|p| (p.price(), p.time)), Some((dec!(10), at(40))));

    let times: Vec<_> = points.iter().map(|p| p.time).collect();
    assert_eq!(times, vec![at(0), at(10), at(20), at(40)]);
}

#[test]
fn flat_history_is_thinned_to_endpoints() {
    let engine = TradeHistoryEngine::new("BTCUSDT");
    engine
        .add_test_points(&[
            dec!(10), dec!(0),
            dec!(12), dec!(1),
            dec!(12), dec!(2),
            dec!(12), dec!(3),
            dec!(11), dec!(4),
            dec!(9), dec!(5),
            dec!(9), dec!(6),
            dec!(9), dec!(60),
        ])
        .unwrap();

    let points = engine.data_points_across_segments(6, true, true);
    assert_eq!(points.last().map(|p| p.time), Some(at(60)));
    assert!(points.len() < 7 + 4);
    for triple in points.windows(3) {
        let all_equal = triple[0].price() == triple[1].price() && triple[1].price() == triple[2].price();
        assert!(!all_equal, "flat triple survived at {:?}", triple[1].time);
    }
}

#[test]
fn every_segment_is_filled_for_random_walk() {
    let engine = TradeHistoryEngine::new("BTCUSDT");
    engine.add_test_random_sequence(1_000);
    let snapshot = engine.snapshot();

    for segment_count in [1, 10, 100, 450, 2_000] {
        let points = snapshot.data_points_across_segments(segment_count, false, true);
        assert_eq!(points.len(), segment_count + 1);
        assert_eq!(points.last(), snapshot.last_point());
        for point in &points {
            assert!(point.price() >= snapshot.low() && point.price() <= snapshot.high());
        }
    }
}

//! Analytics Integration Tests
//!
//! Pairs statistics on hand-built series and on bars resampled from a
//! real tick store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]

use std::sync::Arc;
use std::time::Duration;

use pairs_engine::domain::analytics::Side;
use pairs_engine::{
    PairAnalytics, PairRequest, QueryError, Series, Thresholds, Tick, TickStore, Timeframe,
    ZScoreAlert, align, backtest, hedge_ratio, rolling_corr, rolling_zscore, spread,
    stationarity_test,
};

fn series(values: &[f64]) -> Series {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as i64 * 1_000, *v))
        .collect()
}

#[test]
fn backtest_opens_short_above_entry_and_exits_inside_band() {
    let z = series(&[0.0, 1.0, 2.5, 2.0, 0.3, -0.1]);
    let s = series(&[10.0, 11.0, 12.0, 11.5, 10.5, 10.0]);

    let result = backtest(&z, &s, Thresholds::new(2.0, 0.5).unwrap()).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = result.trades[0];
    assert_eq!(trade.side, Side::Short);
    assert_eq!(trade.entry.index, 2);
    assert_eq!(trade.exit.map(|f| f.index), Some(4));
    assert!((trade.pnl - 1.5).abs() < 1e-12);

    // Nothing accrues before the position is open.
    assert!(result.pnl.values()[..3].iter().all(|p| *p == 0.0));
    assert!((result.total_pnl() - 1.5).abs() < 1e-12);
}

#[test]
fn constant_series_has_undefined_zscore() {
    let z = rolling_zscore(&series(&[3.0; 8]), 4).unwrap();
    assert!(z.values().iter().all(|v| v.is_nan()));
}

#[test]
fn hedge_ratio_recovers_linear_relation() {
    let x = series(&[1.0, 2.0, 4.0, 3.0, 5.0, 8.0]);
    let y = x.map_values(|v| 2.0 * v);
    assert!((hedge_ratio(&y, &x).unwrap() - 2.0).abs() < 1e-9);

    let flat = series(&[5.0; 6]);
    assert!(hedge_ratio(&y, &flat).unwrap().is_nan());
}

#[test]
fn pairwise_operations_require_alignment() {
    let a = series(&[1.0, 2.0, 3.0]);
    let b: Series = [(0, 1.0), (1_000, 2.0), (5_000, 3.0)].into_iter().collect();

    assert!(matches!(hedge_ratio(&a, &b), Err(QueryError::Misaligned { .. })));
    assert!(matches!(spread(&a, &b, 1.0), Err(QueryError::Misaligned { .. })));
    assert!(matches!(rolling_corr(&a, &b, 2), Err(QueryError::Misaligned { .. })));

    let (a2, b2) = align(&a, &b);
    assert_eq!(a2.timestamps(), &[0, 1_000]);
    assert!(hedge_ratio(&a2, &b2).is_ok());
}

#[test]
fn short_series_stationarity_is_nan_not_error() {
    let result = stationarity_test(&series(&[1.0, 2.0, 1.5, 1.8, 1.2, 1.9, 1.4, 1.7, 1.3]));
    assert!(result.is_nan());
}

#[test]
fn snapshot_from_stored_ticks() {
    let store = Arc::new(TickStore::in_memory().unwrap());
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    let mut noise = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1_u64 << 53) as f64 - 0.5
    };
    for i in 0..120_i64 {
        let x = 100.0 + (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.05;
        let wobble = noise() * 0.4;
        // Two ticks per one-second bar; the close is the later one.
        store
            .append(&Tick::new(i * 1_000, "ETHUSDT", x - 1.0, 1.0).unwrap())
            .unwrap();
        store
            .append(&Tick::new(i * 1_000 + 500, "ETHUSDT", x, 1.0).unwrap())
            .unwrap();
        store
            .append(&Tick::new(i * 1_000 + 250, "BTCUSDT", 2.0 * x + 10.0 + wobble, 1.0).unwrap())
            .unwrap();
    }

    let analytics = PairAnalytics::new(store, ZScoreAlert::default());
    let request = PairRequest::new(
        "btcusdt",
        "ethusdt",
        Timeframe::OneSecond,
        Duration::from_secs(120),
        20,
    );
    let snap = analytics.snapshot_at(&request, 119_999).unwrap();

    assert_eq!(snap.y.len(), 120);
    assert!(snap.y.is_aligned_with(&snap.x));
    assert!((snap.hedge_ratio - 2.0).abs() < 0.05, "beta = {}", snap.hedge_ratio);
    assert!(snap.zscore.values()[..19].iter().all(|v| v.is_nan()));
    assert!(snap.latest_zscore.is_some());
    assert!(snap.correlation.values()[119] > 0.9);

    let adf = snap.stationarity();
    assert!(!adf.is_nan());
    assert!(adf.p_value < 0.05, "spread should look stationary: {adf:?}");

    let result = snap.backtest(Thresholds::new(1.5, 0.0).unwrap()).unwrap();
    assert!(result.pnl.is_aligned_with(&snap.spread));
}

#[test]
fn snapshot_rejects_zero_window() {
    let store = Arc::new(TickStore::in_memory().unwrap());
    let analytics = PairAnalytics::new(store, ZScoreAlert::default());
    let request = PairRequest::new("a", "b", Timeframe::OneMinute, Duration::from_secs(60), 0);
    assert!(matches!(
        analytics.snapshot_at(&request, 0),
        Err(QueryError::ZeroWindow)
    ));
}

//! Tick Store Integration Tests
//!
//! Exercises the SQLite store on disk: concurrent appends, fetch ordering
//! and epoch-aligned resampling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use pairs_engine::domain::bar::Bar;
use pairs_engine::{Tick, TickStore};
use proptest::prelude::*;
use tempfile::TempDir;

fn open_store() -> (TempDir, Arc<TickStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = TickStore::open(dir.path().join("ticks.db")).unwrap();
    (dir, Arc::new(store))
}

fn tick(ts: i64, symbol: &str, price: f64, qty: f64) -> Tick {
    Tick::new(ts, symbol, price, qty).unwrap()
}

#[test]
fn concurrent_appends_for_two_symbols_all_land() {
    let (_dir, store) = open_store();

    let writers: Vec<_> = ["BTCUSDT", "ETHUSDT"]
        .into_iter()
        .map(|symbol| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..200 {
                    store
                        .append(&tick(i, symbol, 100.0 + f64::from(i32::try_from(i).unwrap()), 1.0))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    for symbol in ["BTCUSDT", "ETHUSDT"] {
        let ticks = store.fetch([symbol], 0, 1_000).unwrap();
        assert_eq!(ticks.len(), 200);
        let ts: Vec<i64> = ticks.iter().map(Tick::timestamp_ms).collect();
        assert_eq!(ts, (0..200).collect::<Vec<_>>());
    }
    assert_eq!(store.fetch(["BTCUSDT", "ETHUSDT"], 0, 1_000).unwrap().len(), 400);
}

#[test]
fn readers_do_not_block_on_concurrent_writer() {
    let (_dir, store) = open_store();
    store.append(&tick(0, "BTCUSDT", 1.0, 1.0)).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for i in 1..500 {
                store.append(&tick(i, "BTCUSDT", 1.0, 1.0)).unwrap();
            }
        })
    };

    let mut last = 0;
    while !writer.is_finished() {
        let seen = store.fetch(["BTCUSDT"], 0, 1_000).unwrap().len();
        assert!(seen >= last, "snapshot went backwards: {seen} < {last}");
        last = seen;
    }
    writer.join().unwrap();
    assert_eq!(store.fetch(["BTCUSDT"], 0, 1_000).unwrap().len(), 500);
}

#[test]
fn resample_buckets_depend_only_on_width_and_epoch() {
    let (_dir, store) = open_store();
    for (ts, price, qty) in [
        (0, 10.0, 1.0),
        (1_200, 12.0, 2.0),
        (4_999, 9.0, 0.5),
        (5_000, 11.0, 1.0),
        (9_999, 13.0, 1.0),
        (10_000, 99.0, 1.0),
    ] {
        store.append(&tick(ts, "BTCUSDT", price, qty)).unwrap();
    }

    let bars = store
        .resample("BTCUSDT", 0, 10_000, Duration::from_millis(5_000))
        .unwrap();

    assert_eq!(
        bars,
        vec![
            Bar {
                bar_start_ms: 0,
                open: 10.0,
                high: 12.0,
                low: 9.0,
                close: 9.0,
                volume: 3.5,
            },
            Bar {
                bar_start_ms: 5_000,
                open: 11.0,
                high: 13.0,
                low: 11.0,
                close: 13.0,
                volume: 2.0,
            },
        ]
    );
}

#[test]
fn resample_omits_empty_buckets() {
    let (_dir, store) = open_store();
    store.append(&tick(1_000, "BTCUSDT", 1.0, 1.0)).unwrap();
    store.append(&tick(61_000, "BTCUSDT", 2.0, 1.0)).unwrap();

    let starts: Vec<i64> = store
        .resample("BTCUSDT", 0, 120_000, Duration::from_secs(10))
        .unwrap()
        .iter()
        .map(|b| b.bar_start_ms)
        .collect();
    assert_eq!(starts, vec![0, 60_000]);
}

#[test]
fn only_valid_ticks_deserialize_into_the_store() {
    let (_dir, store) = open_store();

    let bad = r#"{"timestamp_ms":2000,"symbol":"BTCUSDT","price":-1.0,"quantity":1.0}"#;
    assert!(serde_json::from_str::<Tick>(bad).is_err());

    let good = r#"{"timestamp_ms":2000,"symbol":"btcusdt","price":37000.5,"quantity":0.1}"#;
    store.append(&serde_json::from_str::<Tick>(good).unwrap()).unwrap();

    let ticks = store.fetch(["BTCUSDT"], 0, 10_000).unwrap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].symbol(), "BTCUSDT");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fetch_orders_by_time_then_insertion(
        timestamps in proptest::collection::vec(0_i64..50, 1..60)
    ) {
        let store = TickStore::in_memory().unwrap();
        for (seq, ts) in timestamps.iter().enumerate() {
            // Price encodes insertion order so ties can be checked.
            let price = 1.0 + f64::from(u32::try_from(seq).unwrap());
            store.append(&tick(*ts, "BTCUSDT", price, 1.0)).unwrap();
        }

        let fetched = store.fetch(["BTCUSDT"], 0, 50).unwrap();
        prop_assert_eq!(fetched.len(), timestamps.len());

        let mut expected: Vec<(i64, usize)> = timestamps
            .iter()
            .enumerate()
            .map(|(seq, ts)| (*ts, seq))
            .collect();
        expected.sort_unstable();

        for (tick, (ts, seq)) in fetched.iter().zip(expected) {
            prop_assert_eq!(tick.timestamp_ms(), ts);
            prop_assert_eq!(tick.price(), 1.0 + f64::from(u32::try_from(seq).unwrap()));
        }
    }

    #[test]
    fn resampled_volume_matches_fetched_ticks(
        timestamps in proptest::collection::vec(0_i64..100_000, 1..80),
        width_ms in 1_u64..20_000,
    ) {
        let store = TickStore::in_memory().unwrap();
        for ts in &timestamps {
            store.append(&tick(*ts, "BTCUSDT", 5.0, 0.25)).unwrap();
        }

        let bars = store
            .resample("BTCUSDT", 0, 100_000, Duration::from_millis(width_ms))
            .unwrap();
        let width = i64::try_from(width_ms).unwrap();

        let volume: f64 = bars.iter().map(|b| b.volume).sum();
        let expected = 0.25 * f64::from(u32::try_from(timestamps.len()).unwrap());
        prop_assert!((volume - expected).abs() < 1e-9);
        for pair in bars.windows(2) {
            prop_assert!(pair[0].bar_start_ms < pair[1].bar_start_ms);
        }
        for bar in &bars {
            prop_assert_eq!(bar.bar_start_ms % width, 0);
        }
    }
}

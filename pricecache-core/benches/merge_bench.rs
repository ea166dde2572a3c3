//! Criterion benchmarks for the cache hot paths.
//!
//! Benchmarks:
//! 1. Merging an incremental window into a long cached series
//! 2. CSV store write + read of a full history

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pricecache_core::data::RawBar;
use pricecache_core::store::{CsvStore, SeriesStore};
use pricecache_core::sync::merge;
use pricecache_core::{PriceRecord, Ticker, TickerSeries};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_records(ticker: &Ticker, start: usize, n: usize) -> Vec<PriceRecord> {
    let base_date = NaiveDate::from_ymd_opt(1990, 1, 2).unwrap();
    (start..start + n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            RawBar {
                date: base_date + chrono::Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
                adj_close: close,
            }
            .stamp(ticker)
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let ticker = Ticker::parse("SPY").unwrap();
    let mut group = c.benchmark_group("merge");

    for &cached in &[1_260usize, 8_000] {
        let local = TickerSeries::from_records(ticker.clone(), make_records(&ticker, 0, cached));
        let fresh = make_records(&ticker, cached - 2, 7);
        group.bench_with_input(BenchmarkId::new("append_week", cached), &cached, |b, _| {
            b.iter(|| merge(black_box(&local), black_box(fresh.clone())))
        });
    }

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let ticker = Ticker::parse("SPY").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    let series = TickerSeries::from_records(ticker.clone(), make_records(&ticker, 0, 8_000));

    let mut group = c.benchmark_group("csv_store");
    group.bench_function("write_read_8000", |b| {
        b.iter(|| {
            // Remove first so the identical-bytes shortcut does not kick in.
            let _ = std::fs::remove_file(store.path_for(&ticker));
            store.write(black_box(&series)).unwrap();
            black_box(store.read(&ticker).unwrap())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_merge, bench_store);
criterion_main!(benches);

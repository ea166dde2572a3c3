//! CSV cache: one `{TICKER}.csv` per symbol under a flat cache root.
//!
//! Header: `Date,Open,High,Low,Close,Adj Close,Volume,Ticker`, dates as
//! `YYYY-MM-DD`.
//!
//! Features:
//! - Atomic writes (write to .tmp, fsync, rename into place)
//! - Byte-identical writes are skipped
//! - Lenient read: unknown extra columns are ignored, missing prices load as
//!   NaN, date strings with a time suffix are cut to the calendar date

use super::{SeriesStore, StoreError, WriteOutcome};
use crate::domain::{PriceRecord, Ticker, TickerSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persisted column order.
pub const HEADER: [&str; 8] = [
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Adj Close",
    "Volume",
    "Ticker",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Summary of one cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub ticker: Ticker,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub size_bytes: u64,
    /// Set when the file exists but cannot be parsed.
    pub corrupt: Option<String>,
}

/// The CSV cache.
#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the record for a ticker: `{root}/{TICKER}.csv`.
    pub fn path_for(&self, ticker: &Ticker) -> PathBuf {
        self.root.join(format!("{ticker}.csv"))
    }

    /// Create the cache root if it does not exist.
    pub fn ensure_root(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Tickers with a record on disk, sorted. Files whose stem is not a valid
    /// ticker are ignored.
    pub fn list(&self) -> std::io::Result<Vec<Ticker>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut tickers = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Only names the store itself could have written.
            if let Ok(ticker) = Ticker::parse(stem) {
                if ticker.as_str() == stem {
                    tickers.push(ticker);
                }
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Per-ticker summary of everything in the cache.
    pub fn status(&self) -> std::io::Result<Vec<StoreStatus>> {
        let mut out = Vec::new();
        for ticker in self.list()? {
            let size_bytes = fs::metadata(self.path_for(&ticker))
                .map(|m| m.len())
                .unwrap_or(0);
            let status = match self.read(&ticker) {
                Ok(series) => StoreStatus {
                    rows: series.len(),
                    first_date: series.first_date(),
                    last_date: series.latest_date(),
                    size_bytes,
                    corrupt: None,
                    ticker,
                },
                Err(e) => StoreStatus {
                    rows: 0,
                    first_date: None,
                    last_date: None,
                    size_bytes,
                    corrupt: Some(e.to_string()),
                    ticker,
                },
            };
            out.push(status);
        }
        Ok(out)
    }
}

impl SeriesStore for CsvStore {
    fn exists(&self, ticker: &Ticker) -> bool {
        self.path_for(ticker).is_file()
    }

    fn read(&self, ticker: &Ticker) -> Result<TickerSeries, StoreError> {
        let path = self.path_for(ticker);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    ticker: ticker.clone(),
                })
            }
            Err(e) => {
                return Err(StoreError::CorruptRecord {
                    ticker: ticker.clone(),
                    reason: format!("unreadable: {e}"),
                })
            }
        };

        let records = decode(ticker, &bytes).map_err(|reason| StoreError::CorruptRecord {
            ticker: ticker.clone(),
            reason,
        })?;
        Ok(TickerSeries::from_records(ticker.clone(), records))
    }

    fn write(&self, series: &TickerSeries) -> Result<WriteOutcome, StoreError> {
        let ticker = series.ticker();
        let write_err = |reason: String| StoreError::WriteFailure {
            ticker: ticker.clone(),
            reason,
        };

        let bytes = encode(series).map_err(|e| write_err(format!("serialization: {e}")))?;
        let path = self.path_for(ticker);

        if fs::read(&path).is_ok_and(|existing| existing == bytes) {
            return Ok(WriteOutcome::Unchanged);
        }

        self.ensure_root()
            .map_err(|e| write_err(format!("failed to create cache root: {e}")))?;

        let tmp_path = path.with_extension("csv.tmp");
        write_durable(&tmp_path, &bytes).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("temp write: {e}"))
        })?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("atomic rename failed: {e}"))
        })?;

        Ok(WriteOutcome::Written)
    }
}

/// Write `bytes` to `path` and flush them to disk before returning, so a
/// later rename never exposes a short file after a crash.
fn write_durable(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ── CSV encoding ─────────────────────────────────────────────────────

fn encode(series: &TickerSeries) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(HEADER)?;
    for r in series.records() {
        wtr.write_record([
            r.date.format(DATE_FORMAT).to_string(),
            r.open.to_string(),
            r.high.to_string(),
            r.low.to_string(),
            r.close.to_string(),
            r.adj_close.to_string(),
            r.volume.to_string(),
            r.ticker.to_string(),
        ])?;
    }
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    adj_close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, String> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Ok(Self {
            date: find("Date").ok_or("missing column 'Date'")?,
            open: find("Open"),
            high: find("High"),
            low: find("Low"),
            close: find("Close"),
            adj_close: find("Adj Close").ok_or("missing column 'Adj Close'")?,
            volume: find("Volume"),
        })
    }
}

fn decode(ticker: &Ticker, bytes: &[u8]) -> Result<Vec<PriceRecord>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = rdr.headers().map_err(|e| format!("header: {e}"))?.clone();
    let cols = Columns::resolve(&headers)?;

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row.map_err(|e| format!("row {}: {e}", i + 1))?;
        let line = i + 1;

        let raw_date = row.get(cols.date).unwrap_or("").trim();
        let date = parse_date(raw_date)
            .ok_or_else(|| format!("row {line}: invalid date '{raw_date}'"))?;

        let price = |idx: Option<usize>| -> Result<f64, String> {
            match idx.and_then(|i| row.get(i)).map(str::trim) {
                None | Some("") => Ok(f64::NAN),
                Some(s) => s
                    .parse::<f64>()
                    .map_err(|_| format!("row {line}: invalid number '{s}'")),
            }
        };

        records.push(PriceRecord {
            date,
            ticker: ticker.clone(),
            open: price(cols.open)?,
            high: price(cols.high)?,
            low: price(cols.low)?,
            close: price(cols.close)?,
            adj_close: price(Some(cols.adj_close))?,
            volume: parse_volume(cols.volume.and_then(|i| row.get(i)))
                .ok_or_else(|| format!("row {line}: invalid volume"))?,
        });
    }
    Ok(records)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
}

/// Integer volume; float-formatted volumes (`1200.0`) and blanks are accepted.
fn parse_volume(raw: Option<&str>) -> Option<u64> {
    let s = match raw.map(str::trim) {
        None | Some("") => return Some(0),
        Some(s) => s,
    };
    if let Ok(v) = s.parse::<u64>() {
        return Some(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => Some(0),
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn rec(t: &Ticker, day: u32, adj_close: f64) -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            ticker: t.clone(),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            adj_close,
            volume: 1000,
        }
    }

    fn sample(t: &Ticker) -> TickerSeries {
        TickerSeries::from_records(t.clone(), vec![rec(t, 2, 100.5), rec(t, 3, 101.5)])
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let spy = ticker("SPY");

        assert!(!store.exists(&spy));
        assert_eq!(store.write(&sample(&spy)).unwrap(), WriteOutcome::Written);
        assert!(store.exists(&spy));

        let loaded = store.read(&spy).unwrap();
        assert_eq!(loaded, sample(&spy));
        assert_eq!(
            store.latest_date(&spy).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );
    }

    #[test]
    fn persisted_layout_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let spy = ticker("SPY");
        store.write(&sample(&spy)).unwrap();

        let text = fs::read_to_string(dir.path().join("SPY.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Open,High,Low,Close,Adj Close,Volume,Ticker")
        );
        assert_eq!(lines.next(), Some("2024-01-02,100,102,99,101,100.5,1000,SPY"));
    }

    #[test]
    fn identical_write_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let spy = ticker("SPY");
        store.write(&sample(&spy)).unwrap();
        assert_eq!(store.write(&sample(&spy)).unwrap(), WriteOutcome::Unchanged);
        assert!(!dir.path().join("SPY.csv.tmp").exists());
    }

    #[test]
    fn rewrite_replaces_whole_file_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let spy = ticker("SPY");
        let long = TickerSeries::from_records(
            spy.clone(),
            (2..=9).map(|day| rec(&spy, day, day as f64)).collect(),
        );
        store.write(&long).unwrap();

        let short = sample(&spy);
        assert_eq!(store.write(&short).unwrap(), WriteOutcome::Written);
        assert_eq!(store.read(&spy).unwrap(), short);
        assert_eq!(
            fs::read(store.path_for(&spy)).unwrap(),
            encode(&short).unwrap()
        );
        assert!(!dir.path().join("SPY.csv.tmp").exists());
    }

    #[test]
    fn write_durable_persists_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.csv.tmp");
        write_durable(&path, b"Date,Adj Close\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"Date,Adj Close\n");
    }

    #[test]
    fn write_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("data/yfinance"));
        store.write(&sample(&ticker("SPY"))).unwrap();
        assert!(dir.path().join("data/yfinance/SPY.csv").is_file());
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let err = store.read(&ticker("QQQ")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn read_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        fs::write(dir.path().join("BAD.csv"), "foo,bar\n1,2\n").unwrap();
        let err = store.read(&ticker("BAD")).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        assert_eq!(err.ticker().as_str(), "BAD");
    }

    #[test]
    fn read_bad_date_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        fs::write(
            dir.path().join("BAD.csv"),
            "Date,Adj Close\n2024-01-02,1.0\nnot-a-date,2.0\n",
        )
        .unwrap();
        let err = store.read(&ticker("BAD")).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn lenient_read_of_foreign_csv() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        // Out of order, duplicated, timestamped dates, float volume, blank price.
        fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Adj Close,Volume,Ticker,Extra\n\
             2024-01-03 00:00:00,1,1,1,1,1.5,1200.0,AAPL,x\n\
             2024-01-02,1,1,1,,1.0,100,AAPL,x\n\
             2024-01-03,2,2,2,2,2.5,1300,AAPL,x\n",
        )
        .unwrap();
        let series = store.read(&ticker("AAPL")).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.records()[0].close.is_nan());
        assert_eq!(series.records()[1].adj_close, 2.5);
        assert_eq!(series.records()[1].volume, 1300);
    }

    #[test]
    fn header_only_file_is_empty_series() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        fs::write(dir.path().join("SPY.csv"), HEADER.join(",") + "\n").unwrap();
        let series = store.read(&ticker("SPY")).unwrap();
        assert!(series.is_empty());
        assert_eq!(store.latest_date(&ticker("SPY")).unwrap(), None);
    }

    #[test]
    fn nan_prices_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let spy = ticker("SPY");
        let mut r = rec(&spy, 2, f64::NAN);
        r.open = f64::NAN;
        store
            .write(&TickerSeries::from_records(spy.clone(), vec![r]))
            .unwrap();
        let loaded = store.read(&spy).unwrap();
        assert!(loaded.records()[0].adj_close.is_nan());
        assert!(loaded.records()[0].open.is_nan());
    }

    #[test]
    fn list_and_status() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.write(&sample(&ticker("SPY"))).unwrap();
        store.write(&sample(&ticker("AAPL"))).unwrap();
        fs::write(dir.path().join("BAD.csv"), "nope\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed: Vec<String> = store.list().unwrap().into_iter().map(String::from).collect();
        assert_eq!(listed, vec!["AAPL", "BAD", "SPY"]);

        let status = store.status().unwrap();
        assert_eq!(status.len(), 3);
        assert_eq!(status[0].rows, 2);
        assert!(status[0].size_bytes > 0);
        assert!(status[1].corrupt.is_some());
        assert_eq!(
            status[2].last_date,
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );
    }

    #[test]
    fn list_of_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn parse_volume_variants() {
        assert_eq!(parse_volume(Some("100")), Some(100));
        assert_eq!(parse_volume(Some("100.0")), Some(100));
        assert_eq!(parse_volume(Some("")), Some(0));
        assert_eq!(parse_volume(None), Some(0));
        assert_eq!(parse_volume(Some("-5")), None);
        assert_eq!(parse_volume(Some("abc")), None);
    }
}

//! The combined table: every synced ticker concatenated into one frame.
//!
//! Columns are always `Date` (calendar date), `Ticker` (string) and
//! `Adj Close` (f64), in that order, even when no ticker produced rows.
//! The OHLCV projection appends `Open, High, Low, Close, Volume`.

use chrono::NaiveDate;
use polars::prelude::*;
use pricecache_core::{PriceRecord, TickerSeries};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATE: &str = "Date";
pub const TICKER: &str = "Ticker";
pub const ADJ_CLOSE: &str = "Adj Close";

/// Which columns the combined table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// `Date, Ticker, Adj Close`.
    #[default]
    Minimal,
    /// Minimal plus `Open, High, Low, Close, Volume`.
    Ohlcv,
}

impl Projection {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Projection::Minimal => &[DATE, TICKER, ADJ_CLOSE],
            Projection::Ohlcv => &[DATE, TICKER, ADJ_CLOSE, "Open", "High", "Low", "Close", "Volume"],
        }
    }
}

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported output extension for {0} (expected .csv or .parquet)")]
    UnsupportedFormat(PathBuf),

    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Polars(#[from] PolarsError),
}

/// Flat table of all synced tickers, sorted by ticker then date.
#[derive(Debug, Clone)]
pub struct CombinedTable {
    rows: Vec<PriceRecord>,
    frame: DataFrame,
    projection: Projection,
}

impl CombinedTable {
    /// Concatenate series in the given order. Each series is already sorted
    /// and date-unique, and callers pass distinct tickers.
    pub fn from_series<'a, I>(series: I, projection: Projection) -> PolarsResult<Self>
    where
        I: IntoIterator<Item = &'a TickerSeries>,
    {
        let rows: Vec<PriceRecord> = series
            .into_iter()
            .flat_map(|s| s.records().iter().cloned())
            .collect();
        let frame = build_frame(&rows, projection)?;
        Ok(Self {
            rows,
            frame,
            projection,
        })
    }

    pub fn empty(projection: Projection) -> PolarsResult<Self> {
        Self::from_series(std::iter::empty(), projection)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn rows(&self) -> &[PriceRecord] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect()
    }

    /// Write to `path`, picking CSV or Parquet from the extension.
    pub fn export(&self, path: &Path) -> Result<(), ExportError> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("csv") => self.write_csv(path),
            Some("parquet") | Some("pq") => self.write_parquet(path),
            _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// CSV with the projection's columns; dates as `YYYY-MM-DD`.
    pub fn write_csv(&self, path: &Path) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(self.projection.columns())?;
        for r in &self.rows {
            let mut fields = vec![
                r.date.format("%Y-%m-%d").to_string(),
                r.ticker.to_string(),
                r.adj_close.to_string(),
            ];
            if self.projection == Projection::Ohlcv {
                fields.extend([
                    r.open.to_string(),
                    r.high.to_string(),
                    r.low.to_string(),
                    r.close.to_string(),
                    r.volume.to_string(),
                ]);
            }
            wtr.write_record(&fields)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        write_atomic(path, |file| {
            file.write_all(&bytes)
                .map_err(|e| ExportError::Csv(csv::Error::from(e)))
        })
    }

    pub fn write_parquet(&self, path: &Path) -> Result<(), ExportError> {
        let mut df = self.frame.clone();
        write_atomic(path, |file| {
            ParquetWriter::new(file).finish(&mut df)?;
            Ok(())
        })
    }
}

/// Write through `{path}.tmp`, fsync it, and rename into place.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut fs::File) -> Result<(), ExportError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |source: std::io::Error| ExportError::Io {
        path: tmp.clone(),
        source,
    };
    let written = fs::File::create(&tmp)
        .map_err(io_err)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all().map_err(io_err)
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        ExportError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Polars `Date` physical value: days since the Unix epoch.
fn epoch_days(date: NaiveDate, epoch: NaiveDate) -> i32 {
    (date - epoch).num_days() as i32
}

fn build_frame(rows: &[PriceRecord], projection: Projection) -> PolarsResult<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| PolarsError::ComputeError("unix epoch out of range".into()))?;
    let dates: Vec<i32> = rows.iter().map(|r| epoch_days(r.date, epoch)).collect();
    let tickers: Vec<String> = rows.iter().map(|r| r.ticker.to_string()).collect();
    let adj: Vec<f64> = rows.iter().map(|r| r.adj_close).collect();

    let mut columns = vec![
        Column::new(DATE.into(), dates).cast(&DataType::Date)?,
        Column::new(TICKER.into(), tickers),
        Column::new(ADJ_CLOSE.into(), adj),
    ];

    if projection == Projection::Ohlcv {
        let col = |name: &str, f: fn(&PriceRecord) -> f64| {
            Column::new(name.into(), rows.iter().map(f).collect::<Vec<f64>>())
        };
        columns.push(col("Open", |r| r.open));
        columns.push(col("High", |r| r.high));
        columns.push(col("Low", |r| r.low));
        columns.push(col("Close", |r| r.close));
        columns.push(Column::new(
            "Volume".into(),
            rows.iter().map(|r| r.volume).collect::<Vec<u64>>(),
        ));
    }

    DataFrame::new(columns)
}

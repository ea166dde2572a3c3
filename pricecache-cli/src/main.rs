//! pricecache CLI: sync, inspect, and export the local price cache.
//!
//! Commands:
//! - `sync`: bring tickers up to date and optionally export the combined table
//! - `status`: report cached tickers, date ranges, row counts, and sizes
//! - `show`: print the tail of one ticker's cached series

mod logging;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pricecache_core::data::{CircuitBreaker, FetchCause, YahooFetcher};
use pricecache_core::store::{CsvStore, SeriesStore};
use pricecache_core::{AsOf, CacheConfig, Ticker};
use pricecache_runner::{
    BatchOptions, BatchOrchestrator, FailureReason, Projection, StdoutProgress, TickerFailure,
};

const DEFAULT_CONFIG: &str = "pricecache.toml";

#[derive(Parser)]
#[command(
    name = "pricecache",
    about = "Incremental local cache of daily price series"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to a TOML config file. Defaults to ./pricecache.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log directory (overrides the config file).
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring tickers up to date from Yahoo Finance.
    Sync {
        /// Tickers to sync (e.g., AAPL MSFT SPY). Defaults to the configured list.
        tickers: Vec<String>,

        /// Worker pool size (overrides the config file).
        #[arg(long)]
        max_workers: Option<usize>,

        /// Reference date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Write the combined table here (.csv or .parquet).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Include Open, High, Low, Close, Volume in the combined table.
        #[arg(long, default_value_t = false)]
        ohlcv: bool,
    },
    /// Report cached tickers, date ranges, row counts, and sizes.
    Status,
    /// Print the most recent rows of one cached ticker.
    Show {
        ticker: String,

        /// Number of rows to print.
        #[arg(long, default_value_t = 10)]
        tail: usize,

        /// Print rows as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    config.bootstrap()?;
    logging::init_tracing(&config.log_file())?;

    match cli.command {
        Commands::Sync {
            tickers,
            max_workers,
            as_of,
            output,
            ohlcv,
        } => run_sync(config, tickers, max_workers, as_of, output, ohlcv),
        Commands::Status => run_status(&config.cache_dir),
        Commands::Show { ticker, tail, json } => run_show(&config.cache_dir, &ticker, tail, json),
    }
}

/// Config file (explicit, or ./pricecache.toml if present, or defaults) with
/// command-line overrides applied.
fn load_config(args: &GlobalArgs) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            CacheConfig::from_file(Path::new(DEFAULT_CONFIG))?
        }
        None => CacheConfig::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = dir.clone();
    }
    Ok(config)
}

fn parse_as_of(raw: Option<&str>) -> Result<AsOf> {
    match raw {
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid --as-of date '{s}' (expected YYYY-MM-DD)"))?;
            Ok(AsOf::new(date))
        }
        None => Ok(AsOf::now()),
    }
}

/// Command-line tickers if any, otherwise the configured list.
fn resolve_tickers(args: &[String], config: &CacheConfig) -> Result<Vec<Ticker>> {
    let tickers = if args.is_empty() {
        config.parsed_tickers()?
    } else {
        args.iter()
            .map(|s| Ticker::parse(s))
            .collect::<Result<Vec<_>, _>>()?
    };
    if tickers.is_empty() {
        bail!("no tickers given and none configured (pass tickers or set `tickers` in {DEFAULT_CONFIG})");
    }
    Ok(tickers)
}

fn run_sync(
    mut config: CacheConfig,
    tickers: Vec<String>,
    max_workers: Option<usize>,
    as_of: Option<String>,
    output: Option<PathBuf>,
    ohlcv: bool,
) -> Result<()> {
    if let Some(n) = max_workers {
        config.max_workers = n;
    }
    config.validate()?;

    let tickers = resolve_tickers(&tickers, &config)?;
    let as_of = parse_as_of(as_of.as_deref())?;
    tracing::info!(
        cache_dir = %config.cache_dir.display(),
        tickers = tickers.len(),
        as_of = %as_of.today(),
        "sync requested"
    );

    let circuit_breaker = Arc::new(CircuitBreaker::new(
        config.provider.cooldown(),
        config.provider.failure_threshold,
    ));
    let fetcher = YahooFetcher::new(&config.provider, Arc::clone(&circuit_breaker))
        .context("failed to build HTTP client")?;
    let store = CsvStore::new(&config.cache_dir);

    let options = BatchOptions {
        max_workers: config.max_workers,
        projection: if ohlcv {
            Projection::Ohlcv
        } else {
            Projection::Minimal
        },
    };
    let result = BatchOrchestrator::new(&fetcher, &store, options).fetch_all(&tickers, as_of, &StdoutProgress)?;

    if let Some(path) = &output {
        result
            .table
            .export(path)
            .with_context(|| format!("failed to export combined table to {}", path.display()))?;
        println!("Combined table ({} rows) written to: {}", result.table.height(), path.display());
    }

    if !result.failures.is_empty() {
        eprintln!();
        for failure in &result.failures {
            let kind = if failure.is_degraded() { "degraded" } else { "failed" };
            eprintln!("{kind}: {}: {}", failure.ticker, failure.reason);
        }
        if let Some(notice) = breaker_notice(&result.failures, circuit_breaker.remaining_cooldown()) {
            eprintln!("{notice}");
        }
    }

    if result.all_failed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Cooldown hint when the provider blocked part of the batch.
fn breaker_notice(failures: &[TickerFailure], remaining: Duration) -> Option<String> {
    let blocked = failures
        .iter()
        .filter(|f| {
            matches!(&f.reason, FailureReason::Fetch(fetch) if fetch.cause == FetchCause::CircuitBreakerTripped)
        })
        .count();
    if blocked == 0 {
        return None;
    }
    let secs = remaining.as_secs();
    Some(format!(
        "provider blocked {blocked} ticker(s); requests resume in {}m {:02}s",
        secs / 60,
        secs % 60
    ))
}

fn run_status(cache_dir: &Path) -> Result<()> {
    let store = CsvStore::new(cache_dir);
    let statuses = store
        .status()
        .with_context(|| format!("failed to read cache directory {}", cache_dir.display()))?;

    if statuses.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = statuses.iter().map(|s| s.size_bytes).sum();
    let corrupt = statuses.iter().filter(|s| s.corrupt.is_some()).count();

    println!("Cache: {}", cache_dir.display());
    println!("Tickers: {}", statuses.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<10} {:<25} {:>8} {:>10}", "Ticker", "Date Range", "Rows", "Size");
    println!("{}", "-".repeat(56));

    for s in &statuses {
        let range = match (&s.corrupt, s.first_date, s.last_date) {
            (Some(_), _, _) => "(corrupt)".to_string(),
            (None, Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "(empty)".to_string(),
        };
        println!(
            "{:<10} {:<25} {:>8} {:>10}",
            s.ticker.as_str(),
            range,
            s.rows,
            format_size(s.size_bytes)
        );
    }

    if corrupt > 0 {
        println!();
        for s in statuses.iter().filter(|s| s.corrupt.is_some()) {
            println!("WARNING: {}", s.corrupt.as_deref().unwrap_or_default());
        }
    }
    Ok(())
}

fn run_show(cache_dir: &Path, raw: &str, tail: usize, json: bool) -> Result<()> {
    let ticker = Ticker::parse(raw)?;
    let store = CsvStore::new(cache_dir);
    let series = store.read(&ticker)?;

    let skip = series.len().saturating_sub(tail);
    let rows = &series.records()[skip..];

    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    println!(
        "{ticker}: {} rows, {} to {}",
        series.len(),
        series.first_date().map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
        series.latest_date().map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
    );
    println!();
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"
    );
    for r in rows {
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12}",
            r.date.to_string(),
            r.open,
            r.high,
            r.low,
            r.close,
            r.adj_close,
            r.volume
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

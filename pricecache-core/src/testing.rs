//! In-memory fetcher for tests: scripted per-ticker responses plus a call log.

use crate::data::{FetchCause, FetchFailure, FetchWindow, PriceFetcher, RawBar};
use crate::domain::Ticker;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Script {
    /// Behaves like a real provider: returns the rows inside the window.
    History(Vec<RawBar>),
    /// Returns these rows whatever the window.
    Verbatim(Vec<RawBar>),
    Fail(FetchCause),
    Panic,
}

/// Scripted `PriceFetcher`. Unscripted tickers return an empty result.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<Ticker, Script>,
    calls: Mutex<Vec<(Ticker, FetchWindow)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, ticker: &Ticker, bars: Vec<RawBar>) -> Self {
        self.scripts.insert(ticker.clone(), Script::History(bars));
        self
    }

    pub fn with_response(mut self, ticker: &Ticker, bars: Vec<RawBar>) -> Self {
        self.scripts.insert(ticker.clone(), Script::Verbatim(bars));
        self
    }

    pub fn with_failure(mut self, ticker: &Ticker, cause: FetchCause) -> Self {
        self.scripts.insert(ticker.clone(), Script::Fail(cause));
        self
    }

    /// Fetching this ticker panics inside the worker.
    pub fn with_panic(mut self, ticker: &Ticker) -> Self {
        self.scripts.insert(ticker.clone(), Script::Panic);
        self
    }

    /// Every fetch made so far, in call order.
    pub fn calls(&self) -> Vec<(Ticker, FetchWindow)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_for(&self, ticker: &Ticker) -> usize {
        self.calls().iter().filter(|(t, _)| t == ticker).count()
    }
}

impl PriceFetcher for ScriptedFetcher {
    fn fetch(&self, ticker: &Ticker, window: FetchWindow) -> Result<Vec<RawBar>, FetchFailure> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((ticker.clone(), window));

        match self.scripts.get(ticker) {
            None => Ok(Vec::new()),
            Some(Script::History(bars)) => Ok(bars
                .iter()
                .filter(|b| window.contains(b.date))
                .cloned()
                .collect()),
            Some(Script::Verbatim(bars)) => Ok(bars.clone()),
            Some(Script::Fail(cause)) => Err(FetchFailure::new(ticker, cause.clone())),
            Some(Script::Panic) => panic!("scripted panic for {ticker}"),
        }
    }
}

/// `days` consecutive calendar days of bars starting at `start`, with
/// adjusted close `base + i`.
pub fn daily_bars(start: NaiveDate, days: u32, base: f64) -> Vec<RawBar> {
    start
        .iter_days()
        .take(days as usize)
        .enumerate()
        .map(|(i, date)| {
            let px = base + i as f64;
            RawBar {
                date,
                open: px,
                high: px + 1.0,
                low: px - 1.0,
                close: px,
                volume: 1_000 + i as u64,
                adj_close: px,
            }
        })
        .collect()
}

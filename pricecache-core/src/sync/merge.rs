//! Merging a fetched window into a cached series.

use crate::data::{FetchWindow, RawBar};
use crate::domain::{PriceRecord, Ticker, TickerSeries};

/// Stamp fetched bars with their ticker and keep only the rows that fall
/// inside the requested window. Providers occasionally return the bar for
/// the last known date again, or a partial bar for the as-of day itself.
pub fn clip_to_window(ticker: &Ticker, bars: Vec<RawBar>, window: FetchWindow) -> Vec<PriceRecord> {
    let total = bars.len();
    let kept: Vec<PriceRecord> = bars
        .into_iter()
        .filter(|b| window.contains(b.date))
        .map(|b| b.stamp(ticker))
        .collect();
    if kept.len() < total {
        tracing::debug!(
            ticker = %ticker,
            dropped = total - kept.len(),
            "discarded rows outside the fetch window"
        );
    }
    kept
}

/// Concatenate `local` with `fetched`, drop duplicate dates keeping the
/// fetched row, and sort by date.
pub fn merge(local: &TickerSeries, fetched: Vec<PriceRecord>) -> TickerSeries {
    let mut rows = Vec::with_capacity(local.len() + fetched.len());
    rows.extend_from_slice(local.records());
    rows.extend(fetched);
    TickerSeries::from_records(local.ticker().clone(), rows)
}

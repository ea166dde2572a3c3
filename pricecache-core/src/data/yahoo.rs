//! Yahoo Finance price fetcher.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API. Handles rate limiting,
//! retries with jittered exponential backoff, response parsing, and the
//! circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{FetchCause, FetchFailure, FetchWindow, PriceFetcher, RawBar};
use crate::config::ProviderConfig;
use crate::domain::Ticker;
use chrono::NaiveDate;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Upper bound on a single retry sleep, including a provider `Retry-After`.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance price fetcher.
pub struct YahooFetcher {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooFetcher {
    pub fn new(
        config: &ProviderConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        })
    }

    /// Build the chart API URL for a symbol and window.
    ///
    /// `period2` is midnight UTC of the exclusive end date. A window without a
    /// start asks for the maximum available range instead of a `period1`.
    fn chart_url(symbol: &str, window: FetchWindow) -> String {
        let end_ts = midnight_utc(window.end);
        match window.start {
            Some(start) => format!(
                "{BASE_URL}/{symbol}?period1={}&period2={end_ts}&interval=1d\
                 &includeAdjustedClose=true&events=div%2Csplit",
                midnight_utc(start)
            ),
            None => format!(
                "{BASE_URL}/{symbol}?range=max&period2={end_ts}&interval=1d\
                 &includeAdjustedClose=true&events=div%2Csplit"
            ),
        }
    }

    /// Parse a chart API body into RawBars.
    ///
    /// A result with no timestamps is an empty window (holidays, nothing new
    /// since the last sync), not an error.
    fn parse_body(body: &str) -> Result<Vec<RawBar>, FetchCause> {
        let resp: ChartResponse = serde_json::from_str(body)
            .map_err(|e| FetchCause::ResponseFormatChanged(format!("unparseable body: {e}")))?;

        let result = match resp.chart.result {
            Some(result) => result,
            None => {
                return Err(match resp.chart.error {
                    Some(err) if err.code == "Not Found" => FetchCause::SymbolNotFound,
                    Some(err) => FetchCause::ResponseFormatChanged(format!(
                        "{}: {}",
                        err.code, err.description
                    )),
                    None => FetchCause::ResponseFormatChanged("empty result with no error".into()),
                })
            }
        };

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchCause::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = match data.timestamp {
            Some(ts) => ts,
            None => return Ok(Vec::new()),
        };
        let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchCause::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            // Exchange-local calendar date: shift by the exchange offset first
            // so a 09:30 New York open never lands on the previous UTC day.
            let date = chrono::DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| FetchCause::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();
            let adj_close = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

            // Skip bars where all OHLCV are None (holidays/non-trading days)
            if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none() {
                continue;
            }

            bars.push(RawBar {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
                adj_close: adj_close.or(close).unwrap_or(f64::NAN),
            });
        }

        Ok(bars)
    }

    /// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)` plus
    /// up to half of that again as jitter, never above `MAX_RETRY_DELAY`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY));
        let jitter_ms = (exp.as_millis() as u64) / 2;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        (exp + Duration::from_millis(jitter)).min(MAX_RETRY_DELAY)
    }

    /// Sleep before retry `attempt`: the backoff, or the provider's
    /// `Retry-After` when that is longer.
    fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        match retry_after {
            Some(wait) => backoff.max(wait.min(MAX_RETRY_DELAY)),
            None => backoff,
        }
    }

    /// Execute the request with retry and circuit breaker logic.
    fn fetch_with_retry(&self, symbol: &str, window: FetchWindow) -> Result<Vec<RawBar>, FetchCause> {
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchCause::CircuitBreakerTripped);
        }

        let url = Self::chart_url(symbol, window);
        let mut last_error = None;
        let mut retry_after = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay(attempt, retry_after.take());
                tracing::debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(FetchCause::CircuitBreakerTripped);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(FetchCause::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let header_secs = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.trim().parse::<u64>().ok());
                        retry_after = header_secs.map(Duration::from_secs);
                        last_error = Some(FetchCause::RateLimited {
                            retry_after_secs: header_secs.unwrap_or(60),
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(FetchCause::AuthenticationRequired(
                            "Yahoo Finance requires authentication".into(),
                        ));
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(FetchCause::SymbolNotFound);
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(FetchCause::Other(format!("HTTP {status}")));
                        continue;
                    }

                    let body = resp.text().map_err(|e| {
                        FetchCause::ResponseFormatChanged(format!("unreadable body: {e}"))
                    })?;
                    let bars = Self::parse_body(&body)?;
                    self.circuit_breaker.record_success();
                    return Ok(bars);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FetchCause::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(FetchCause::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchCause::Other("max retries exceeded".into())))
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

impl YahooFetcher {
    pub fn name(&self) -> &str {
        "yahoo_finance"
    }
}

impl PriceFetcher for YahooFetcher {
    fn fetch(&self, ticker: &Ticker, window: FetchWindow) -> Result<Vec<RawBar>, FetchFailure> {
        self.fetch_with_retry(ticker.as_str(), window)
            .map_err(|cause| FetchFailure::new(ticker, cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn url_with_start_uses_periods() {
        let url = YahooFetcher::chart_url("SPY", FetchWindow::since(d(2024, 1, 2), d(2024, 1, 5)));
        assert!(url.contains("/SPY?"));
        assert!(url.contains("period1=1704153600"));
        assert!(url.contains("period2=1704412800"));
        assert!(!url.contains("range=max"));
    }

    #[test]
    fn url_without_start_asks_for_max_range() {
        let url = YahooFetcher::chart_url("SPY", FetchWindow::full_history(d(2024, 1, 5)));
        assert!(url.contains("range=max"));
        assert!(!url.contains("period1"));
    }

    #[test]
    fn parses_bars_with_gmtoffset() {
        // 2024-01-02 14:30 UTC == 09:30 New York
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":-18000},
            "timestamp":[1704205800,1704292200],
            "indicators":{
                "quote":[{"open":[1.0,2.0],"high":[1.5,2.5],"low":[0.5,1.5],"close":[1.2,2.2],"volume":[100,200]}],
                "adjclose":[{"adjclose":[1.1,2.1]}]
            }}],"error":null}}"#;
        let bars = YahooFetcher::parse_body(body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(2024, 1, 2));
        assert_eq!(bars[1].date, d(2024, 1, 3));
        assert_eq!(bars[1].adj_close, 2.1);
        assert_eq!(bars[1].volume, 200);
    }

    #[test]
    fn skips_all_null_rows() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[1704205800,1704292200],
            "indicators":{
                "quote":[{"open":[null,2.0],"high":[null,2.5],"low":[null,1.5],"close":[null,2.2],"volume":[null,200]}]
            }}],"error":null}}"#;
        let bars = YahooFetcher::parse_body(body).unwrap();
        assert_eq!(bars.len(), 1);
        // No adjclose block: falls back to close
        assert_eq!(bars[0].adj_close, 2.2);
    }

    #[test]
    fn missing_timestamps_is_empty_not_error() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(YahooFetcher::parse_body(body).unwrap().is_empty());
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert_eq!(YahooFetcher::parse_body(body).unwrap_err(), FetchCause::SymbolNotFound);
    }

    #[test]
    fn garbage_is_format_changed() {
        let err = YahooFetcher::parse_body("<html>").unwrap_err();
        assert!(matches!(err, FetchCause::ResponseFormatChanged(_)));
    }

    #[test]
    fn tripped_breaker_fails_fast_without_network() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        breaker.trip();
        let fetcher = YahooFetcher::new(&ProviderConfig::default(), breaker).unwrap();
        let ticker = Ticker::parse("SPY").unwrap();
        let err = fetcher
            .fetch(&ticker, FetchWindow::full_history(d(2024, 1, 5)))
            .unwrap_err();
        assert_eq!(err.ticker, ticker);
        assert_eq!(err.cause, FetchCause::CircuitBreakerTripped);
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        let cfg = ProviderConfig {
            base_delay_ms: 100,
            ..ProviderConfig::default()
        };
        let fetcher = YahooFetcher::new(&cfg, Arc::new(CircuitBreaker::default_provider())).unwrap();
        for attempt in 1..=3u32 {
            let base = Duration::from_millis(100 * 2u64.pow(attempt - 1));
            let delay = fetcher.backoff(attempt);
            assert!(delay >= base);
            assert!(delay <= base + base / 2);
        }
    }

    #[test]
    fn huge_base_delay_is_capped_not_overflowed() {
        let cfg = ProviderConfig {
            base_delay_ms: u64::MAX / 1_000,
            max_retries: 40,
            ..ProviderConfig::default()
        };
        let fetcher = YahooFetcher::new(&cfg, Arc::new(CircuitBreaker::default_provider())).unwrap();
        for attempt in [1, 2, 33, 40] {
            assert_eq!(fetcher.backoff(attempt), MAX_RETRY_DELAY);
        }
    }

    #[test]
    fn retry_after_extends_the_wait() {
        let cfg = ProviderConfig {
            base_delay_ms: 100,
            ..ProviderConfig::default()
        };
        let fetcher = YahooFetcher::new(&cfg, Arc::new(CircuitBreaker::default_provider())).unwrap();

        let longer = fetcher.retry_delay(1, Some(Duration::from_secs(5)));
        assert_eq!(longer, Duration::from_secs(5));

        let shorter = fetcher.retry_delay(1, Some(Duration::from_millis(1)));
        assert!(shorter >= Duration::from_millis(100));
        assert!(shorter <= Duration::from_millis(150));

        let hostile = fetcher.retry_delay(1, Some(Duration::from_secs(86_400)));
        assert_eq!(hostile, MAX_RETRY_DELAY);
    }
}

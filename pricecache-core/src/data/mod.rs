//! Remote market data: the fetch adapter trait, Yahoo Finance, and the
//! circuit breaker shared across workers.

pub mod circuit_breaker;
pub mod provider;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use provider::{FetchCause, FetchFailure, FetchWindow, PriceFetcher, RawBar};
pub use yahoo::YahooFetcher;

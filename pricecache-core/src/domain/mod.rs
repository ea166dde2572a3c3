//! Domain types: tickers, price rows, per-ticker series, and the as-of date.

pub mod as_of;
pub mod record;
pub mod series;
pub mod ticker;

pub use as_of::AsOf;
pub use record::PriceRecord;
pub use series::TickerSeries;
pub use ticker::{Ticker, TickerError};

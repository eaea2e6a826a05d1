//! Market data providers

pub mod alphavantage;
pub mod rate_limiter;
pub mod types;

use crate::error::Result;
use crate::types::PriceSeries;
use async_trait::async_trait;

/// Source of daily price history that the facade refreshes the store from
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Provider ID (e.g., "alphavantage")
    fn id(&self) -> &'static str;

    /// Fetch daily prices for `ticker`, ascending by date.
    ///
    /// `size_hint` is the number of sessions the caller needs; providers may
    /// return more.
    async fn fetch(&self, ticker: &str, size_hint: usize) -> Result<PriceSeries>;
}

//! History Service
//!
//! Serves price windows from the SQLite store, refreshing it from the market
//! data source first when asked to.

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::types::PriceSeries;
use tracing::info;

/// Upper-cased, trimmed ticker; blank or whitespace-containing input is rejected
pub fn normalize_ticker(ticker: &str) -> Result<String> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(AppError::Validation("ticker must not be empty".to_string()));
    }
    if ticker.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::Validation(format!("invalid ticker {:?}", ticker)));
    }
    Ok(ticker.to_uppercase())
}

/// History service for business logic
pub struct HistoryService;

impl HistoryService {
    /// Most recent `n_observations` prices for `ticker`, ascending.
    ///
    /// With `refresh` the source is fetched and the result upserted before
    /// reading; a failed fetch leaves the store as it was. Without it the
    /// store is read as-is, so fewer rows than requested may come back.
    pub async fn get_prices(
        state: &AppState,
        ticker: &str,
        n_observations: usize,
        refresh: bool,
    ) -> Result<PriceSeries> {
        if n_observations == 0 {
            return Err(AppError::Validation(
                "n_observations must be at least 1".to_string(),
            ));
        }
        let ticker = normalize_ticker(ticker)?;

        info!(
            "HistoryService::get_prices - {} n={} refresh={}",
            ticker, n_observations, refresh
        );

        if refresh {
            let fetched = state.source.fetch(&ticker, n_observations).await?;
            let written = state.sqlite.upsert(&ticker, &fetched)?;
            info!(
                "Stored {} sessions for {} from {}",
                written,
                ticker,
                state.source.id()
            );
        } else {
            match state.sqlite.latest_date(&ticker)? {
                Some(latest) => info!("Serving {} from store, latest session {}", ticker, latest),
                None => info!("No stored prices for {}", ticker),
            }
        }

        state.sqlite.read(&ticker, n_observations)
    }

    /// Fetch and store the provider's history without reading it back
    pub async fn download_history(state: &AppState, ticker: &str, size_hint: usize) -> Result<usize> {
        let ticker = normalize_ticker(ticker)?;
        let fetched = state.source.fetch(&ticker, size_hint).await?;
        let written = state.sqlite.upsert(&ticker, &fetched)?;
        info!("HistoryService::download_history - {} rows for {}", written, ticker);
        Ok(written)
    }
}

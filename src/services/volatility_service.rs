//! Volatility Service
//!
//! `predict` runs the whole pipeline for one request: price window from the
//! history service, percentage returns, GARCH(p, q) fit and a dated forecast.
//! Saved models can be forecast again without refitting.

use crate::error::{AppError, Result};
use crate::model::{FittedModel, GarchModel, TradingCalendar, VolatilityForecast, MAX_ORDER};
use crate::services::history_service::{normalize_ticker, HistoryService};
use crate::state::AppState;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Longest forecast served
pub const MAX_HORIZON: usize = 30;

/// Prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
    /// Returns to train on
    pub n_observations: usize,
    pub p: usize,
    pub q: usize,
    pub horizon: usize,
    /// Refresh the store from the provider before reading
    #[serde(default)]
    pub use_new_data: bool,
}

impl PredictRequest {
    pub fn new(ticker: &str, n_observations: usize, p: usize, q: usize, horizon: usize) -> Self {
        Self {
            ticker: ticker.to_string(),
            n_observations,
            p,
            q,
            horizon,
            use_new_data: false,
        }
    }

    pub fn with_new_data(mut self, use_new_data: bool) -> Self {
        self.use_new_data = use_new_data;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_observations == 0 {
            return Err(AppError::Validation(
                "n_observations must be at least 1".to_string(),
            ));
        }
        for (name, order) in [("p", self.p), ("q", self.q)] {
            if !(1..=MAX_ORDER).contains(&order) {
                return Err(AppError::Validation(format!(
                    "{} must be within 1..={}, got {}",
                    name, MAX_ORDER, order
                )));
            }
        }
        validate_horizon(self.horizon)?;
        self.price_window().map(|_| ())
    }

    /// Prices needed for `n_observations` returns
    pub fn price_window(&self) -> Result<usize> {
        self.n_observations.checked_add(1).ok_or_else(|| {
            AppError::Validation(format!(
                "n_observations too large, got {}",
                self.n_observations
            ))
        })
    }
}

/// Forecast together with the model that produced it
#[derive(Debug, Clone, Serialize)]
pub struct PredictResult {
    pub forecast: VolatilityForecast,
    pub model: FittedModel,
}

fn validate_horizon(horizon: usize) -> Result<()> {
    if !(1..=MAX_HORIZON).contains(&horizon) {
        return Err(AppError::Validation(format!(
            "horizon must be within 1..={}, got {}",
            MAX_HORIZON, horizon
        )));
    }
    Ok(())
}

/// Volatility service for business logic
pub struct VolatilityService;

impl VolatilityService {
    /// Forecast daily percent volatility for the next `horizon` trading days
    pub async fn predict(state: &AppState, request: &PredictRequest) -> Result<VolatilityForecast> {
        Ok(Self::predict_with_model(state, request).await?.forecast)
    }

    /// Same as [`predict`](Self::predict), also returning the fitted model
    pub async fn predict_with_model(state: &AppState, request: &PredictRequest) -> Result<PredictResult> {
        request.validate()?;
        let ticker = normalize_ticker(&request.ticker)?;

        info!(
            "VolatilityService::predict - {} n={} GARCH({},{}) horizon={} new_data={}",
            ticker, request.n_observations, request.p, request.q, request.horizon, request.use_new_data
        );

        let prices = HistoryService::get_prices(
            state,
            &ticker,
            request.price_window()?,
            request.use_new_data,
        )
        .await?;

        let mut model = GarchModel::new(&ticker);
        model.wrangle(prices)?;
        let fitted = model.fit(request.p, request.q)?;

        let calendar = Self::calendar_after(state, fitted.training_window.end, request.horizon)?;
        let forecast = fitted.forecast(request.horizon, &calendar)?;

        Ok(PredictResult {
            forecast,
            model: fitted,
        })
    }

    /// Persist a fitted model; returns its row id
    pub fn save_model(state: &AppState, model: &FittedModel) -> Result<i64> {
        state.sqlite.save_model(model)
    }

    /// Most recently saved model for `ticker`
    pub fn load_model(state: &AppState, ticker: &str) -> Result<Option<FittedModel>> {
        let ticker = normalize_ticker(ticker)?;
        state.sqlite.load_model(&ticker)
    }

    /// Forecast from the latest saved model without touching prices
    pub fn forecast_saved(state: &AppState, ticker: &str, horizon: usize) -> Result<VolatilityForecast> {
        validate_horizon(horizon)?;
        let model = Self::load_model(state, ticker)?
            .ok_or_else(|| AppError::NotFound(format!("no saved model for {}", ticker.trim())))?;
        let calendar = Self::calendar_after(state, model.training_window.end, horizon)?;
        model.forecast(horizon, &calendar)
    }

    /// Weekday calendar with the stored holidays that can fall inside the
    /// forecast window
    fn calendar_after(state: &AppState, last: NaiveDate, horizon: usize) -> Result<TradingCalendar> {
        let span = Days::new(2 * horizon as u64 + 30);
        let from = last.succ_opt().unwrap_or(last);
        let to = last.checked_add_days(span).unwrap_or(NaiveDate::MAX);
        let holidays = state.sqlite.holidays_between(from, to)?;
        Ok(TradingCalendar::with_holidays(holidays.into_iter().map(|h| h.date)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{test_state, FakeSource};
    use chrono::{Datelike, Weekday};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Closes following a random walk with 1% daily moves
    fn random_walk(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        (0..n)
            .map(|_| {
                price *= 1.0 + rng.gen_range(-0.02..0.02);
                price
            })
            .collect()
    }

    #[test]
    fn test_request_validation() {
        assert!(PredictRequest::new("AAPL", 100, 1, 1, 5).validate().is_ok());
        assert!(PredictRequest::new("AAPL", 100, 10, 10, 30).validate().is_ok());
        assert_eq!(PredictRequest::new("AAPL", 100, 1, 1, 5).price_window().unwrap(), 101);

        for bad in [
            PredictRequest::new("AAPL", 0, 1, 1, 5),
            PredictRequest::new("AAPL", 100, 0, 1, 5),
            PredictRequest::new("AAPL", 100, 1, 11, 5),
            PredictRequest::new("AAPL", 100, 1, 1, 0),
            PredictRequest::new("AAPL", 100, 1, 1, 31),
            PredictRequest::new("AAPL", usize::MAX, 1, 1, 5),
        ] {
            assert!(matches!(bad.validate(), Err(AppError::Validation(_))), "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_predict_end_to_end() {
        let source = FakeSource::with_closes(random_walk(1, 400));
        let (_dir, state) = test_state(source);

        let request = PredictRequest::new("aapl", 300, 1, 1, 10).with_new_data(true);
        let result = VolatilityService::predict_with_model(&state, &request).await.unwrap();

        assert_eq!(result.forecast.ticker, "AAPL");
        assert_eq!(result.forecast.len(), 10);
        assert_eq!(result.model.training_window.observations, 300);
        assert_eq!(result.model.training_window.end, FakeSource::last_date(400));

        let dates = result.forecast.dates();
        assert!(dates[0] > result.model.training_window.end);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert!(dates
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(result.forecast.values().iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[tokio::test]
    async fn test_predict_skips_stored_holidays() {
        let source = FakeSource::with_closes(random_walk(2, 120));
        let (_dir, state) = test_state(source);

        let last = FakeSource::last_date(120);
        let next = TradingCalendar::weekdays().next_trading_day(last).unwrap();
        state.sqlite.add_holiday(next, Some("Exchange closed")).unwrap();

        let request = PredictRequest::new("IBM", 100, 1, 1, 5).with_new_data(true);
        let forecast = VolatilityService::predict(&state, &request).await.unwrap();
        assert!(!forecast.dates().contains(&next));
        assert_eq!(forecast.len(), 5);
    }

    #[tokio::test]
    async fn test_predict_rejects_unbounded_window() {
        let (_dir, state) = test_state(FakeSource::with_closes(random_walk(5, 50)));
        let request = PredictRequest::new("AAPL", usize::MAX, 1, 1, 5).with_new_data(true);
        assert!(matches!(
            VolatilityService::predict(&state, &request).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(state.sqlite.count("AAPL").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_predict_on_empty_store_is_insufficient() {
        let (_dir, state) = test_state(FakeSource::with_closes(vec![]));
        let request = PredictRequest::new("ZZZZ", 100, 1, 1, 5);
        assert!(matches!(
            VolatilityService::predict(&state, &request).await,
            Err(AppError::InsufficientData { .. })
        ));
    }

    #[tokio::test]
    async fn test_predict_short_window_for_order() {
        let source = FakeSource::with_closes(random_walk(3, 200));
        let (_dir, state) = test_state(source);

        let request = PredictRequest::new("MSFT", 50, 6, 1, 5).with_new_data(true);
        assert!(matches!(
            VolatilityService::predict(&state, &request).await,
            Err(AppError::InsufficientData {
                available: 50,
                required: 60
            })
        ));
    }

    #[tokio::test]
    async fn test_saved_model_forecasts_identically() {
        let source = FakeSource::with_closes(random_walk(4, 300));
        let (_dir, state) = test_state(source);

        let request = PredictRequest::new("SPY", 250, 1, 1, 7).with_new_data(true);
        let result = VolatilityService::predict_with_model(&state, &request).await.unwrap();
        VolatilityService::save_model(&state, &result.model).unwrap();

        let reloaded = VolatilityService::forecast_saved(&state, "spy", 7).unwrap();
        assert_eq!(reloaded.dates(), result.forecast.dates());
        for (a, b) in reloaded.values().iter().zip(result.forecast.values()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_forecast_saved_without_model() {
        let (_dir, state) = test_state(FakeSource::with_closes(vec![]));
        assert!(matches!(
            VolatilityService::forecast_saved(&state, "AAPL", 5),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            VolatilityService::forecast_saved(&state, "AAPL", 0),
            Err(AppError::Validation(_))
        ));
        assert!(VolatilityService::load_model(&state, "AAPL").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let source = FakeSource::failing(|| AppError::RateLimited {
            message: "5 calls per minute".into(),
            retry_after: None,
        });
        let (_dir, state) = test_state(source);

        let request = PredictRequest::new("AAPL", 100, 1, 1, 5).with_new_data(true);
        let err = VolatilityService::predict(&state, &request).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
        assert!(err.is_retryable());
    }
}

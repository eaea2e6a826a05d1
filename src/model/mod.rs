//! GARCH volatility model
//!
//! `GarchModel` walks `UNFIT -> FIT`: `wrangle` turns prices into percentage
//! returns, `fit` estimates a GARCH(p, q) and hands back a [`FittedModel`],
//! and `forecast` projects conditional volatility onto the trading calendar.
//! A `FittedModel` is self-contained, so it can be saved, reloaded and
//! forecast from without the training data.

pub mod calendar;
pub mod garch;
pub mod optimizer;

pub use calendar::TradingCalendar;
pub use garch::{min_returns, GarchParams, MAX_ORDER, MIN_RETURNS};

use crate::error::{AppError, Result};
use crate::types::{PriceSeries, ReturnSeries};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trading days used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Unit of the values in a [`VolatilityForecast`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityUnit {
    /// Standard deviation of daily percentage returns
    DailyPercent,
    /// Daily percent scaled by sqrt(252)
    AnnualizedPercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub volatility: f64,
}

/// Forecast volatility per future trading day, ascending by date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityForecast {
    pub ticker: String,
    pub unit: VolatilityUnit,
    points: Vec<ForecastPoint>,
}

impl VolatilityForecast {
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.volatility).collect()
    }

    /// Date → volatility mapping
    pub fn to_map(&self) -> BTreeMap<NaiveDate, f64> {
        self.points.iter().map(|p| (p.date, p.volatility)).collect()
    }

    /// Same forecast expressed as annualized percent volatility
    pub fn annualized(&self) -> Self {
        let factor = match self.unit {
            VolatilityUnit::DailyPercent => TRADING_DAYS_PER_YEAR.sqrt(),
            VolatilityUnit::AnnualizedPercent => 1.0,
        };
        Self {
            ticker: self.ticker.clone(),
            unit: VolatilityUnit::AnnualizedPercent,
            points: self
                .points
                .iter()
                .map(|p| ForecastPoint {
                    date: p.date,
                    volatility: p.volatility * factor,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub persistence: f64,
    pub unconditional_variance: Option<f64>,
}

/// Dates of the first and last return the model was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub observations: usize,
}

/// End-of-sample state the variance recursion continues from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeed {
    /// Last p squared residuals, oldest first
    pub shocks_sq: Vec<f64>,
    /// Last q conditional variances, oldest first
    pub variances: Vec<f64>,
}

/// Caller-owned result of a fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub ticker: String,
    pub p: usize,
    pub q: usize,
    pub params: GarchParams,
    pub diagnostics: FitDiagnostics,
    pub training_window: TrainingWindow,
    pub seed: ForecastSeed,
    pub fitted_at: DateTime<Utc>,
}

impl FittedModel {
    /// Volatility forecast for the `horizon` trading days after the
    /// training window, in daily percent.
    pub fn forecast(&self, horizon: usize, calendar: &TradingCalendar) -> Result<VolatilityForecast> {
        if horizon == 0 {
            return Err(AppError::Validation("horizon must be at least 1".into()));
        }
        self.check_consistent()?;

        let variances =
            garch::forecast_variance(&self.params, &self.seed.shocks_sq, &self.seed.variances, horizon);
        let dates = calendar.trading_days_after(self.training_window.end, horizon)?;

        let points = dates
            .into_iter()
            .zip(variances)
            .map(|(date, variance)| ForecastPoint {
                date,
                volatility: variance.sqrt(),
            })
            .collect();

        Ok(VolatilityForecast {
            ticker: self.ticker.clone(),
            unit: VolatilityUnit::DailyPercent,
            points,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        let model: FittedModel = serde_json::from_str(payload)?;
        model.check_consistent()?;
        Ok(model)
    }

    fn check_consistent(&self) -> Result<()> {
        if self.params.p() != self.p
            || self.params.q() != self.q
            || self.seed.shocks_sq.len() < self.p
            || self.seed.variances.len() < self.q
        {
            return Err(AppError::Schema(format!(
                "fitted model for {} is inconsistent with GARCH({},{})",
                self.ticker, self.p, self.q
            )));
        }
        Ok(())
    }
}

/// Volatility model for one ticker
#[derive(Debug, Clone)]
pub struct GarchModel {
    ticker: String,
    prices: Option<PriceSeries>,
    returns: Option<ReturnSeries>,
    fitted: Option<FittedModel>,
    calendar: TradingCalendar,
}

impl GarchModel {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            prices: None,
            returns: None,
            fitted: None,
            calendar: TradingCalendar::weekdays(),
        }
    }

    /// Use `calendar` for dating forecasts
    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn prices(&self) -> Option<&PriceSeries> {
        self.prices.as_ref()
    }

    pub fn returns(&self) -> Option<&ReturnSeries> {
        self.returns.as_ref()
    }

    pub fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Derive percentage returns from `series` and keep both.
    ///
    /// New data discards any previous fit.
    pub fn wrangle(&mut self, series: PriceSeries) -> Result<&ReturnSeries> {
        if series.ticker() != self.ticker {
            return Err(AppError::Validation(format!(
                "prices for {} given to the {} model",
                series.ticker(),
                self.ticker
            )));
        }

        let returns = match ReturnSeries::from_prices(&series) {
            Ok(returns) => returns,
            Err(AppError::InsufficientData { available, .. }) => {
                return Err(AppError::InsufficientData {
                    available,
                    required: MIN_RETURNS,
                })
            }
            Err(e) => return Err(e),
        };

        if returns.len() < MIN_RETURNS {
            return Err(AppError::InsufficientData {
                available: returns.len(),
                required: MIN_RETURNS,
            });
        }

        tracing::debug!(
            "Wrangled {} prices into {} returns for {}",
            series.len(),
            returns.len(),
            self.ticker
        );

        self.prices = Some(series);
        self.fitted = None;
        Ok(&*self.returns.insert(returns))
    }

    /// Fit GARCH(p, q) to the wrangled returns
    pub fn fit(&mut self, p: usize, q: usize) -> Result<FittedModel> {
        let required = min_returns(p, q);
        let returns = self.returns.as_ref().ok_or(AppError::InsufficientData {
            available: 0,
            required,
        })?;

        let estimate = garch::estimate(returns.values(), p, q)?;

        let n = returns.len();
        let k = estimate.params.num_params() as f64;
        let nll = -estimate.log_likelihood;
        let (start, end) = match (returns.first_date(), returns.last_date()) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(AppError::InsufficientData {
                    available: n,
                    required,
                })
            }
        };

        let seed = ForecastSeed {
            shocks_sq: estimate.residuals[n - p..].iter().map(|e| e * e).collect(),
            variances: estimate.variances[n - q..].to_vec(),
        };

        let diagnostics = FitDiagnostics {
            log_likelihood: estimate.log_likelihood,
            aic: 2.0 * k + 2.0 * nll,
            bic: k * (n as f64).ln() + 2.0 * nll,
            iterations: estimate.iterations,
            evaluations: estimate.evaluations,
            persistence: estimate.params.persistence(),
            unconditional_variance: estimate.params.unconditional_variance(),
        };

        let model = FittedModel {
            ticker: self.ticker.clone(),
            p,
            q,
            params: estimate.params,
            diagnostics,
            training_window: TrainingWindow {
                start,
                end,
                observations: n,
            },
            seed,
            fitted_at: Utc::now(),
        };

        tracing::info!(
            "Fitted GARCH({},{}) for {} on {} returns: persistence={:.4} loglik={:.3} iterations={}",
            p,
            q,
            self.ticker,
            n,
            model.diagnostics.persistence,
            model.diagnostics.log_likelihood,
            model.diagnostics.iterations
        );

        self.fitted = Some(model.clone());
        Ok(model)
    }

    /// Forecast from the current fit; fails with `NotFitted` before `fit`
    pub fn forecast(&self, horizon: usize) -> Result<VolatilityForecast> {
        let fitted = self.fitted.as_ref().ok_or(AppError::NotFitted)?;
        fitted.forecast(horizon, &self.calendar)
    }
}

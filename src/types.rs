//! Price and return series types shared by the store, providers and model

use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV observation for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub ticker: String,
    pub timestamp: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceObservation {
    /// Check the row is storable: positive finite prices, consistent range,
    /// non-negative volume.
    pub fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(AppError::Schema(format!(
                "observation on {} has an empty ticker",
                self.timestamp
            )));
        }

        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::Schema(format!(
                    "{} {}: field `{}` must be a positive number, got {}",
                    self.ticker, self.timestamp, name, value
                )));
            }
        }

        if self.high < self.low {
            return Err(AppError::Schema(format!(
                "{} {}: high {} is below low {}",
                self.ticker, self.timestamp, self.high, self.low
            )));
        }

        if self.volume < 0 {
            return Err(AppError::Schema(format!(
                "{} {}: negative volume {}",
                self.ticker, self.timestamp, self.volume
            )));
        }

        Ok(())
    }
}

/// Observations for one ticker, ascending by timestamp, no duplicate dates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    ticker: String,
    observations: Vec<PriceObservation>,
}

impl PriceSeries {
    /// Empty series for a ticker
    pub fn empty(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            observations: Vec::new(),
        }
    }

    /// Build a series from observations in any order.
    ///
    /// Sorts ascending. Rows for another ticker and repeated dates are
    /// rejected with a schema error.
    pub fn new(ticker: &str, mut observations: Vec<PriceObservation>) -> Result<Self> {
        if let Some(other) = observations.iter().find(|o| o.ticker != ticker) {
            return Err(AppError::Schema(format!(
                "observation for {} found in series for {}",
                other.ticker, ticker
            )));
        }

        observations.sort_by_key(|o| o.timestamp);

        if let Some(pair) = observations
            .windows(2)
            .find(|w| w[0].timestamp == w[1].timestamp)
        {
            return Err(AppError::Schema(format!(
                "duplicate observation for {} on {}",
                ticker, pair[0].timestamp
            )));
        }

        Ok(Self {
            ticker: ticker.to_string(),
            observations,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&PriceObservation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&PriceObservation> {
        self.observations.last()
    }

    /// Closing prices in series order
    pub fn closes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.close).collect()
    }

    /// Keep only the most recent `n` observations
    pub fn tail(mut self, n: usize) -> Self {
        let len = self.observations.len();
        if len > n {
            self.observations.drain(..len - n);
        }
        self
    }

    pub fn into_observations(self) -> Vec<PriceObservation> {
        self.observations
    }
}

/// Percentage simple returns derived from consecutive closes.
///
/// `values[i] = (close[i + 1] / close[i] - 1) * 100`, dated with the later
/// observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

/// Multiplier applied to simple returns so the optimizer works with
/// percentages instead of fractions.
pub const RETURN_SCALE: f64 = 100.0;

impl ReturnSeries {
    /// Derive returns from a price series; needs at least two observations.
    pub fn from_prices(series: &PriceSeries) -> Result<Self> {
        let observations = series.observations();
        if observations.len() < 2 {
            return Err(AppError::InsufficientData {
                available: observations.len().saturating_sub(1),
                required: 1,
            });
        }

        let mut dates = Vec::with_capacity(observations.len() - 1);
        let mut values = Vec::with_capacity(observations.len() - 1);

        for pair in observations.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.close <= 0.0 || !prev.close.is_finite() {
                return Err(AppError::Schema(format!(
                    "{} {}: close {} cannot anchor a return",
                    prev.ticker, prev.timestamp, prev.close
                )));
            }
            dates.push(curr.timestamp);
            values.push((curr.close / prev.close - 1.0) * RETURN_SCALE);
        }

        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(ticker: &str, day: NaiveDate, close: f64) -> PriceObservation {
        PriceObservation {
            ticker: ticker.to_string(),
            timestamp: day,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
        }
    }

    #[test]
    fn test_series_sorts_ascending() {
        let series = PriceSeries::new(
            "AAPL",
            vec![
                obs("AAPL", date(2024, 1, 4), 3.0),
                obs("AAPL", date(2024, 1, 2), 1.0),
                obs("AAPL", date(2024, 1, 3), 2.0),
            ],
        )
        .unwrap();

        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.last().unwrap().timestamp, date(2024, 1, 4));
    }

    #[test]
    fn test_series_rejects_duplicates_and_foreign_rows() {
        let dup = PriceSeries::new(
            "AAPL",
            vec![obs("AAPL", date(2024, 1, 2), 1.0), obs("AAPL", date(2024, 1, 2), 2.0)],
        );
        assert!(matches!(dup, Err(AppError::Schema(_))));

        let foreign = PriceSeries::new("AAPL", vec![obs("MSFT", date(2024, 1, 2), 1.0)]);
        assert!(matches!(foreign, Err(AppError::Schema(_))));
    }

    #[test]
    fn test_tail_keeps_most_recent() {
        let series = series_from_closes("IBM", date(2024, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let tail = series.tail(2);
        assert_eq!(tail.closes(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_validate_rejects_bad_rows() {
        let mut row = obs("AAPL", date(2024, 1, 2), 10.0);
        assert!(row.validate().is_ok());

        row.low = 11.0;
        assert!(matches!(row.validate(), Err(AppError::Schema(_))));

        let mut row = obs("AAPL", date(2024, 1, 2), 10.0);
        row.close = f64::NAN;
        assert!(matches!(row.validate(), Err(AppError::Schema(_))));

        let mut row = obs("AAPL", date(2024, 1, 2), 10.0);
        row.volume = -1;
        assert!(matches!(row.validate(), Err(AppError::Schema(_))));
    }

    #[test]
    fn test_returns_need_two_prices() {
        let single = series_from_closes("AAPL", date(2024, 1, 2), &[100.0]);
        assert!(matches!(
            ReturnSeries::from_prices(&single),
            Err(AppError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_returns_are_dated_with_later_observation() {
        let series = series_from_closes("AAPL", date(2024, 1, 5), &[100.0, 110.0, 99.0]);
        let returns = ReturnSeries::from_prices(&series).unwrap();

        // 2024-01-05 is a Friday; the next observation lands on Monday
        assert_eq!(returns.dates()[0], date(2024, 1, 8));
        assert!((returns.values()[0] - 10.0).abs() < 1e-12);
        assert!((returns.values()[1] + 10.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_return_length_and_formula(
            closes in prop::collection::vec(0.5f64..500.0, 2..120)
        ) {
            let series = series_from_closes("PROP", date(2023, 3, 1), &closes);
            let returns = ReturnSeries::from_prices(&series).unwrap();

            prop_assert_eq!(returns.len(), closes.len() - 1);
            for (t, r) in returns.values().iter().enumerate() {
                let expected = (closes[t + 1] / closes[t] - 1.0) * RETURN_SCALE;
                prop_assert!((r - expected).abs() <= 1e-9 * expected.abs().max(1.0));
            }
        }
    }
}

//! Volcast - stock price store and GARCH volatility forecasting
//!
//! Daily prices are fetched from Alpha Vantage, cached in SQLite and turned
//! into day-ahead volatility forecasts by a GARCH(p, q) model.
//!
//! ```no_run
//! use volcast::{AppState, Config, PredictRequest, VolatilityService};
//!
//! # async fn run() -> volcast::Result<()> {
//! let config = Config::from_env()?;
//! volcast::init_tracing(&config.log_filter);
//! let state = AppState::new(config)?;
//!
//! let request = PredictRequest::new("AAPL", 500, 1, 1, 10).with_new_data(true);
//! let forecast = VolatilityService::predict(&state, &request).await?;
//! for point in forecast.points() {
//!     println!("{} {:.3}%", point.date, point.volatility);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod providers;
pub mod services;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{AppError, ErrorResponse, Result};
pub use model::{FittedModel, GarchModel, TradingCalendar, VolatilityForecast, VolatilityUnit};
pub use providers::MarketDataSource;
pub use services::{HistoryService, PredictRequest, PredictResult, VolatilityService};
pub use state::AppState;
pub use types::{PriceObservation, PriceSeries, ReturnSeries};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling it again is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

//! Services Layer
//!
//! Entry points callers use; each takes the caller-owned [`AppState`].
//!
//! ```text
//! caller --> VolatilityService --> HistoryService --> SqliteDb
//!                   |                    └──────────> MarketDataSource
//!                   └──> GarchModel / FittedModel
//! ```
//!
//! [`AppState`]: crate::state::AppState

pub mod history_service;
pub mod volatility_service;

pub use history_service::{normalize_ticker, HistoryService};
pub use volatility_service::{PredictRequest, PredictResult, VolatilityService, MAX_HORIZON};

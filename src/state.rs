//! Application state management

use crate::config::Config;
use crate::db::sqlite::SqliteDb;
use crate::error::Result;
use crate::providers::alphavantage::AlphaVantageSource;
use crate::providers::MarketDataSource;
use std::sync::Arc;

/// State shared by every service call; owned by the caller
pub struct AppState {
    /// SQLite price store
    pub sqlite: Arc<SqliteDb>,

    /// Market data provider used on refresh
    pub source: Arc<dyn MarketDataSource>,

    pub config: Config,
}

impl AppState {
    /// Open the store at `config.db_path` and connect the Alpha Vantage source
    pub fn new(config: Config) -> Result<Self> {
        tracing::info!("Database path: {:?}", config.db_path);

        let sqlite = Arc::new(SqliteDb::new(&config.db_path)?);
        let source: Arc<dyn MarketDataSource> = Arc::new(AlphaVantageSource::new(&config)?);

        Ok(Self::with_parts(config, sqlite, source))
    }

    /// Assemble state from already constructed parts
    pub fn with_parts(
        config: Config,
        sqlite: Arc<SqliteDb>,
        source: Arc<dyn MarketDataSource>,
    ) -> Self {
        tracing::debug!("Market data source: {}", source.id());
        Self {
            sqlite,
            source,
            config,
        }
    }
}

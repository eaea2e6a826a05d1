//! SQLite database module
//!
//! One database file holds the price history, saved models and the holiday
//! calendar. Connections come from an r2d2 pool in WAL mode so reads do not
//! block each other; writes for a ticker are serialized by a per-ticker lock
//! and run inside IMMEDIATE transactions.

pub mod models;
mod fitted_models;
mod market;
mod migrations;
mod prices;

use crate::error::{AppError, Result};
use crate::model::FittedModel;
use crate::types::PriceSeries;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use models::{MarketHoliday, StoredModel};
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database wrapper
pub struct SqliteDb {
    pool: Pool<SqliteConnectionManager>,
    ticker_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SqliteDb {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            // Enable WAL mode for better concurrent access
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        });

        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        let db = Self {
            pool,
            ticker_locks: DashMap::new(),
        };

        // Run migrations
        db.run_migrations()?;

        tracing::info!("Opened price store at {}", path.display());
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.pool.get()?;
        migrations::run_migrations(&conn)
    }

    fn ticker_lock(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.ticker_locks
            .entry(ticker.to_string())
            .or_default()
            .clone()
    }

    // ========== Price Methods ==========

    /// Insert or replace every observation of `series` under `ticker`.
    ///
    /// The batch is validated before anything is written and committed
    /// atomically; on error the store is unchanged.
    pub fn upsert(&self, ticker: &str, series: &PriceSeries) -> Result<usize> {
        if ticker.trim().is_empty() {
            return Err(AppError::Schema("ticker must not be empty".to_string()));
        }
        if series.ticker() != ticker {
            return Err(AppError::Schema(format!(
                "series for {} cannot be stored under {}",
                series.ticker(),
                ticker
            )));
        }
        for row in series.observations() {
            if row.ticker != ticker {
                return Err(AppError::Schema(format!(
                    "observation for {} found in batch for {}",
                    row.ticker, ticker
                )));
            }
            row.validate()?;
        }

        let result = {
            let lock = self.ticker_lock(ticker);
            let _guard = lock.lock();
            self.pool
                .get()
                .map_err(AppError::from)
                .and_then(|mut conn| prices::upsert_observations(&mut conn, ticker, series.observations()))
        };
        // Entries held only by the map have no writer waiting on them
        self.ticker_locks
            .remove_if(ticker, |_, lock| Arc::strong_count(lock) == 1);

        let count = result?;
        tracing::debug!("Upserted {} observations for {}", count, ticker);
        Ok(count)
    }

    /// Most recent `limit` observations in ascending order; unknown tickers
    /// yield an empty series.
    pub fn read(&self, ticker: &str, limit: usize) -> Result<PriceSeries> {
        let conn = self.pool.get()?;
        let rows = prices::read_recent(&conn, ticker, limit)?;
        PriceSeries::new(ticker, rows)
    }

    /// Number of stored observations for a ticker
    pub fn count(&self, ticker: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        prices::count(&conn, ticker)
    }

    /// Date of the newest stored observation for a ticker
    pub fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let conn = self.pool.get()?;
        prices::latest_date(&conn, ticker)
    }

    // ========== Model Methods ==========

    /// Persist a fitted model; returns the row id
    pub fn save_model(&self, model: &FittedModel) -> Result<i64> {
        let payload = model.to_json()?;
        let conn = self.pool.get()?;
        let id = fitted_models::insert_model(
            &conn,
            &model.ticker,
            model.p,
            model.q,
            Utc::now(),
            &payload,
        )?;

        tracing::info!(
            "Saved GARCH({},{}) model for {} as #{}",
            model.p,
            model.q,
            model.ticker,
            id
        );
        Ok(id)
    }

    /// Most recently saved model for a ticker
    pub fn load_model(&self, ticker: &str) -> Result<Option<FittedModel>> {
        let conn = self.pool.get()?;
        match fitted_models::latest_model(&conn, ticker)? {
            Some(stored) => Ok(Some(FittedModel::from_json(&stored.payload)?)),
            None => Ok(None),
        }
    }

    /// Saved model rows for a ticker, newest first
    pub fn list_models(&self, ticker: &str) -> Result<Vec<StoredModel>> {
        let conn = self.pool.get()?;
        fitted_models::list_models(&conn, ticker)
    }

    /// Delete every saved model for a ticker
    pub fn delete_models(&self, ticker: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        fitted_models::delete_models(&conn, ticker)
    }

    // ========== Holiday Methods ==========

    pub fn add_holiday(&self, date: NaiveDate, description: Option<&str>) -> Result<MarketHoliday> {
        let conn = self.pool.get()?;
        market::add_holiday(&conn, date, description)
    }

    pub fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<MarketHoliday>> {
        let conn = self.pool.get()?;
        market::holidays_between(&conn, from, to)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> Result<bool> {
        let conn = self.pool.get()?;
        market::is_holiday(&conn, date)
    }

    pub fn delete_holiday(&self, date: NaiveDate) -> Result<bool> {
        let conn = self.pool.get()?;
        market::delete_holiday(&conn, date)
    }
}

//! SQLite database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Saved fitted model row; `payload` is the JSON-encoded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModel {
    pub id: i64,
    pub ticker: String,
    pub p: usize,
    pub q: usize,
    pub saved_at: DateTime<Utc>,
    pub payload: String,
}

/// Market holiday entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHoliday {
    pub id: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
}

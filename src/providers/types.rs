//! Alpha Vantage payload types

use serde::Deserialize;
use std::collections::BTreeMap;

/// `TIME_SERIES_DAILY` response.
///
/// Errors and throttling come back with HTTP 200 and one of the message
/// fields set instead of the series.
#[derive(Debug, Clone, Deserialize)]
pub struct DailySeriesResponse {
    #[serde(rename = "Meta Data")]
    pub meta: Option<MetaData>,
    #[serde(rename = "Time Series (Daily)")]
    pub series: Option<BTreeMap<String, DailyBar>>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaData {
    #[serde(rename = "2. Symbol")]
    pub symbol: Option<String>,
}

/// One session; the provider sends every number as a string
#[derive(Debug, Clone, Deserialize)]
pub struct DailyBar {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. volume")]
    pub volume: String,
}

/// `outputsize` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    /// Latest 100 sessions
    Compact,
    /// Full history
    Full,
}

/// Sessions returned by a compact request
pub const COMPACT_SESSIONS: usize = 100;

impl OutputSize {
    pub fn for_hint(size_hint: usize) -> Self {
        if size_hint <= COMPACT_SESSIONS {
            OutputSize::Compact
        } else {
            OutputSize::Full
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

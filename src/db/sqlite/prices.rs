//! Daily price observations keyed by (ticker, trade_date)

use crate::error::{AppError, Result};
use crate::types::PriceObservation;
use chrono::NaiveDate;
use rusqlite::{params, Connection, TransactionBehavior};

/// Insert or replace a batch of observations in a single transaction.
///
/// Rows must already be validated; any SQL failure rolls back the whole batch.
pub fn upsert_observations(
    conn: &mut Connection,
    ticker: &str,
    rows: &[PriceObservation],
) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO price_observations (ticker, trade_date, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (ticker, trade_date) DO UPDATE SET
               open = excluded.open, high = excluded.high, low = excluded.low,
               close = excluded.close, volume = excluded.volume,
               updated_at = datetime('now')",
        )?;

        for row in rows {
            stmt.execute(params![
                ticker,
                row.timestamp,
                row.open,
                row.high,
                row.low,
                row.close,
                row.volume,
            ])?;
            count += 1;
        }
    }

    tx.commit()?;

    Ok(count)
}

/// Most recent `limit` observations, returned in ascending date order
pub fn read_recent(conn: &Connection, ticker: &str, limit: usize) -> Result<Vec<PriceObservation>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(
        "SELECT ticker, trade_date, open, high, low, close, volume
         FROM price_observations
         WHERE ticker = ?1
         ORDER BY trade_date DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(params![ticker, limit], |row| {
            Ok(PriceObservation {
                ticker: row.get(0)?,
                timestamp: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(decode_error)?;

    rows.reverse();
    Ok(rows)
}

/// Number of stored observations for a ticker
pub fn count(conn: &Connection, ticker: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM price_observations WHERE ticker = ?1",
        params![ticker],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Date of the newest stored observation
pub fn latest_date(conn: &Connection, ticker: &str) -> Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> = conn
        .query_row(
            "SELECT MAX(trade_date) FROM price_observations WHERE ticker = ?1",
            params![ticker],
            |row| row.get(0),
        )
        .map_err(decode_error)?;
    Ok(date)
}

/// Persisted rows that no longer decode are a schema problem, not an I/O one
fn decode_error(err: rusqlite::Error) -> AppError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(column, _, source) => {
            AppError::Schema(format!("column {} could not be decoded: {}", column, source))
        }
        rusqlite::Error::InvalidColumnType(column, name, kind) => AppError::Schema(format!(
            "column {} ({}) has unexpected type {}",
            column, name, kind
        )),
        other => AppError::Storage(other),
    }
}

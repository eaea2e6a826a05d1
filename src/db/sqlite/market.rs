//! Market holidays
//!
//! Dates registered here are skipped by the trading calendar in addition to
//! weekends.

use super::models::MarketHoliday;
use crate::error::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection};

/// Register a holiday; re-registering a date replaces its description
pub fn add_holiday(
    conn: &Connection,
    date: NaiveDate,
    description: Option<&str>,
) -> Result<MarketHoliday> {
    conn.execute(
        "INSERT INTO market_holidays (date, description) VALUES (?1, ?2)
         ON CONFLICT (date) DO UPDATE SET description = excluded.description",
        params![date, description],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM market_holidays WHERE date = ?1",
        params![date],
        |row| row.get(0),
    )?;

    tracing::info!("Registered market holiday: {} ({})", date, id);

    Ok(MarketHoliday {
        id,
        date,
        description: description.map(str::to_string),
    })
}

/// Holidays within `[from, to]`, ordered by date
pub fn holidays_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MarketHoliday>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, description FROM market_holidays
         WHERE date >= ?1 AND date <= ?2
         ORDER BY date",
    )?;

    let holidays = stmt
        .query_map(params![from, to], |row| {
            Ok(MarketHoliday {
                id: row.get(0)?,
                date: row.get(1)?,
                description: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(holidays)
}

/// Check if a date is a registered holiday
pub fn is_holiday(conn: &Connection, date: NaiveDate) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM market_holidays WHERE date = ?1",
        params![date],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// Delete a market holiday
pub fn delete_holiday(conn: &Connection, date: NaiveDate) -> Result<bool> {
    let rows = conn.execute("DELETE FROM market_holidays WHERE date = ?1", params![date])?;
    Ok(rows > 0)
}

//! Persisted fitted models, keyed by ticker

use super::models::StoredModel;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Store a serialized model and return its row id
pub fn insert_model(
    conn: &Connection,
    ticker: &str,
    p: usize,
    q: usize,
    saved_at: DateTime<Utc>,
    payload: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO fitted_models (ticker, p, q, saved_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![ticker, p as i64, q as i64, saved_at, payload],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Most recently saved model for a ticker
pub fn latest_model(conn: &Connection, ticker: &str) -> Result<Option<StoredModel>> {
    let model = conn
        .query_row(
            "SELECT id, ticker, p, q, saved_at, payload
             FROM fitted_models WHERE ticker = ?1
             ORDER BY id DESC LIMIT 1",
            params![ticker],
            map_row,
        )
        .optional()?;

    Ok(model)
}

/// All saved models for a ticker, newest first
pub fn list_models(conn: &Connection, ticker: &str) -> Result<Vec<StoredModel>> {
    let mut stmt = conn.prepare(
        "SELECT id, ticker, p, q, saved_at, payload
         FROM fitted_models WHERE ticker = ?1
         ORDER BY id DESC",
    )?;

    let models = stmt
        .query_map(params![ticker], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(models)
}

/// Remove every saved model for a ticker
pub fn delete_models(conn: &Connection, ticker: &str) -> Result<usize> {
    let rows = conn.execute("DELETE FROM fitted_models WHERE ticker = ?1", params![ticker])?;
    Ok(rows)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredModel> {
    Ok(StoredModel {
        id: row.get(0)?,
        ticker: row.get(1)?,
        p: row.get::<_, i64>(2)? as usize,
        q: row.get::<_, i64>(3)? as usize,
        saved_at: row.get(4)?,
        payload: row.get(5)?,
    })
}

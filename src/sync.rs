//! Sync ledger: a single-row table holding the last synchronization time.
//!
//! The row has primary key 1 and an integer Unix-epoch timestamp. It is
//! created once per database and only ever updated afterwards.

use crate::core::db::{begin, commit, execute, prepare_and_run, ConnectionProvider};
use crate::core::{Result, SyncqlError};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

/// Name of the ledger table.
pub const SYNC_TABLE: &str = "sync_table";

/// Creates the ledger with the current time unless it already exists.
///
/// Returns the changes count of the creating transaction, or `0` when the
/// table was already there.
pub fn ensure_sync_table<P: ConnectionProvider + ?Sized>(
    provider: &P,
    conn: &Connection,
) -> Result<i64> {
    if provider.table_exists(conn, SYNC_TABLE)? {
        debug!("{} already exists", SYNC_TABLE);
        return Ok(0);
    }

    let now = Utc::now().timestamp();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
             id INTEGER PRIMARY KEY NOT NULL,
             sync_date INTEGER);
         INSERT INTO {table} (id, sync_date) VALUES (1, {now});",
        table = SYNC_TABLE,
        now = now
    );

    let tx = begin(conn)?;
    let changes = execute(&tx, &sql)?;
    commit(tx)?;
    info!("Created {} with sync date {}", SYNC_TABLE, now);
    Ok(changes)
}

/// Stamps the ledger with the current time.
pub fn set_sync_date(conn: &Connection) -> Result<bool> {
    set_sync_date_to(conn, Utc::now().timestamp())
}

/// Stamps the ledger with `timestamp` (Unix-epoch seconds).
///
/// Returns `true` once the update statement has run to completion. This does
/// not check how many rows the update touched.
pub fn set_sync_date_to(conn: &Connection, timestamp: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET sync_date = {} WHERE id = 1;",
        SYNC_TABLE, timestamp
    );
    let last_id = prepare_and_run(conn, &sql, &[])?;
    Ok(last_id != -1)
}

/// Reads the recorded sync date.
pub fn get_sync_date(conn: &Connection) -> Result<i64> {
    let sql = format!("SELECT sync_date FROM {} WHERE id = 1;", SYNC_TABLE);
    let rows = crate::core::db::select(conn, &sql, &[])?;
    rows.first()
        .and_then(|row| row.get("sync_date"))
        .and_then(|value| value.as_i64())
        .ok_or_else(|| SyncqlError::InvalidInput(format!("{} has no sync date", SYNC_TABLE)))
}

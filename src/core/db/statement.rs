/// Statement Execution Module
///
/// Runs write statements against an open connection. A prepared statement is
/// always finalized before these functions return, whichever stage failed.

use crate::core::db::value::{bind_values, SqlValue};
use crate::core::error::{engine_status, StatementStage};
use crate::core::{Result, SyncqlError};
use rusqlite::Connection;
use tracing::{debug, error};

/// Runs `sql` without parameters and returns the connection's cumulative change count.
///
/// `sql` may contain several `;`-separated statements.
pub fn execute(conn: &Connection, sql: &str) -> Result<i64> {
    conn.execute_batch(sql).map_err(|e| {
        let (code, message) = engine_status(&e);
        SyncqlError::Execute { code, message }
    })?;
    total_changes(conn)
}

/// Prepares `sql`, binds `values` (1-based), steps it to completion and
/// returns the last inserted row id.
///
/// The statement must finish with a single "done" step; a statement that
/// produces rows is a step failure. A bind failure is reported in preference
/// to anything later and the statement is not stepped. A finalize failure is
/// appended to an earlier failure rather than replacing it.
pub fn prepare_and_run(conn: &Connection, sql: &str, values: &[SqlValue]) -> Result<i64> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| statement_error(StatementStage::Prepare, &e))?;

    let mut failure = None;
    if !values.is_empty() {
        if let Err(e) = bind_values(&mut stmt, values) {
            failure = Some(e);
        }
    }
    if failure.is_none() {
        if let Err(e) = stmt.raw_execute() {
            failure = Some(statement_error(StatementStage::Step, &e));
        }
    }

    let finalized = stmt.finalize();
    match (failure, finalized) {
        (None, Ok(())) => {
            let last_id = conn.last_insert_rowid();
            debug!("Statement completed, last insert id {}", last_id);
            Ok(last_id)
        }
        (None, Err(e)) => Err(statement_error(StatementStage::Finalize, &e)),
        (Some(err), Ok(())) => Err(err),
        (Some(err), Err(e)) => {
            error!("Finalize failed after an earlier failure: {}", e);
            Err(append_finalize_failure(err, &e))
        }
    }
}

/// Returns the number of rows changed since the connection was opened.
pub fn total_changes(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
        .map_err(|e| {
            let (code, message) = engine_status(&e);
            SyncqlError::Execute { code, message }
        })
}

fn statement_error(stage: StatementStage, err: &rusqlite::Error) -> SyncqlError {
    let (code, message) = engine_status(err);
    SyncqlError::Prepare {
        stage,
        code,
        message,
    }
}

/// Adds a finalize failure to an earlier statement error without changing its kind.
pub(crate) fn append_finalize_failure(err: SyncqlError, finalize: &rusqlite::Error) -> SyncqlError {
    let (fcode, fmessage) = engine_status(finalize);
    let note = format!("; finalize failed rc: {} message: {}", fcode, fmessage);
    match err {
        SyncqlError::Prepare {
            stage,
            code,
            message,
        } => SyncqlError::Prepare {
            stage,
            code,
            message: message + &note,
        },
        SyncqlError::Query {
            stage,
            code,
            message,
        } => SyncqlError::Query {
            stage,
            code,
            message: message + &note,
        },
        other => other,
    }
}

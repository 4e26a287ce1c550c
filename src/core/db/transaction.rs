/// Transaction Coordination Module
///
/// Wraps statement execution in begin/commit so that a batch either commits
/// as a whole or leaves no trace. A transaction that is not committed is
/// rolled back when its guard is dropped, and closing the connection would
/// discard it in any case.

use crate::core::db::statement::{prepare_and_run, total_changes};
use crate::core::db::value::SqlValue;
use crate::core::{Result, SyncqlError};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One member of a batch: SQL text and its ordered parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    pub statement: String,
    #[serde(default)]
    pub values: Vec<SqlValue>,
}

impl SetStatement {
    pub fn new(statement: impl Into<String>, values: Vec<SqlValue>) -> Self {
        SetStatement {
            statement: statement.into(),
            values,
        }
    }
}

/// Changes count and last inserted row id reported by a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesResult {
    pub changes: i64,
    #[serde(rename = "lastId")]
    pub last_id: i64,
}

impl ChangesResult {
    /// Sentinel reported by outer surfaces when an operation failed.
    pub fn failure() -> Self {
        ChangesResult {
            changes: -1,
            last_id: -1,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.changes == -1
    }
}

/// Begins a deferred transaction on `conn`.
pub fn begin(conn: &Connection) -> Result<Transaction<'_>> {
    conn.unchecked_transaction()
        .map_err(|e| SyncqlError::Transaction(format!("begin transaction failed: {}", e)))
}

/// Commits `tx`.
pub fn commit(tx: Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|e| SyncqlError::Transaction(format!("commit transaction failed: {}", e)))
}

/// Runs every member of `set` inside one transaction.
///
/// Stops at the first failing member without running the rest and without
/// committing. On success returns the connection's total changes after commit.
pub fn exec_set(conn: &Connection, set: &[SetStatement]) -> Result<i64> {
    if set.is_empty() {
        return Err(SyncqlError::InvalidInput("no statements given".to_string()));
    }

    let tx = begin(conn)?;
    for (index, member) in set.iter().enumerate() {
        if let Err(e) = prepare_and_run(&tx, &member.statement, &member.values) {
            warn!("Batch member {} failed, discarding the batch: {}", index, e);
            return Err(SyncqlError::BatchMember {
                index,
                source: Box::new(e),
            });
        }
    }
    commit(tx)?;

    let changes = total_changes(conn)?;
    debug!("Batch of {} statements committed, {} changes", set.len(), changes);
    Ok(changes)
}

/// Runs a single parameterized statement inside a transaction.
pub fn run_sql(conn: &Connection, sql: &str, values: &[SqlValue]) -> Result<ChangesResult> {
    let tx = begin(conn)?;
    let last_id = prepare_and_run(&tx, sql, values)?;
    commit(tx)?;

    Ok(ChangesResult {
        changes: total_changes(conn)?,
        last_id,
    })
}

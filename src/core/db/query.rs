/// Query Execution Module
///
/// This module runs read statements and collects their rows as column-name to
/// value mappings. Reads take text-typed parameters only and run outside of
/// any transaction.

use crate::core::db::statement::append_finalize_failure;
use crate::core::db::value::{bind_text_values, RowMap, SqlValue};
use crate::core::error::{engine_status, StatementStage};
use crate::core::{Result, SyncqlError};
use rusqlite::{Connection, Statement};
use tracing::{debug, error};

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    /// Executes a read statement and returns its rows in the order the engine yields them.
    ///
    /// # Arguments
    ///
    /// * `sql` - The SQL query to execute
    /// * `values` - Text values bound to the statement's parameters, 1-based
    ///
    /// # Errors
    ///
    /// Returns `SyncqlError::Query` tagged with the failing stage. The
    /// statement is finalized whether or not the query succeeds.
    pub fn select(&self, sql: &str, values: &[String]) -> Result<Vec<RowMap>> {
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| query_error(StatementStage::Prepare, &e))?;

        let collected = collect_rows(&mut stmt, values);
        let finalized = stmt.finalize();

        match (collected, finalized) {
            (Ok(rows), Ok(())) => {
                debug!("Query returned {} rows", rows.len());
                Ok(rows)
            }
            (Ok(_), Err(e)) => Err(query_error(StatementStage::Finalize, &e)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                error!("Finalize failed after an earlier failure: {}", e);
                Err(append_finalize_failure(err, &e))
            }
        }
    }
}

fn collect_rows(stmt: &mut Statement<'_>, values: &[String]) -> Result<Vec<RowMap>> {
    if !values.is_empty() {
        bind_text_values(stmt, values).map_err(|e| match e {
            SyncqlError::Prepare {
                stage,
                code,
                message,
            } => SyncqlError::Query {
                stage,
                code,
                message,
            },
            other => other,
        })?;
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut result = Vec::new();
    let mut rows = stmt.raw_query();
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(query_error(StatementStage::Step, &e)),
        };
        let mut mapped = RowMap::new();
        for (i, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| query_error(StatementStage::Step, &e))?;
            mapped.insert(name.clone(), SqlValue::from_value_ref(value));
        }
        result.push(mapped);
    }
    Ok(result)
}

fn query_error(stage: StatementStage, err: &rusqlite::Error) -> SyncqlError {
    let (code, message) = engine_status(err);
    SyncqlError::Query {
        stage,
        code,
        message,
    }
}

/// Convenience function to run a select on a connection
pub fn select(conn: &Connection, sql: &str, values: &[String]) -> Result<Vec<RowMap>> {
    QueryExecutor::new(conn).select(sql, values)
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// PRAGMA statement
    Pragma,
    /// BEGIN/COMMIT/ROLLBACK transaction commands
    Transaction,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim().to_uppercase();

        if sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH") {
            StatementType::Select
        } else if sql_upper.starts_with("INSERT") {
            StatementType::Insert
        } else if sql_upper.starts_with("UPDATE") {
            StatementType::Update
        } else if sql_upper.starts_with("DELETE") {
            StatementType::Delete
        } else if sql_upper.starts_with("CREATE") {
            StatementType::Create
        } else if sql_upper.starts_with("DROP") {
            StatementType::Drop
        } else if sql_upper.starts_with("ALTER") {
            StatementType::Alter
        } else if sql_upper.starts_with("PRAGMA") {
            StatementType::Pragma
        } else if sql_upper.starts_with("BEGIN")
            || sql_upper.starts_with("COMMIT")
            || sql_upper.starts_with("ROLLBACK")
            || sql_upper.starts_with("END")
        {
            StatementType::Transaction
        } else {
            StatementType::Other
        }
    }

    /// Whether statements of this type produce rows and belong on the read path.
    pub fn returns_rows(self) -> bool {
        matches!(self, StatementType::Select | StatementType::Pragma)
    }
}

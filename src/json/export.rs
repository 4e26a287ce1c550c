//! Building a [`JsonSqlite`] document from a live database.

use super::import::table_columns;
use super::{quote_identifier, JsonColumn, JsonIndex, JsonMode, JsonSqlite, JsonTable};
use crate::core::db::{select, RowMap, SqlValue};
use crate::core::{Result, SyncqlError};
use crate::sync::{get_sync_date, SYNC_TABLE};
use rusqlite::Connection;
use tracing::{debug, info};

const LAST_MODIFIED: &str = "last_modified";

/// Exports the user tables of `conn`.
///
/// Full mode exports every table except the sync ledger with its schema,
/// indexes and rows. Partial mode needs the ledger and exports only rows whose
/// `last_modified` is later than the recorded sync date; tables without that
/// column or without such rows are left out.
pub fn build_export_object(
    conn: &Connection,
    database: &str,
    encrypted: bool,
    mode: JsonMode,
) -> Result<JsonSqlite> {
    let names = user_tables(conn)?;
    let mut tables = Vec::with_capacity(names.len());

    match mode {
        JsonMode::Full => {
            for name in &names {
                let columns = table_columns(conn, name)?;
                let rows = select(conn, &format!("SELECT * FROM {}", quote_identifier(name)), &[])?;
                tables.push(JsonTable {
                    name: name.clone(),
                    schema: Some(table_schema(conn, name)?),
                    indexes: Some(table_indexes(conn, name)?),
                    values: Some(row_values(&columns, &rows)),
                });
            }
        }
        JsonMode::Partial => {
            if !names_sync_table(conn)? {
                return Err(SyncqlError::InvalidInput(format!(
                    "partial export needs the {} table",
                    SYNC_TABLE
                )));
            }
            let sync_date = get_sync_date(conn)?;
            for name in &names {
                let columns = table_columns(conn, name)?;
                if !columns.iter().any(|c| c == LAST_MODIFIED) {
                    debug!("Skipping {}: no {} column", name, LAST_MODIFIED);
                    continue;
                }
                let sql = format!(
                    "SELECT * FROM {} WHERE {} > {}",
                    quote_identifier(name),
                    LAST_MODIFIED,
                    sync_date
                );
                let rows = select(conn, &sql, &[])?;
                if rows.is_empty() {
                    continue;
                }
                tables.push(JsonTable {
                    name: name.clone(),
                    schema: None,
                    indexes: None,
                    values: Some(row_values(&columns, &rows)),
                });
            }
        }
    }

    info!("Exported {} tables from {} ({})", tables.len(), database, mode);
    Ok(JsonSqlite {
        database: database.to_string(),
        encrypted,
        mode,
        tables,
    })
}

/// User tables in creation order, without the sync ledger.
fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let rows = select(
        conn,
        "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, 7) <> 'sqlite_' AND name <> ?1 ORDER BY rowid",
        &[SYNC_TABLE.to_string()],
    )?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("name").and_then(SqlValue::as_str).map(String::from))
        .collect())
}

fn names_sync_table(conn: &Connection) -> Result<bool> {
    let rows = select(
        conn,
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
        &[SYNC_TABLE.to_string()],
    )?;
    Ok(!rows.is_empty())
}

fn table_schema(conn: &Connection, table: &str) -> Result<Vec<JsonColumn>> {
    let info = select(conn, &format!("PRAGMA table_info({})", quote_identifier(table)), &[])?;
    let mut key_columns: Vec<(i64, &str)> = info
        .iter()
        .filter(|row| int(row, "pk") > 0)
        .filter_map(|row| text(row, "name").map(|name| (int(row, "pk"), name)))
        .collect();
    key_columns.sort_unstable();
    let pk_count = key_columns.len();

    let mut schema = Vec::with_capacity(info.len());
    for row in &info {
        let mut parts = Vec::new();
        if let Some(kind) = text(row, "type").filter(|k| !k.is_empty()) {
            parts.push(kind.to_string());
        }
        if pk_count == 1 && int(row, "pk") > 0 {
            parts.push("PRIMARY KEY".to_string());
        }
        if int(row, "notnull") > 0 {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = text(row, "dflt_value") {
            parts.push(format!("DEFAULT {}", default));
        }
        schema.push(JsonColumn {
            column: text(row, "name").map(String::from),
            value: parts.join(" "),
            foreignkey: None,
            constraint: None,
        });
    }
    if pk_count > 1 {
        let names: Vec<String> = key_columns.iter().map(|(_, n)| quote_identifier(n)).collect();
        schema.push(JsonColumn {
            column: None,
            value: format!("PRIMARY KEY ({})", names.join(", ")),
            foreignkey: None,
            constraint: Some(format!("pk_{}", table)),
        });
    }

    let keys = select(conn, &format!("PRAGMA foreign_key_list({})", quote_identifier(table)), &[])?;
    for key in keys.iter().filter(|row| int(row, "seq") == 0) {
        let (Some(from), Some(parent)) = (text(key, "from"), text(key, "table")) else {
            continue;
        };
        let mut value = match text(key, "to") {
            Some(to) => format!("REFERENCES {}({})", quote_identifier(parent), quote_identifier(to)),
            None => format!("REFERENCES {}", quote_identifier(parent)),
        };
        for (clause, column) in [("ON DELETE", "on_delete"), ("ON UPDATE", "on_update")] {
            if let Some(action) = text(key, column).filter(|a| *a != "NO ACTION") {
                value.push_str(&format!(" {} {}", clause, action));
            }
        }
        schema.push(JsonColumn {
            column: None,
            value,
            foreignkey: Some(from.to_string()),
            constraint: None,
        });
    }
    Ok(schema)
}

fn table_indexes(conn: &Connection, table: &str) -> Result<Vec<JsonIndex>> {
    let list = select(conn, &format!("PRAGMA index_list({})", quote_identifier(table)), &[])?;
    let mut indexes = Vec::new();
    for entry in list.iter().filter(|row| text(row, "origin") == Some("c")) {
        let Some(name) = text(entry, "name") else {
            continue;
        };
        let info = select(conn, &format!("PRAGMA index_info({})", quote_identifier(name)), &[])?;
        if let Some(column) = info.first().and_then(|row| text(row, "name")) {
            indexes.push(JsonIndex {
                name: name.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(indexes)
}

fn row_values(columns: &[String], rows: &[RowMap]) -> Vec<Vec<SqlValue>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(SqlValue::Null))
                .collect()
        })
        .collect()
}

fn text<'r>(row: &'r RowMap, column: &str) -> Option<&'r str> {
    row.get(column).and_then(SqlValue::as_str)
}

fn int(row: &RowMap, column: &str) -> i64 {
    row.get(column).and_then(SqlValue::as_i64).unwrap_or(0)
}

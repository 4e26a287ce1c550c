//! Creating tables, indexes and rows from a [`JsonSqlite`] document.

use super::{quote_identifier, JsonMode, JsonSqlite, JsonTable};
use crate::core::db::{begin, commit, execute, prepare_and_run, select, total_changes, SqlValue};
use crate::core::error::{engine_status, StatementStage};
use crate::core::{Result, SyncqlError};
use rusqlite::Connection;
use tracing::{debug, info};

/// Creates the schema described by `json` in one transaction.
///
/// In full mode every listed table that carries a schema is dropped first, in
/// reverse order. Returns the connection's total changes after commit.
pub fn create_schema(conn: &Connection, json: &JsonSqlite) -> Result<i64> {
    let mut statements = Vec::new();

    if json.mode == JsonMode::Full {
        for table in json.tables.iter().rev().filter(|t| t.schema.is_some()) {
            statements.push(format!("DROP TABLE IF EXISTS {};", quote_identifier(&table.name)));
        }
    }
    for table in &json.tables {
        if let Some(create) = create_table_sql(table) {
            statements.push(create);
        }
        for index in table.indexes.iter().flatten() {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                quote_identifier(&index.name),
                quote_identifier(&table.name),
                quote_identifier(&index.column)
            ));
        }
    }

    if statements.is_empty() {
        return total_changes(conn);
    }

    let tx = begin(conn)?;
    execute(&tx, &statements.join("\n"))?;
    commit(tx)?;
    info!("Created schema for {} tables", json.tables.len());
    total_changes(conn)
}

fn create_table_sql(table: &JsonTable) -> Option<String> {
    let schema = table.schema.as_ref()?;
    let mut columns = Vec::with_capacity(schema.len());
    let mut constraints = Vec::new();
    for entry in schema {
        match (&entry.column, &entry.foreignkey, &entry.constraint) {
            (Some(column), _, _) => {
                columns.push(format!("{} {}", quote_identifier(column), entry.value).trim_end().to_string())
            }
            (None, Some(key), _) => {
                constraints.push(format!("FOREIGN KEY ({}) {}", quote_identifier(key), entry.value))
            }
            (None, None, Some(name)) => {
                constraints.push(format!("CONSTRAINT {} {}", quote_identifier(name), entry.value))
            }
            (None, None, None) => {}
        }
    }
    columns.extend(constraints);
    Some(format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_identifier(&table.name),
        columns.join(", ")
    ))
}

/// Inserts the rows of every table in `json` in one transaction.
///
/// In partial mode a row whose first value matches an existing row's first
/// column updates that row instead. Each row must have one value per column.
pub fn create_data(conn: &Connection, json: &JsonSqlite) -> Result<i64> {
    let tx = begin(conn)?;
    let mut rows_written = 0usize;

    for table in &json.tables {
        let values = match &table.values {
            Some(values) if !values.is_empty() => values,
            _ => continue,
        };
        let columns = table_columns(&tx, &table.name)?;
        if columns.is_empty() {
            return Err(SyncqlError::InvalidJson(format!("table {} does not exist", table.name)));
        }

        for (row_index, row) in values.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SyncqlError::InvalidJson(format!(
                    "table {} row {}: {} values for {} columns",
                    table.name,
                    row_index,
                    row.len(),
                    columns.len()
                )));
            }
            if json.mode == JsonMode::Partial && row_exists(&tx, &table.name, &columns[0], &row[0])? {
                update_row(&tx, &table.name, &columns, row)?;
            } else {
                insert_row(&tx, &table.name, &columns, row)?;
            }
            rows_written += 1;
        }
        debug!("Wrote {} rows into {}", values.len(), table.name);
    }

    commit(tx)?;
    info!("Imported {} rows", rows_written);
    total_changes(conn)
}

/// Column names of `table` in declaration order; empty when the table is missing.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let rows = select(conn, &format!("PRAGMA table_info({})", quote_identifier(table)), &[])?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("name").and_then(SqlValue::as_str).map(String::from))
        .collect())
}

fn row_exists(conn: &Connection, table: &str, key_column: &str, key: &SqlValue) -> Result<bool> {
    let sql = format!(
        "SELECT count(*) FROM {} WHERE {} = ?1",
        quote_identifier(table),
        quote_identifier(key_column)
    );
    conn.query_row(&sql, [key], |row| row.get::<_, i64>(0))
        .map(|count| count > 0)
        .map_err(|e| {
            let (code, message) = engine_status(&e);
            SyncqlError::Query {
                stage: StatementStage::Step,
                code,
                message,
            }
        })
}

fn insert_row(conn: &Connection, table: &str, columns: &[String], row: &[SqlValue]) -> Result<i64> {
    let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    );
    prepare_and_run(conn, &sql, row)
}

fn update_row(conn: &Connection, table: &str, columns: &[String], row: &[SqlValue]) -> Result<i64> {
    if columns.len() == 1 {
        return Ok(conn.last_insert_rowid());
    }
    let assignments: Vec<String> = columns[1..]
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote_identifier(c), i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{};",
        quote_identifier(table),
        assignments.join(", "),
        quote_identifier(&columns[0]),
        columns.len()
    );
    let mut values: Vec<SqlValue> = row[1..].to_vec();
    values.push(row[0].clone());
    prepare_and_run(conn, &sql, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(mode: &str, values: &str) -> JsonSqlite {
        JsonSqlite::from_json_str(&format!(
            r#"{{
                "database": "shop",
                "mode": "{}",
                "tables": [
                    {{
                        "name": "owners",
                        "schema": [
                            {{"column": "id", "value": "INTEGER PRIMARY KEY NOT NULL"}},
                            {{"column": "name", "value": "TEXT"}}
                        ],
                        "values": [[1, "ann"]]
                    }},
                    {{
                        "name": "items",
                        "schema": [
                            {{"column": "id", "value": "INTEGER PRIMARY KEY NOT NULL"}},
                            {{"column": "owner", "value": "INTEGER"}},
                            {{"column": "label", "value": "TEXT"}},
                            {{"foreignkey": "owner", "value": "REFERENCES owners(id)"}}
                        ],
                        "indexes": [{{"name": "index_items_label", "column": "label"}}],
                        "values": {}
                    }}
                ]
            }}"#,
            mode, values
        ))
        .unwrap()
    }

    fn labels(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT label FROM items ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_create_schema_and_data() {
        let conn = Connection::open_in_memory().unwrap();
        let json = document("full", r#"[[1, 1, "pen"], [2, 1, "ink"]]"#);

        create_schema(&conn, &json).unwrap();
        let changes = create_data(&conn, &json).unwrap();
        assert_eq!(changes, 3);
        assert_eq!(labels(&conn), vec!["pen", "ink"]);

        let index: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = 'index_items_label'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_full_mode_replaces_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let json = document("full", r#"[[1, 1, "pen"]]"#);
        create_schema(&conn, &json).unwrap();
        create_data(&conn, &json).unwrap();

        create_schema(&conn, &json).unwrap();
        create_data(&conn, &json).unwrap();
        assert_eq!(labels(&conn), vec!["pen"]);
    }

    #[test]
    fn test_partial_mode_updates_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let full = document("full", r#"[[1, 1, "pen"]]"#);
        create_schema(&conn, &full).unwrap();
        create_data(&conn, &full).unwrap();

        let partial = document("partial", r#"[[1, 1, "quill"], [2, 1, "ink"]]"#);
        create_schema(&conn, &partial).unwrap();
        create_data(&conn, &partial).unwrap();
        assert_eq!(labels(&conn), vec!["quill", "ink"]);
    }

    #[test]
    fn test_row_width_mismatch_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let json = document("full", r#"[[1, 1, "pen"], [2, "short"]]"#);
        create_schema(&conn, &json).unwrap();

        match create_data(&conn, &json) {
            Err(SyncqlError::InvalidJson(msg)) => assert!(msg.contains("row 1")),
            other => panic!("Expected InvalidJson, got {:?}", other),
        }
        assert!(labels(&conn).is_empty());
        let owners: i64 = conn
            .query_row("SELECT count(*) FROM owners", [], |r| r.get(0))
            .unwrap();
        assert_eq!(owners, 0);
    }

    #[test]
    fn test_data_for_missing_table_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let json = document("partial", r#"[[1, 1, "pen"]]"#);
        assert!(matches!(create_data(&conn, &json), Err(SyncqlError::InvalidJson(_))));
    }
}

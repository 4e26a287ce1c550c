/*
 * JSON Database Module
 *
 * Declarative description of a database (schema, indexes and rows) used to
 * import into and export out of a store.
 *
 * Features:
 * - Serde types for the JSON document
 * - Validation of identifiers and schema entries before anything runs
 * - Schema and data creation (import.rs)
 * - Full and partial export (export.rs)
 */

mod export;
mod import;

pub use export::build_export_object;
pub use import::{create_data, create_schema};

use crate::core::db::SqlValue;
use crate::core::{Result, SyncqlError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Whether an import replaces the listed tables or merges into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonMode {
    Full,
    Partial,
}

impl fmt::Display for JsonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonMode::Full => f.write_str("full"),
            JsonMode::Partial => f.write_str("partial"),
        }
    }
}

impl std::str::FromStr for JsonMode {
    type Err = SyncqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(JsonMode::Full),
            "partial" => Ok(JsonMode::Partial),
            other => Err(SyncqlError::InvalidInput(format!(
                "mode must be 'full' or 'partial', got '{}'",
                other
            ))),
        }
    }
}

/// A whole database as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSqlite {
    pub database: String,
    #[serde(default)]
    pub encrypted: bool,
    pub mode: JsonMode,
    pub tables: Vec<JsonTable>,
}

/// One table: optional schema and indexes, optional rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<JsonColumn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<JsonIndex>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<SqlValue>>>,
}

/// A column definition, a foreign key clause when `foreignkey` is set, or a
/// named table constraint when `constraint` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonColumn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreignkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonIndex {
    pub name: String,
    pub column: String,
}

impl JsonSqlite {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: JsonSqlite = serde_json::from_str(json)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks identifiers and schema entries.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(SyncqlError::InvalidJson("database name is empty".to_string()));
        }
        for table in &self.tables {
            check_identifier(&table.name)?;
            if table.schema.is_none() && table.values.is_none() {
                return Err(SyncqlError::InvalidJson(format!(
                    "table {} has neither schema nor values",
                    table.name
                )));
            }
            for column in table.schema.iter().flatten() {
                match (&column.column, &column.foreignkey, &column.constraint) {
                    (Some(name), None, None) => check_identifier(name)?,
                    (None, Some(key), None) => check_identifier(key)?,
                    (None, None, Some(name)) => check_identifier(name)?,
                    _ => {
                        return Err(SyncqlError::InvalidJson(format!(
                            "table {}: each schema entry needs exactly one of column, foreignkey or constraint",
                            table.name
                        )))
                    }
                }
            }
            for index in table.indexes.iter().flatten() {
                check_identifier(&index.name)?;
                check_identifier(&index.column)?;
            }
        }
        Ok(())
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SyncqlError::InvalidJson(format!("invalid identifier '{}'", name)))
    }
}

/// Quotes an identifier for use in generated SQL.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

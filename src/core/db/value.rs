/// Value Binding Module
///
/// Typed parameter values and the two binder entry points: any-typed binding
/// for write statements and text-only binding for read statements.

use crate::core::error::{engine_status, StatementStage};
use crate::core::{Result, SyncqlError};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Statement, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value that can be bound to a statement parameter or read from a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row: column name to value.
pub type RowMap = BTreeMap<String, SqlValue>;

impl SqlValue {
    /// Returns the integer payload, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text payload, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(i) => ValueRef::Integer(*i),
            SqlValue::Real(f) => ValueRef::Real(*f),
            SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
            SqlValue::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl TryFrom<serde_json::Value> for SqlValue {
    type Error = SyncqlError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Real(f))
                } else {
                    Err(SyncqlError::Binding(format!("number out of range: {}", n)))
                }
            }
            Value::String(s) => Ok(SqlValue::Text(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| {
                            SyncqlError::Binding(format!("blob element is not a byte: {}", item))
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(SqlValue::Blob),
            Value::Object(_) => Err(SyncqlError::Binding(
                "objects cannot be bound to a statement parameter".to_string(),
            )),
        }
    }
}

impl From<SqlValue> for serde_json::Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => i.into(),
            SqlValue::Real(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => s.into(),
            SqlValue::Blob(b) => b.into_iter().map(serde_json::Value::from).collect(),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

/// Binds `values` to the statement's parameters, 1-based, in order.
///
/// Stops at the first value the engine rejects; the error is tagged with the
/// bind stage and the offending index.
pub fn bind_values(stmt: &mut Statement<'_>, values: &[SqlValue]) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        bind_at(stmt, i + 1, value)?;
    }
    Ok(())
}

/// Binds text values only. Read predicates are always bound as text.
pub fn bind_text_values(stmt: &mut Statement<'_>, values: &[String]) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        bind_at(stmt, i + 1, &value.as_str())?;
    }
    Ok(())
}

fn bind_at<T: ToSql + ?Sized>(stmt: &mut Statement<'_>, index: usize, value: &T) -> Result<()> {
    stmt.raw_bind_parameter(index, value).map_err(|e| {
        let (code, message) = engine_status(&e);
        SyncqlError::Prepare {
            stage: StatementStage::Bind,
            code,
            message: format!("parameter {}: {}", index, message),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_json_conversion() {
        let values: Vec<SqlValue> =
            serde_json::from_str(r#"[null, 1, 2.5, "x", true, [1, 2, 255]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Integer(1),
                SqlValue::Real(2.5),
                SqlValue::Text("x".to_string()),
                SqlValue::Integer(1),
                SqlValue::Blob(vec![1, 2, 255]),
            ]
        );
    }

    #[test]
    fn test_json_conversion_rejects_objects_and_bad_blobs() {
        assert!(serde_json::from_str::<SqlValue>(r#"{"a": 1}"#).is_err());
        assert!(serde_json::from_str::<SqlValue>("[256]").is_err());

        let err = SqlValue::try_from(serde_json::json!({"a": 1})).unwrap_err();
        assert!(matches!(err, SyncqlError::Binding(_)));
    }

    #[test]
    fn test_serialize_to_json() {
        let json = serde_json::to_string(&vec![
            SqlValue::Null,
            SqlValue::Integer(7),
            SqlValue::Text("a".to_string()),
            SqlValue::Blob(vec![0, 1]),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,7,"a",[0,1]]"#);
    }

    #[test]
    fn test_bind_values_by_position() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1, ?2, ?3").unwrap();
        bind_values(
            &mut stmt,
            &[SqlValue::Integer(3), SqlValue::from("t"), SqlValue::Null],
        )
        .unwrap();
        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        assert_eq!(row.get::<_, i64>(0).unwrap(), 3);
        assert_eq!(row.get::<_, String>(1).unwrap(), "t");
        assert_eq!(row.get::<_, Option<String>>(2).unwrap(), None);
    }

    #[test]
    fn test_bind_too_many_values_fails_at_bind_stage() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1").unwrap();
        let err = bind_text_values(&mut stmt, &["a".to_string(), "b".to_string()]).unwrap_err();
        match err {
            SyncqlError::Prepare { stage, message, .. } => {
                assert_eq!(stage, StatementStage::Bind);
                assert!(message.starts_with("parameter 2"));
            }
            other => panic!("Expected bind failure, got {:?}", other),
        }
    }
}

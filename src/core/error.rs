/// syncql Error Module
///
/// This module defines the error type shared by every layer of the crate.
/// Errors are tagged by the stage that failed, and carry the engine's numeric
/// status code and message text where the engine produced one. Operation-level
/// variants wrap the component error that caused them instead of replacing it.
use std::fmt;
use thiserror::Error;

/// The step of a prepared statement's lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStage {
    Prepare,
    Bind,
    Step,
    Finalize,
}

impl fmt::Display for StatementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementStage::Prepare => "prepare",
            StatementStage::Bind => "bind",
            StatementStage::Step => "step",
            StatementStage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Error type for the syncql crate.
///
/// Component errors (`Execute`, `Prepare`, `Query`, `Transaction`, ...) are
/// produced at the boundary of the component that owns the failing stage.
/// The Database lifecycle manager re-raises them wrapped in the variant named
/// after the public operation (`ExecSet`, `RunSql`, `Select`, ...).
#[derive(Error, Debug)]
pub enum SyncqlError {
    /// The database name could not be turned into a file path
    #[error("File path error: {0}")]
    FilePath(String),

    /// Opening a connection failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The supplied secret does not decrypt the database
    #[error("Wrong secret: {0}")]
    WrongSecret(String),

    /// Re-keying the database with a new secret failed
    #[error("Secret rotation error: {0}")]
    SecretRotation(String),

    /// An operation was attempted while the database is closed
    #[error("Database not open: {0}")]
    NotOpen(String),

    /// A parameterless SQL script failed
    #[error("execute failed rc: {code} message: {message}")]
    Execute { code: i32, message: String },

    /// A write statement failed while being prepared, bound, stepped or finalized
    #[error("prepare sql {stage} failed rc: {code} message: {message}")]
    Prepare {
        stage: StatementStage,
        code: i32,
        message: String,
    },

    /// A read statement failed while being prepared, bound, stepped or finalized
    #[error("query sql {stage} failed rc: {code} message: {message}")]
    Query {
        stage: StatementStage,
        code: i32,
        message: String,
    },

    /// A value could not be converted to a bindable SQL value
    #[error("Binding error: {0}")]
    Binding(String),

    /// One member of a batch failed; nothing from the batch was committed
    #[error("batch member {index} failed: {source}")]
    BatchMember {
        index: usize,
        #[source]
        source: Box<SyncqlError>,
    },

    /// Caller-supplied input was rejected before touching the engine
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Begin or commit failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Checking for a table's existence failed
    #[error("Table existence check failed: {0}")]
    TableExists(String),

    /// Closing a connection failed after an otherwise successful operation
    #[error("Close error: {0}")]
    Close(String),

    /// Removing the database file failed
    #[error("Delete error: {0}")]
    Delete(String),

    /// A JSON import document failed validation
    #[error("Invalid JSON database: {0}")]
    InvalidJson(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("exec sql failed: {0}")]
    ExecSql(#[source] Box<SyncqlError>),

    #[error("exec set failed: {0}")]
    ExecSet(#[source] Box<SyncqlError>),

    #[error("run sql failed: {0}")]
    RunSql(#[source] Box<SyncqlError>),

    #[error("select sql failed: {0}")]
    Select(#[source] Box<SyncqlError>),

    #[error("create sync table failed: {0}")]
    SyncTable(#[source] Box<SyncqlError>),

    #[error("sync date failed: {0}")]
    SyncDate(#[source] Box<SyncqlError>),

    #[error("import from json failed: {0}")]
    Import(#[source] Box<SyncqlError>),

    #[error("export to json failed: {0}")]
    Export(#[source] Box<SyncqlError>),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncqlError {
    /// Returns the engine status code carried by this error or by the error it wraps.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            SyncqlError::Execute { code, .. }
            | SyncqlError::Prepare { code, .. }
            | SyncqlError::Query { code, .. } => Some(*code),
            SyncqlError::BatchMember { source: inner, .. }
            | SyncqlError::ExecSql(inner)
            | SyncqlError::ExecSet(inner)
            | SyncqlError::RunSql(inner)
            | SyncqlError::Select(inner)
            | SyncqlError::SyncTable(inner)
            | SyncqlError::SyncDate(inner)
            | SyncqlError::Import(inner)
            | SyncqlError::Export(inner) => inner.status_code(),
            _ => None,
        }
    }

    /// Returns the failing statement stage, looking through wrapping variants.
    pub fn stage(&self) -> Option<StatementStage> {
        match self {
            SyncqlError::Prepare { stage, .. } | SyncqlError::Query { stage, .. } => Some(*stage),
            SyncqlError::BatchMember { source: inner, .. }
            | SyncqlError::ExecSql(inner)
            | SyncqlError::ExecSet(inner)
            | SyncqlError::RunSql(inner)
            | SyncqlError::Select(inner)
            | SyncqlError::SyncTable(inner)
            | SyncqlError::SyncDate(inner)
            | SyncqlError::Import(inner)
            | SyncqlError::Export(inner) => inner.stage(),
            _ => None,
        }
    }
}

/// Splits a rusqlite error into the engine's numeric status and message text.
///
/// Errors that did not come from the engine itself report `SQLITE_ERROR`.
pub(crate) fn engine_status(err: &rusqlite::Error) -> (i32, String) {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => (
            code.extended_code,
            message.clone().unwrap_or_else(|| code.to_string()),
        ),
        rusqlite::Error::ExecuteReturnedResults => (
            rusqlite::ffi::SQLITE_ROW,
            "statement produced rows where none were expected".to_string(),
        ),
        other => (rusqlite::ffi::SQLITE_ERROR, other.to_string()),
    }
}

/// Type alias for Result to use SyncqlError as the error type.
pub type Result<T> = std::result::Result<T, SyncqlError>;

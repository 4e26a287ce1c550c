/// Database Lifecycle Module
///
/// A [`Database`] names one store on disk and carries its encryption settings
/// and open flag. Every public operation gets a fresh connection from the
/// [`ConnectionProvider`], does its work and closes the connection before
/// returning. A close failure after a successful operation is an error of its
/// own; after a failed operation it is only logged.
use crate::config::DatabaseConfig;
use crate::core::db::{
    self, ChangesResult, ConnectionProvider, OpenFailure, OpenOptions, OpenOutcome, RowMap,
    SetStatement, SqlValue, SqliteConnectionProvider,
};
use crate::core::{Result, SyncqlError};
use crate::json::{self, JsonMode, JsonSqlite};
use crate::sync;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Side files the engine may leave next to the main database file.
const SIDE_FILE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// A named store and the settings used to open it.
#[derive(Debug)]
pub struct Database<P: ConnectionProvider = SqliteConnectionProvider> {
    name: String,
    path: PathBuf,
    options: OpenOptions,
    encrypted: bool,
    is_open: bool,
    provider: P,
}

impl Database<SqliteConnectionProvider> {
    /// Creates a database backed by bundled SQLite, in `config.directory`
    /// when set.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let provider = match &config.directory {
            Some(dir) => SqliteConnectionProvider::with_directory(dir),
            None => SqliteConnectionProvider::new(),
        };
        Database::new(config, provider)
    }
}

impl<P: ConnectionProvider> Database<P> {
    /// Resolves the store's path. Nothing is opened yet.
    pub fn new(config: &DatabaseConfig, provider: P) -> Result<Self> {
        let path = provider.resolve_path(&config.name)?;
        debug!("Database {} resolves to {}", config.name, path.display());
        Ok(Database {
            name: config.name.clone(),
            path,
            options: OpenOptions {
                mode: config.mode,
                secret: config.secret.clone(),
                new_secret: config.new_secret.clone(),
                version: config.version,
            },
            encrypted: config.encrypted,
            is_open: false,
            provider,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Opens the store with the configured encryption settings.
    pub fn open(&mut self) -> Result<()> {
        match self.provider.open_connection(&self.path, &self.options) {
            OpenOutcome::Ready => {
                if self.options.mode == db::EncryptionMode::Secret {
                    self.encrypted = true;
                }
            }
            OpenOutcome::SecretSwapped => {
                self.options.secret = std::mem::take(&mut self.options.new_secret);
                self.options.mode = db::EncryptionMode::Secret;
                self.encrypted = true;
            }
            OpenOutcome::Encrypted => {
                self.options.mode = db::EncryptionMode::Secret;
                self.encrypted = true;
            }
            OpenOutcome::Failed(failure) => {
                self.is_open = false;
                return Err(match failure {
                    OpenFailure::WrongSecret => SyncqlError::WrongSecret(self.name.clone()),
                    OpenFailure::WrongNewSecret(msg) => SyncqlError::SecretRotation(msg),
                    OpenFailure::Other(msg) => SyncqlError::Connection(msg),
                });
            }
        }
        self.is_open = true;
        info!("Opened database {}", self.name);
        Ok(())
    }

    /// Marks the store closed. A connection is opened solely to be closed cleanly.
    pub fn close(&mut self) -> Result<()> {
        if self.is_open {
            let conn = self.provider.writable_connection(&self.path, self.secret())?;
            self.provider.close_connection(conn)?;
        }
        self.is_open = false;
        info!("Closed database {}", self.name);
        Ok(())
    }

    /// Removes the store's file and side files.
    ///
    /// Returns whether the main file existed. Deleting a missing store is not
    /// an error.
    pub fn delete(&mut self) -> Result<bool> {
        self.is_open = false;
        let removed = remove_if_present(&self.path)?;
        for suffix in SIDE_FILE_SUFFIXES {
            let mut side = self.path.clone().into_os_string();
            side.push(suffix);
            remove_if_present(Path::new(&side))?;
        }
        if removed {
            info!("Deleted database {}", self.name);
        } else {
            debug!("Database {} had no file to delete", self.name);
        }
        Ok(removed)
    }

    /// Runs a parameterless script and returns the total changes.
    pub fn exec_sql(&self, sql: &str) -> Result<i64> {
        self.with_writer(|conn| db::execute(conn, sql))
            .map_err(|e| SyncqlError::ExecSql(Box::new(e)))
    }

    /// Runs a batch atomically and returns the total changes.
    pub fn exec_set(&self, set: &[SetStatement]) -> Result<i64> {
        self.with_writer(|conn| db::exec_set(conn, set))
            .map_err(|e| SyncqlError::ExecSet(Box::new(e)))
    }

    /// Runs one parameterized write in its own transaction.
    pub fn run_sql(&self, sql: &str, values: &[SqlValue]) -> Result<ChangesResult> {
        self.with_writer(|conn| db::run_sql(conn, sql, values))
            .map_err(|e| SyncqlError::RunSql(Box::new(e)))
    }

    /// Runs a read with text parameters.
    pub fn select_sql(&self, sql: &str, values: &[String]) -> Result<Vec<RowMap>> {
        self.with_reader(|conn| db::select(conn, sql, values))
            .map_err(|e| SyncqlError::Select(Box::new(e)))
    }

    /// Creates the sync ledger unless it exists. Returns `0` when it did.
    pub fn create_sync_table(&self) -> Result<i64> {
        self.with_writer(|conn| sync::ensure_sync_table(&self.provider, conn))
            .map_err(|e| SyncqlError::SyncTable(Box::new(e)))
    }

    /// Stamps the sync ledger with the current time.
    pub fn set_sync_date(&self) -> Result<bool> {
        self.with_writer(sync::set_sync_date)
            .map_err(|e| SyncqlError::SyncDate(Box::new(e)))
    }

    /// Stamps the sync ledger with an explicit Unix-epoch timestamp.
    pub fn set_sync_date_to(&self, timestamp: i64) -> Result<bool> {
        self.with_writer(|conn| sync::set_sync_date_to(conn, timestamp))
            .map_err(|e| SyncqlError::SyncDate(Box::new(e)))
    }

    pub fn get_sync_date(&self) -> Result<i64> {
        self.with_reader(sync::get_sync_date)
            .map_err(|e| SyncqlError::SyncDate(Box::new(e)))
    }

    /// Creates the schema and rows described by `json`. Returns the total changes.
    pub fn import_from_json(&self, json: &JsonSqlite) -> Result<i64> {
        json.validate()
            .and_then(|()| {
                self.with_writer(|conn| {
                    json::create_schema(conn, json)?;
                    json::create_data(conn, json)
                })
            })
            .map_err(|e| SyncqlError::Import(Box::new(e)))
    }

    /// Describes the store as JSON.
    pub fn export_to_json(&self, mode: JsonMode) -> Result<JsonSqlite> {
        self.with_reader(|conn| json::build_export_object(conn, &self.name, self.encrypted, mode))
            .map_err(|e| SyncqlError::Export(Box::new(e)))
    }

    fn secret(&self) -> &str {
        if self.encrypted || self.options.mode.requires_cipher() {
            &self.options.secret
        } else {
            ""
        }
    }

    fn with_writer<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let conn = self.provider.writable_connection(&self.path, self.secret())?;
        self.finish(conn, op)
    }

    fn with_reader<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let conn = self.provider.readable_connection(&self.path, self.secret())?;
        self.finish(conn, op)
    }

    fn finish<T>(&self, conn: Connection, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let result = op(&conn);
        let closed = self.provider.close_connection(conn);
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => {
                warn!("Operation on {} failed: {}", self.name, e);
                Err(e)
            }
            (Err(e), Err(close_err)) => {
                error!("Error closing {} after a failure: {}", self.name, close_err);
                Err(e)
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(SyncqlError::NotOpen(self.name.clone()))
        }
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncqlError::Delete(format!("{}: {}", path.display(), e))),
    }
}

/// Connection Management Module
///
/// This module resolves database names to file paths, opens and closes
/// connections, and applies encryption key material. Every public operation
/// obtains its own connection from a [`ConnectionProvider`] and hands it back
/// for closing before returning; nothing here is cached between calls.

use crate::core::{Result, SyncqlError};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// File name suffix appended to database names that do not already end in `.db`.
pub const DB_FILE_SUFFIX: &str = "SQLite.db";

/// How the store is keyed when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionMode {
    /// Plain, unencrypted store
    #[default]
    #[serde(rename = "no-encryption")]
    NoEncryption,
    /// Encrypt a plain store in place using the secret
    #[serde(rename = "encryption")]
    Encryption,
    /// Open an already encrypted store with the secret
    #[serde(rename = "secret")]
    Secret,
    /// Open with the secret, then re-key the store with the new secret
    #[serde(rename = "newsecret")]
    NewSecret,
}

impl EncryptionMode {
    /// Whether this mode needs an engine with cipher support.
    pub fn requires_cipher(self) -> bool {
        !matches!(self, EncryptionMode::NoEncryption)
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncryptionMode::NoEncryption => "no-encryption",
            EncryptionMode::Encryption => "encryption",
            EncryptionMode::Secret => "secret",
            EncryptionMode::NewSecret => "newsecret",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for EncryptionMode {
    type Err = SyncqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no-encryption" => Ok(EncryptionMode::NoEncryption),
            "encryption" => Ok(EncryptionMode::Encryption),
            "secret" => Ok(EncryptionMode::Secret),
            "newsecret" => Ok(EncryptionMode::NewSecret),
            other => Err(SyncqlError::Config(format!("unknown encryption mode: {}", other))),
        }
    }
}

/// Parameters for [`ConnectionProvider::open_connection`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub mode: EncryptionMode,
    pub secret: String,
    pub new_secret: String,
    pub version: i32,
}

/// Why a provider could not open the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    /// The secret does not decrypt the store
    WrongSecret,
    /// The store opened but re-keying with the new secret failed
    WrongNewSecret(String),
    /// Any other connection failure
    Other(String),
}

/// Result of opening the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Opened with the current settings
    Ready,
    /// The store was re-keyed; the new secret is now the current one
    SecretSwapped,
    /// A plain store was encrypted in place
    Encrypted,
    Failed(OpenFailure),
}

impl OpenOutcome {
    /// Interprets the message protocol used by string-based providers:
    /// an empty message means opened, `"swap newsecret"` and
    /// `"success encryption"` are the two special successes.
    pub fn from_message(message: &str) -> Self {
        match message {
            "" => OpenOutcome::Ready,
            "swap newsecret" => OpenOutcome::SecretSwapped,
            "success encryption" => OpenOutcome::Encrypted,
            m if m.contains("connection:") => {
                OpenOutcome::Failed(OpenFailure::WrongNewSecret(m.to_string()))
            }
            m if m.contains("wrong secret") => OpenOutcome::Failed(OpenFailure::WrongSecret),
            m => OpenOutcome::Failed(OpenFailure::Other(m.to_string())),
        }
    }
}

/// Source of connections for the Database lifecycle manager.
pub trait ConnectionProvider {
    /// Resolves a database name to the path of its backing file.
    fn resolve_path(&self, name: &str) -> Result<PathBuf>;

    /// Opens the store once with the given encryption settings and reports the outcome.
    fn open_connection(&self, path: &Path, options: &OpenOptions) -> OpenOutcome;

    /// Opens a read-write connection, creating the file when missing.
    fn writable_connection(&self, path: &Path, secret: &str) -> Result<Connection>;

    /// Opens a read-only connection.
    fn readable_connection(&self, path: &Path, secret: &str) -> Result<Connection>;

    /// Checks whether a table with the given name exists.
    fn table_exists(&self, conn: &Connection, table: &str) -> Result<bool> {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .map_err(|e| SyncqlError::TableExists(format!("{}: {}", table, e)))
    }

    /// Closes a connection, reporting the engine's error if it refuses.
    fn close_connection(&self, conn: Connection) -> Result<()> {
        conn.close()
            .map_err(|(_, e)| SyncqlError::Close(e.to_string()))
    }
}

/// Provider backed by bundled SQLite (or SQLCipher with the `sqlcipher` feature).
#[derive(Debug, Clone, Default)]
pub struct SqliteConnectionProvider {
    /// Directory holding database files; the platform documents directory when `None`
    base_dir: Option<PathBuf>,
}

impl SqliteConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that keeps database files in `dir`.
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        SqliteConnectionProvider {
            base_dir: Some(dir.into()),
        }
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.base_dir
            .clone()
            .or_else(dirs::document_dir)
            .or_else(dirs::data_local_dir)
    }

    fn open_with_flags(&self, path: &Path, flags: OpenFlags, secret: &str) -> Result<Connection> {
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| SyncqlError::Connection(format!("{}: {}", path.display(), e)))?;
        if !secret.is_empty() {
            apply_key(&conn, secret)?;
        }
        // Touch the first page so a wrong key or a non-database file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
            .map_err(|e| SyncqlError::Connection(format!("{}: {}", path.display(), e)))?;
        Ok(conn)
    }

    fn open_plain(&self, path: &Path, options: &OpenOptions) -> std::result::Result<(), OpenFailure> {
        let conn = self
            .writable_connection(path, "")
            .map_err(|e| OpenFailure::Other(e.to_string()))?;
        let result = apply_version(&conn, options.version);
        close_quietly(conn);
        result.map_err(|e| OpenFailure::Other(e.to_string()))
    }

    fn open_secret(&self, path: &Path, options: &OpenOptions) -> std::result::Result<(), OpenFailure> {
        let conn = self
            .writable_connection(path, &options.secret)
            .map_err(|_| OpenFailure::WrongSecret)?;
        let result = apply_version(&conn, options.version);
        close_quietly(conn);
        result.map_err(|e| OpenFailure::Other(e.to_string()))
    }

    fn rotate_secret(&self, path: &Path, options: &OpenOptions) -> std::result::Result<(), OpenFailure> {
        if options.new_secret.is_empty() {
            return Err(OpenFailure::WrongNewSecret("new secret is empty".to_string()));
        }
        let conn = self
            .writable_connection(path, &options.secret)
            .map_err(|_| OpenFailure::WrongSecret)?;
        let result = conn
            .pragma_update(None, "rekey", &options.new_secret)
            .map_err(|e| OpenFailure::WrongNewSecret(e.to_string()));
        close_quietly(conn);
        result
    }

    fn encrypt_in_place(&self, path: &Path, options: &OpenOptions) -> std::result::Result<(), OpenFailure> {
        if options.secret.is_empty() {
            return Err(OpenFailure::Other("encryption requires a secret".to_string()));
        }
        let conn = self
            .writable_connection(path, "")
            .map_err(|e| OpenFailure::Other(e.to_string()))?;

        let file_name = format!(
            "{}.{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4()
        );
        let encrypted_path = path.with_file_name(file_name);
        let target = encrypted_path.to_string_lossy().into_owned();

        let exported = conn
            .execute(
                "ATTACH DATABASE ?1 AS encrypted KEY ?2",
                [target.as_str(), options.secret.as_str()],
            )
            .and_then(|_| conn.query_row("SELECT sqlcipher_export('encrypted')", [], |_| Ok(())))
            .and_then(|_| conn.execute_batch("DETACH DATABASE encrypted;"));
        close_quietly(conn);

        if let Err(e) = exported {
            let _ = fs::remove_file(&encrypted_path);
            return Err(OpenFailure::Other(format!("encryption failed: {}", e)));
        }
        fs::rename(&encrypted_path, path)
            .map_err(|e| OpenFailure::Other(format!("encryption failed: {}", e)))?;
        Ok(())
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
            return Err(SyncqlError::FilePath(format!(
                "could not generate the file path for '{}'",
                name
            )));
        }
        let dir = self.base_dir().ok_or_else(|| {
            SyncqlError::FilePath("could not locate a documents directory".to_string())
        })?;
        let file_name = if name.ends_with(".db") {
            name.to_string()
        } else {
            format!("{}{}", name, DB_FILE_SUFFIX)
        };
        Ok(dir.join(file_name))
    }

    fn open_connection(&self, path: &Path, options: &OpenOptions) -> OpenOutcome {
        debug!("Opening {} with mode {}", path.display(), options.mode);

        if options.mode.requires_cipher() {
            match cipher_available() {
                Ok(true) => {}
                Ok(false) => {
                    return OpenOutcome::Failed(OpenFailure::Other(format!(
                        "encryption mode '{}' requested but the engine has no cipher support",
                        options.mode
                    )))
                }
                Err(e) => return OpenOutcome::Failed(OpenFailure::Other(e.to_string())),
            }
        }

        let result = match options.mode {
            EncryptionMode::NoEncryption => self.open_plain(path, options),
            EncryptionMode::Secret => self.open_secret(path, options),
            EncryptionMode::NewSecret => self.rotate_secret(path, options),
            EncryptionMode::Encryption => self.encrypt_in_place(path, options),
        };

        match (result, options.mode) {
            (Ok(()), EncryptionMode::NewSecret) => {
                info!("Secret rotated for {}", path.display());
                OpenOutcome::SecretSwapped
            }
            (Ok(()), EncryptionMode::Encryption) => {
                info!("Encrypted {} in place", path.display());
                OpenOutcome::Encrypted
            }
            (Ok(()), _) => OpenOutcome::Ready,
            (Err(failure), _) => {
                warn!("Failed to open {}: {:?}", path.display(), failure);
                OpenOutcome::Failed(failure)
            }
        }
    }

    fn writable_connection(&self, path: &Path, secret: &str) -> Result<Connection> {
        self.open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            secret,
        )
    }

    fn readable_connection(&self, path: &Path, secret: &str) -> Result<Connection> {
        self.open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            secret,
        )
    }
}

/// Probes whether the linked engine understands SQLCipher pragmas.
pub fn cipher_available() -> Result<bool> {
    let conn = Connection::open_in_memory()
        .map_err(|e| SyncqlError::Connection(e.to_string()))?;
    let version: Option<String> = conn
        .query_row("PRAGMA cipher_version", [], |row| row.get(0))
        .optional()
        .map_err(|e| SyncqlError::Connection(e.to_string()))?;
    close_quietly(conn);
    Ok(version.is_some())
}

fn apply_key(conn: &Connection, secret: &str) -> Result<()> {
    conn.pragma_update(None, "key", secret)
        .map_err(|e| SyncqlError::Connection(format!("applying key failed: {}", e)))
}

fn apply_version(conn: &Connection, version: i32) -> Result<()> {
    let current: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| SyncqlError::Connection(e.to_string()))?;
    if current == 0 && version > 0 {
        conn.pragma_update(None, "user_version", version)
            .map_err(|e| SyncqlError::Connection(e.to_string()))?;
    }
    Ok(())
}

/// Closes a connection on a path that has nothing left to report the failure to.
pub(crate) fn close_quietly(conn: Connection) {
    if let Err((_, e)) = conn.close() {
        error!("Error closing the database: {}", e);
    }
}

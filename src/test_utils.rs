/// # Test Utilities Module
///
/// Fixtures shared by the unit and integration tests.
///
/// This module provides:
/// - Stores isolated in their own temporary directory
/// - A sample schema with data
/// - Error matching helpers
use crate::config::DatabaseConfig;
use crate::core::db::SqliteConnectionProvider;
use crate::core::SyncqlError;
use crate::database::Database;
use std::path::Path;
use tempfile::TempDir;

/// Schema used by tests that need a couple of related tables.
pub const SAMPLE_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT UNIQUE,
        last_modified INTEGER
    );
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY NOT NULL,
        user_id INTEGER NOT NULL,
        title TEXT,
        last_modified INTEGER,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );
    CREATE INDEX index_posts_title ON posts (title);
";

/// Rows for [`SAMPLE_SCHEMA`].
pub const SAMPLE_DATA: &str = "
    INSERT INTO users (id, name, email, last_modified) VALUES (1, 'Alice', 'alice@example.com', 1000);
    INSERT INTO users (id, name, email, last_modified) VALUES (2, 'Bob', 'bob@example.com', 1000);
    INSERT INTO posts (id, user_id, title, last_modified) VALUES (1, 1, 'Hello', 1000);
";

/// A temporary directory holding one test store; removed on drop.
pub struct TestStore {
    dir: TempDir,
    name: String,
}

impl TestStore {
    pub fn new(name: &str) -> Self {
        TestStore {
            dir: TempDir::new().expect("Failed to create temp dir"),
            name: name.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> DatabaseConfig {
        DatabaseConfig {
            directory: Some(self.dir.path().to_path_buf()),
            ..DatabaseConfig::named(self.name.clone())
        }
    }

    /// A closed database in this directory.
    pub fn database(&self) -> Database {
        Database::new(
            &self.config(),
            SqliteConnectionProvider::with_directory(self.dir()),
        )
        .expect("Failed to create database")
    }

    /// An open database in this directory.
    pub fn open_database(&self) -> Database {
        let mut db = self.database();
        db.open().expect("Failed to open database");
        db
    }

    /// An open database with [`SAMPLE_SCHEMA`] and [`SAMPLE_DATA`] loaded.
    pub fn with_sample_data(&self) -> Database {
        let db = self.open_database();
        db.exec_sql(SAMPLE_SCHEMA).expect("Failed to create sample schema");
        db.exec_sql(SAMPLE_DATA).expect("Failed to insert sample data");
        db
    }
}

/// Returns the innermost error of a wrapped chain.
pub fn innermost(err: &SyncqlError) -> &SyncqlError {
    match err {
        SyncqlError::BatchMember { source, .. }
        | SyncqlError::ExecSql(source)
        | SyncqlError::ExecSet(source)
        | SyncqlError::RunSql(source)
        | SyncqlError::Select(source)
        | SyncqlError::SyncTable(source)
        | SyncqlError::SyncDate(source)
        | SyncqlError::Import(source)
        | SyncqlError::Export(source) => innermost(source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stores_are_isolated() {
        let a = TestStore::new("same");
        let b = TestStore::new("same");
        assert_ne!(a.database().path(), b.database().path());
    }

    #[test]
    fn test_sample_data_loads() {
        let store = TestStore::new("sample");
        let db = store.with_sample_data();
        let rows = db.select_sql("SELECT name FROM users ORDER BY id", &[]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_innermost() {
        let err = SyncqlError::ExecSet(Box::new(SyncqlError::BatchMember {
            index: 0,
            source: Box::new(SyncqlError::Transaction("x".to_string())),
        }));
        assert!(matches!(innermost(&err), SyncqlError::Transaction(_)));
    }
}

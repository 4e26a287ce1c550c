// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod database;
pub mod json;
pub mod repl;
pub mod sync;

pub use crate::core::db::{ChangesResult, EncryptionMode, SetStatement, SqlValue};
pub use crate::core::{Result, SyncqlError};
pub use database::Database;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod integration_tests;

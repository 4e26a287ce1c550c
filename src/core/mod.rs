/// Core Module for syncql
///
/// This module contains the execution engine and the error type shared by
/// every other module of the crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{Result, StatementStage, SyncqlError};

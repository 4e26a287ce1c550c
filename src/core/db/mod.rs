/// Database Module
///
/// This module provides the transactional execution engine, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Value Binding** (`value.rs`): Typed parameter values and the statement binder
/// - **Connection Management** (`connection.rs`): Path resolution, opening, keying and closing
/// - **Statement Execution** (`statement.rs`): Prepare, bind, step and finalize write statements
/// - **Transaction Coordination** (`transaction.rs`): Begin/commit around batches
/// - **Query Execution** (`query.rs`): Read statements collected into row mappings
///
/// ## Error Handling
///
/// All database operations use the standardized `SyncqlError` type. Every
/// function here borrows a connection; opening and closing it is the caller's job.
pub mod connection;
pub mod query;
pub mod statement;
pub mod transaction;
pub mod value;

pub use connection::*;
pub use query::*;
pub use statement::*;
pub use transaction::*;
pub use value::*;

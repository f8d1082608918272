//! db-connection Library
//!
//! A connection layer that hides two engine-specific behaviors behind one API:
//! identifier quoting and transaction control (isolation levels, read/write mode,
//! consistent snapshots, chaining) for SQLite and MySQL.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod naming;
pub mod transaction;

pub use config::{ConfigProvider, ConnectionConfig, ConnectionOptions};
pub use db::{Connection, RecordingExecutor, SqlExecutor};
pub use dialect::{AnyDialect, Dialect, DialectCapabilities, DialectKind};
pub use error::{DbError, DbResult};
pub use transaction::{IsolationLevel, TransactionController, TransactionFlags, TransactionState};

//! Database access layer.
//!
//! - Statement execution (`SqlExecutor`, sqlx-backed and recording executors)
//! - The `Connection` façade combining dialect, executor and transaction control

pub mod connection;
pub mod executor;

pub use connection::Connection;
pub use executor::{RecordingExecutor, SqlExecutor};

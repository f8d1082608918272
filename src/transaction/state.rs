//! Per-connection transaction state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the connection believes about the engine's transaction state.
///
/// Only the transaction controller mutates it, and only after the statements
/// backing a change have been executed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionState {
    pub(super) in_transaction: bool,
    pub(super) autocommit: bool,
    pub(super) transaction_name: Option<String>,
    pub(super) started_at: Option<DateTime<Utc>>,
}

impl TransactionState {
    pub fn new() -> Self {
        Self {
            in_transaction: false,
            autocommit: true,
            transaction_name: None,
            started_at: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Canonical name of the open transaction, if one was given.
    pub fn transaction_name(&self) -> Option<&str> {
        self.transaction_name.as_deref()
    }

    /// When the open transaction (or the last link of a chain) began.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Restore the state of a freshly opened connection.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::new()
    }
}

//! MySQL / MariaDB dialect.

use super::{BaseDialect, Dialect, DialectCapabilities, DialectKind};
use crate::error::DbError;

/// Client error texts for a dropped server connection (CR_SERVER_GONE_ERROR,
/// CR_SERVER_LOST and friends surface through the driver with these messages).
const LOST_CONNECTION_MESSAGES: &[&str] = &[
    "server has gone away",
    "lost connection to mysql server",
    "error while sending",
    "broken pipe",
    "connection reset",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MySqlDialect {
    base: BaseDialect,
}

impl MySqlDialect {
    pub fn new(base: BaseDialect) -> Self {
        Self { base }
    }
}

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn base(&self) -> &BaseDialect {
        &self.base
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            read_write_mode: true,
            multi_statement_exec: false,
            autocommit_suspension: true,
            consistent_snapshot: true,
            chaining: true,
        }
    }

    /// Backtick quoting per dot-separated segment; embedded backticks are doubled.
    fn quote_identifier(&self, name: &str) -> String {
        if name.len() >= 2 && name.starts_with('`') && name.ends_with('`') {
            return name.to_string();
        }
        name.split('.')
            .map(|segment| format!("`{}`", segment.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn is_connection_lost(&self, err: &DbError) -> bool {
        match err {
            DbError::Connection { .. } => true,
            DbError::Database {
                message, sql_state, ..
            } => {
                // SQLSTATE class 08: connection exception
                if sql_state.as_deref().is_some_and(|s| s.starts_with("08")) {
                    return true;
                }
                let message = message.to_lowercase();
                LOST_CONNECTION_MESSAGES
                    .iter()
                    .any(|needle| message.contains(needle))
            }
            _ => false,
        }
    }
}

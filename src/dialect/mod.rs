//! SQL dialect adapters.
//!
//! A dialect knows how to quote identifiers for its engine, which statements a
//! freshly opened connection needs, how to classify a dead connection, and the
//! SQL fragments the transaction controller stitches together. What a dialect can
//! do is described by [`DialectCapabilities`]; shared behavior lives in
//! [`BaseDialect`], which every variant embeds.

#[macro_use]
pub mod macros;
pub mod mysql;
pub mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::{SqliteDialect, SqliteProviderDialect};

use crate::config::{ConnectionConfig, ConnectionOptions};
use crate::db::SqlExecutor;
use crate::error::{DbError, DbResult};
use crate::transaction::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use tracing::debug;

/// Supported dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DialectKind {
    /// SQLite with per-segment bracket quoting.
    Sqlite,
    /// SQLite with single whole-name bracket quoting.
    SqliteProvider,
    /// MySQL and MariaDB.
    #[serde(rename = "mysql")]
    #[value(name = "mysql")]
    MySql,
}

impl DialectKind {
    /// Detect the dialect from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::SqliteProvider => "SQLite (provider)",
            Self::MySql => "MySQL",
        }
    }

    pub fn is_sqlite(&self) -> bool {
        matches!(self, Self::Sqlite | Self::SqliteProvider)
    }
}

impl FromStr for DialectKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "sqlite-provider" | "sqlite_provider" => Ok(Self::SqliteProvider),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(DbError::invalid_input(format!("Unknown dialect: {other}"))),
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What the active engine and driver permit. Fixed once a connection is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DialectCapabilities {
    /// `READ WRITE` / `READ ONLY` accepted on transaction start.
    pub read_write_mode: bool,
    /// Several statements may be sent in one executor call.
    pub multi_statement_exec: bool,
    /// Read-write transactions need session autocommit switched off explicitly.
    pub autocommit_suspension: bool,
    /// `WITH CONSISTENT SNAPSHOT` accepted on transaction start.
    pub consistent_snapshot: bool,
    /// `AND CHAIN` / `AND NO CHAIN` accepted on commit and rollback.
    pub chaining: bool,
}

impl DialectCapabilities {
    /// Apply per-connection overrides on top of dialect defaults.
    pub fn with_options(mut self, options: &ConnectionOptions) -> Self {
        if let Some(multi) = options.multi_statements {
            self.multi_statement_exec = multi;
        }
        if let Some(read_write) = options.read_write_mode {
            self.read_write_mode = read_write;
        }
        if let Some(suspend) = options.autocommit_suspension {
            self.autocommit_suspension = suspend;
        }
        self
    }
}

/// Behavior shared by every dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseDialect {
    init_statements: Vec<String>,
}

impl BaseDialect {
    pub fn new(init_statements: Vec<String>) -> Self {
        Self { init_statements }
    }

    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self::new(options.init_statements.clone())
    }

    pub fn init_statements(&self) -> &[String] {
        &self.init_statements
    }

    /// Generic connection setup, run after any dialect-specific pragmas.
    pub async fn setup<E: SqlExecutor>(&self, executor: &mut E) -> DbResult<()> {
        for sql in &self.init_statements {
            debug!(sql = %sql, "Running connection init statement");
            executor.exec(sql).await?;
        }
        Ok(())
    }
}

/// Engine-specific SQL behavior.
///
/// The statement helpers default to the ANSI / MySQL spelling; dialects override
/// the ones their engine spells differently.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn base(&self) -> &BaseDialect;

    /// Default capabilities before per-connection overrides.
    fn capabilities(&self) -> DialectCapabilities;

    fn quote_identifier(&self, name: &str) -> String;

    /// Run once right after the physical connection is opened.
    fn bootstrap<E: SqlExecutor>(
        &self,
        executor: &mut E,
    ) -> impl Future<Output = DbResult<()>> + Send {
        self.base().setup(executor)
    }

    /// Whether `err` means the connection is gone and should be reopened.
    fn is_connection_lost(&self, _err: &DbError) -> bool {
        false
    }

    fn autocommit_statement(&self, enabled: bool) -> String {
        format!("SET SESSION autocommit = {};", u8::from(enabled))
    }

    /// `None` when the engine has no way to select `level`.
    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        Some(format!(
            "SET TRANSACTION ISOLATION LEVEL {};",
            level.as_sql()
        ))
    }

    fn consistent_snapshot_clause(&self) -> &'static str {
        "WITH CONSISTENT SNAPSHOT"
    }

    fn access_mode_clause(&self, read_write: bool) -> &'static str {
        if read_write { "READ WRITE" } else { "READ ONLY" }
    }

    fn start_transaction_statement(&self, suffix: &str) -> String {
        format!("START TRANSACTION{suffix};")
    }

    fn commit_statement(&self, suffix: &str) -> String {
        format!("COMMIT{suffix};")
    }

    fn rollback_statement(&self, suffix: &str) -> String {
        format!("ROLLBACK{suffix};")
    }

    fn chain_suffix(&self, chain: bool) -> &'static str {
        if chain { " AND CHAIN" } else { " AND NO CHAIN" }
    }
}

/// Runtime-selected dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyDialect {
    Sqlite(SqliteDialect),
    SqliteProvider(SqliteProviderDialect),
    MySql(MySqlDialect),
}

impl AnyDialect {
    pub fn new(kind: DialectKind, base: BaseDialect) -> Self {
        match kind {
            DialectKind::Sqlite => Self::Sqlite(SqliteDialect::new(base)),
            DialectKind::SqliteProvider => Self::SqliteProvider(SqliteProviderDialect::new(base)),
            DialectKind::MySql => Self::MySql(MySqlDialect::new(base)),
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.dialect, BaseDialect::from_options(&config.options))
    }
}

impl Dialect for AnyDialect {
    fn kind(&self) -> DialectKind {
        dispatch_dialect!(self, d => d.kind())
    }

    fn base(&self) -> &BaseDialect {
        dispatch_dialect!(self, d => d.base())
    }

    fn capabilities(&self) -> DialectCapabilities {
        dispatch_dialect!(self, d => d.capabilities())
    }

    fn quote_identifier(&self, name: &str) -> String {
        dispatch_dialect!(self, d => d.quote_identifier(name))
    }

    fn bootstrap<E: SqlExecutor>(
        &self,
        executor: &mut E,
    ) -> impl Future<Output = DbResult<()>> + Send {
        async move { dispatch_dialect!(self, d => d.bootstrap(executor).await) }
    }

    fn is_connection_lost(&self, err: &DbError) -> bool {
        dispatch_dialect!(self, d => d.is_connection_lost(err))
    }

    fn autocommit_statement(&self, enabled: bool) -> String {
        dispatch_dialect!(self, d => d.autocommit_statement(enabled))
    }

    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        dispatch_dialect!(self, d => d.isolation_statement(level))
    }

    fn consistent_snapshot_clause(&self) -> &'static str {
        dispatch_dialect!(self, d => d.consistent_snapshot_clause())
    }

    fn access_mode_clause(&self, read_write: bool) -> &'static str {
        dispatch_dialect!(self, d => d.access_mode_clause(read_write))
    }

    fn start_transaction_statement(&self, suffix: &str) -> String {
        dispatch_dialect!(self, d => d.start_transaction_statement(suffix))
    }

    fn commit_statement(&self, suffix: &str) -> String {
        dispatch_dialect!(self, d => d.commit_statement(suffix))
    }

    fn rollback_statement(&self, suffix: &str) -> String {
        dispatch_dialect!(self, d => d.rollback_statement(suffix))
    }

    fn chain_suffix(&self, chain: bool) -> &'static str {
        dispatch_dialect!(self, d => d.chain_suffix(chain))
    }
}

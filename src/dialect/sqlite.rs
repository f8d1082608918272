//! SQLite dialects.
//!
//! SQLite has no session autocommit switch, no isolation-level statements and no
//! chained commits, so both variants keep every capability off and spell the
//! transaction start as `BEGIN TRANSACTION`. They differ only in quoting.

use super::{BaseDialect, Dialect, DialectCapabilities, DialectKind};
use crate::db::SqlExecutor;
use crate::error::DbResult;
use crate::transaction::IsolationLevel;
use std::future::Future;
use tracing::debug;

/// See <https://www.sqlite.org/wal.html#activating_and_configuring_wal_mode>.
pub const WAL_PRAGMA: &str = "PRAGMA journal_mode=WAL;";

/// SQLite dialect quoting each dot-separated segment: `schema.table` → `[schema].[table]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqliteDialect {
    base: BaseDialect,
}

impl SqliteDialect {
    pub fn new(base: BaseDialect) -> Self {
        Self { base }
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn base(&self) -> &BaseDialect {
        &self.base
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::default()
    }

    fn quote_identifier(&self, name: &str) -> String {
        if name.starts_with('[') && name.ends_with(']') {
            return name.to_string();
        }
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('[');
        quoted.push_str(&name.replace('.', "].["));
        quoted.push(']');
        quoted
    }

    /// Switches the journal to WAL before the generic setup runs.
    fn bootstrap<E: SqlExecutor>(
        &self,
        executor: &mut E,
    ) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            debug!(sql = WAL_PRAGMA, "Enabling write-ahead logging");
            executor.exec(WAL_PRAGMA).await?;
            self.base.setup(executor).await
        }
    }

    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        debug!(
            isolation = level.as_sql(),
            "SQLite transactions are always serializable, isolation level ignored"
        );
        None
    }

    fn start_transaction_statement(&self, suffix: &str) -> String {
        format!("BEGIN TRANSACTION{suffix};")
    }
}

/// SQLite dialect wrapping the whole name in one bracket pair: `a.b` → `[a.b]`.
///
/// No dot splitting and no check for existing brackets, for provider-level
/// connections where compound bracketed names are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqliteProviderDialect {
    inner: SqliteDialect,
}

impl SqliteProviderDialect {
    pub fn new(base: BaseDialect) -> Self {
        Self {
            inner: SqliteDialect::new(base),
        }
    }
}

impl Dialect for SqliteProviderDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqliteProvider
    }

    fn base(&self) -> &BaseDialect {
        self.inner.base()
    }

    fn capabilities(&self) -> DialectCapabilities {
        self.inner.capabilities()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{name}]")
    }

    fn bootstrap<E: SqlExecutor>(
        &self,
        executor: &mut E,
    ) -> impl Future<Output = DbResult<()>> + Send {
        self.inner.bootstrap(executor)
    }

    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        self.inner.isolation_statement(level)
    }

    fn start_transaction_statement(&self, suffix: &str) -> String {
        self.inner.start_transaction_statement(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordingExecutor;

    #[test]
    fn test_bracket_quoting_splits_segments() {
        let dialect = SqliteDialect::default();
        assert_eq!(dialect.quote_identifier("users"), "[users]");
        assert_eq!(dialect.quote_identifier("a.b"), "[a].[b]");
        assert_eq!(dialect.quote_identifier("main.app.users"), "[main].[app].[users]");
    }

    #[test]
    fn test_bracket_quoting_is_idempotent() {
        let dialect = SqliteDialect::default();
        assert_eq!(dialect.quote_identifier("[already]"), "[already]");
        assert_eq!(dialect.quote_identifier("[a].[b]"), "[a].[b]");
        let once = dialect.quote_identifier("x.y");
        assert_eq!(dialect.quote_identifier(&once), once);
    }

    #[test]
    fn test_bracket_quoting_partial_brackets_are_wrapped() {
        let dialect = SqliteDialect::default();
        assert_eq!(dialect.quote_identifier("[open"), "[[open]");
    }

    #[test]
    fn test_provider_quoting_wraps_once() {
        let dialect = SqliteProviderDialect::default();
        assert_eq!(dialect.quote_identifier("a.b"), "[a.b]");
        assert_eq!(dialect.quote_identifier("[already]"), "[[already]]");
    }

    #[test]
    fn test_sqlite_has_no_isolation_statement() {
        let dialect = SqliteDialect::default();
        assert_eq!(
            dialect.isolation_statement(IsolationLevel::RepeatableRead),
            None
        );
        assert_eq!(
            dialect.start_transaction_statement(""),
            "BEGIN TRANSACTION;"
        );
    }

    #[test]
    fn test_sqlite_never_reports_lost_connection() {
        let dialect = SqliteDialect::default();
        let err = crate::error::DbError::connection("I/O error: disk full", "check disk");
        assert!(!dialect.is_connection_lost(&err));
    }

    #[tokio::test]
    async fn test_bootstrap_runs_pragma_before_base_setup() {
        let dialect = SqliteProviderDialect::new(BaseDialect::new(vec![
            "PRAGMA foreign_keys = ON;".to_string(),
        ]));
        let mut executor = RecordingExecutor::new();
        dialect.bootstrap(&mut executor).await.unwrap();
        assert_eq!(
            executor.calls(),
            &[WAL_PRAGMA.to_string(), "PRAGMA foreign_keys = ON;".to_string()]
        );
    }
}

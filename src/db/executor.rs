//! Statement execution.
//!
//! [`SqlExecutor`] is the only I/O primitive the connection layer needs: send a
//! SQL string, get the affected row count or an error. Implementations exist for
//! live sqlx connections and for [`RecordingExecutor`], which records every
//! statement instead of running it (dry runs and tests).

use crate::error::{DbError, DbResult};
use sqlx::{MySqlConnection, SqliteConnection};
use std::future::Future;

/// Executes raw SQL text. Sequential calls must reach the engine in call order.
pub trait SqlExecutor: Send {
    /// Execute `sql`, which may hold several statements when the connection is
    /// configured for multi-statement execution.
    fn exec(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send;
}

impl<E: SqlExecutor> SqlExecutor for &mut E {
    fn exec(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send {
        (**self).exec(sql)
    }
}

impl SqlExecutor for SqliteConnection {
    fn exec(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            let result = sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
            Ok(result.rows_affected())
        }
    }
}

impl SqlExecutor for MySqlConnection {
    fn exec(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            let result = sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
            Ok(result.rows_affected())
        }
    }
}

/// Executor that records statements instead of running them.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Vec<String>,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any call whose SQL contains `pattern` with a database error.
    pub fn failing_on(pattern: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            fail_on: Some(pattern.into()),
        }
    }

    /// Every SQL string received so far, including rejected ones.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.calls)
    }
}

impl SqlExecutor for RecordingExecutor {
    fn exec(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send {
        self.calls.push(sql.to_string());
        let rejected = self
            .fail_on
            .as_deref()
            .is_some_and(|pattern| sql.contains(pattern));
        let result = if rejected {
            Err(DbError::database(
                format!("Statement rejected: {sql}"),
                None,
                "RecordingExecutor was configured to fail on this statement",
            ))
        } else {
            Ok(0)
        };
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    #[tokio::test]
    async fn test_recording_executor_records_in_order() {
        let mut executor = RecordingExecutor::new();
        executor.exec("SELECT 1;").await.unwrap();
        executor.exec("SELECT 2;").await.unwrap();
        assert_eq!(executor.calls(), &["SELECT 1;", "SELECT 2;"]);
        assert_eq!(executor.take_calls().len(), 2);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recording_executor_failure() {
        let mut executor = RecordingExecutor::failing_on("COMMIT");
        assert!(executor.exec("START TRANSACTION;").await.is_ok());
        let err = executor.exec("COMMIT;").await.unwrap_err();
        assert!(err.to_string().contains("Statement rejected"));
        assert_eq!(executor.calls().len(), 2);
    }

    async fn run_one<E: SqlExecutor>(mut executor: E) -> DbResult<u64> {
        executor.exec("SELECT 1;").await
    }

    #[tokio::test]
    async fn test_mut_ref_executor_forwards() {
        let mut executor = RecordingExecutor::new();
        run_one(&mut executor).await.unwrap();
        assert_eq!(executor.calls(), &["SELECT 1;"]);
    }

    #[tokio::test]
    async fn test_sqlite_executor_runs_multiple_statements() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.exec("CREATE TABLE t (id INTEGER PRIMARY KEY);")
            .await
            .unwrap();
        let affected = conn
            .exec("INSERT INTO t (id) VALUES (1);\nINSERT INTO t (id) VALUES (2);")
            .await
            .unwrap();
        assert_eq!(affected, 2);
    }

    #[tokio::test]
    async fn test_sqlite_executor_maps_errors() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let err = conn.exec("SELECT * FROM missing_table;").await.unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
    }
}

//! Connection façade.
//!
//! [`Connection`] ties one dialect, one executor and one transaction controller
//! together. It is what higher layers hold on to: identifier quoting, bootstrap,
//! and the begin / commit / rollback vocabulary.

use crate::config::ConnectionConfig;
use crate::db::SqlExecutor;
use crate::dialect::{AnyDialect, Dialect, DialectCapabilities};
use crate::error::{DbError, DbResult};
use crate::naming::{NameNormalizer, UnderscoreNormalizer};
use crate::transaction::{TransactionController, TransactionFlags, TransactionState};
use tracing::{info, warn};

/// A live (or recorded) database connection with tracked transaction state.
///
/// All operations take `&mut self`; a connection is driven by one task at a time.
pub struct Connection<D: Dialect, E: SqlExecutor> {
    config: ConnectionConfig,
    dialect: D,
    executor: E,
    controller: TransactionController,
    normalizer: Box<dyn NameNormalizer>,
}

impl<E: SqlExecutor> Connection<AnyDialect, E> {
    /// Create a connection whose dialect is chosen by `config.dialect`.
    pub fn from_config(config: ConnectionConfig, executor: E) -> Self {
        let dialect = AnyDialect::from_config(&config);
        Self::new(config, dialect, executor)
    }
}

impl<D: Dialect, E: SqlExecutor> Connection<D, E> {
    /// Wrap an opened executor. Capabilities are fixed here: dialect defaults
    /// overridden by `config.options`.
    pub fn new(config: ConnectionConfig, dialect: D, executor: E) -> Self {
        let capabilities = dialect.capabilities().with_options(&config.options);
        Self {
            config,
            dialect,
            executor,
            controller: TransactionController::new(capabilities),
            normalizer: Box::new(UnderscoreNormalizer),
        }
    }

    /// Replace the transaction name normalizer.
    pub fn with_normalizer(mut self, normalizer: impl NameNormalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn capabilities(&self) -> DialectCapabilities {
        self.controller.capabilities()
    }

    pub fn state(&self) -> &TransactionState {
        self.controller.state()
    }

    pub fn in_transaction(&self) -> bool {
        self.controller.state().in_transaction()
    }

    pub fn autocommit(&self) -> bool {
        self.controller.state().autocommit()
    }

    pub fn transaction_name(&self) -> Option<&str> {
        self.controller.state().transaction_name()
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Direct access for running statements inside an open transaction.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Run the dialect's connection setup. Call once after opening.
    pub async fn bootstrap(&mut self) -> DbResult<()> {
        info!(
            connection_id = %self.config.id,
            dialect = %self.dialect.kind(),
            init_statements = self.dialect.base().init_statements().len(),
            "Bootstrapping connection"
        );
        self.dialect.bootstrap(&mut self.executor).await
    }

    /// Quote a table or column name for this dialect.
    pub fn quote_name(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Start a transaction.
    ///
    /// Empty `flags` mean [`TransactionFlags::READ_WRITE`]. `name` is normalized
    /// and echoed in SQL comments around the transaction for log correlation.
    pub async fn begin_transaction(
        &mut self,
        flags: TransactionFlags,
        name: Option<&str>,
    ) -> DbResult<()> {
        let name = name
            .map(|n| self.normalizer.to_canonical_token(n))
            .filter(|n| !n.is_empty());
        let plan = self
            .controller
            .plan_begin(&self.dialect, flags, name, &self.config)
            .inspect_err(|err| {
                warn!(connection_id = %self.config.id, error = %err, "Cannot begin transaction");
            })?;
        self.controller.execute(&mut self.executor, plan).await
    }

    /// Commit the open transaction. `Ok(false)` when there was nothing to commit.
    pub async fn commit(&mut self, flags: TransactionFlags) -> DbResult<bool> {
        match self.controller.plan_commit(&self.dialect, flags) {
            Some(plan) => {
                self.controller.execute(&mut self.executor, plan).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Roll back the open transaction. `Ok(false)` when there was nothing to roll back.
    pub async fn rollback(&mut self, flags: TransactionFlags) -> DbResult<bool> {
        match self.controller.plan_rollback(&self.dialect, flags) {
            Some(plan) => {
                self.controller.execute(&mut self.executor, plan).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether `err` means this connection is gone and must be reopened.
    pub fn is_connection_lost(&self, err: &DbError) -> bool {
        self.dialect.is_connection_lost(err)
    }

    /// Reset hook for connection teardown: forget any transaction state.
    pub fn reset_transaction_state(&mut self) {
        self.controller.reset();
    }
}

impl<D: Dialect + std::fmt::Debug, E: SqlExecutor> std::fmt::Debug for Connection<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.config.id)
            .field("dialect", &self.dialect)
            .field("state", self.controller.state())
            .finish()
    }
}

//! Transaction controller.
//!
//! Turns transaction intents into ordered statement lists for the active dialect
//! ([`TransactionPlan`]) and executes them, advancing [`TransactionState`] only as
//! far as the statements actually succeeded.
//!
//! # State machine
//!
//! ```text
//!  IDLE --begin--> ACTIVE --commit/rollback--> IDLE
//!                  ACTIVE --commit/rollback(CHAIN)--> ACTIVE
//! ```

use super::flags::{BeginIntent, TransactionFlags, decode_chain};
use super::state::TransactionState;
use crate::config::ConfigProvider;
use crate::db::SqlExecutor;
use crate::dialect::{Dialect, DialectCapabilities};
use crate::error::{DbError, DbResult};
use chrono::Utc;
use tracing::{debug, info, warn};

/// State change carried by a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEffect {
    Autocommit(bool),
    /// A transaction is now open on the engine.
    Opened { name: Option<String> },
    /// The engine started a new transaction in place of the one that ended.
    Chained,
    /// No transaction is open on the engine anymore.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    pub sql: String,
    /// Applied once this statement has executed successfully.
    pub effect: Option<StateEffect>,
}

impl PlannedStatement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            effect: None,
        }
    }

    fn with_effect(sql: impl Into<String>, effect: StateEffect) -> Self {
        Self {
            sql: sql.into(),
            effect: Some(effect),
        }
    }
}

/// Where a fully executed plan leaves the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A transaction is now open.
    Begin,
    /// A new transaction followed the old one; the name is retained.
    Chain,
    /// Transaction closed.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Commit,
    Rollback,
}

impl Terminal {
    fn operation(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

/// Ordered statements for one transaction operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    operation: &'static str,
    statements: Vec<PlannedStatement>,
    outcome: PlanOutcome,
}

impl TransactionPlan {
    /// "begin", "commit" or "rollback".
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn statements(&self) -> &[PlannedStatement] {
        &self.statements
    }

    /// Statement texts in execution order.
    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    pub fn outcome(&self) -> PlanOutcome {
        self.outcome
    }
}

/// Renders and executes transaction control statements for one connection.
///
/// Not synchronized: one controller belongs to one connection and is driven
/// through `&mut self`.
#[derive(Debug, Clone)]
pub struct TransactionController {
    state: TransactionState,
    capabilities: DialectCapabilities,
}

impl TransactionController {
    pub fn new(capabilities: DialectCapabilities) -> Self {
        Self {
            state: TransactionState::new(),
            capabilities,
        }
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn capabilities(&self) -> DialectCapabilities {
        self.capabilities
    }

    /// Reset hook for connection teardown.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Plan a transaction start.
    ///
    /// `name` must already be in canonical token form. Fails with
    /// [`DbError::AlreadyInTransaction`] while a transaction is open.
    pub fn plan_begin<D, C>(
        &self,
        dialect: &D,
        flags: TransactionFlags,
        name: Option<String>,
        config: &C,
    ) -> DbResult<TransactionPlan>
    where
        D: Dialect + ?Sized,
        C: ConfigProvider + ?Sized,
    {
        let intent = BeginIntent::decode(flags);

        if self.state.in_transaction {
            return Err(DbError::already_in_transaction(
                config.redacted_config_json(),
            ));
        }

        let caps = self.capabilities;
        let mut statements = Vec::with_capacity(4);
        let mut clauses: Vec<&str> = Vec::with_capacity(2);

        if intent.consistent_snapshot && caps.consistent_snapshot {
            clauses.push(dialect.consistent_snapshot_clause());
        }

        if let Some(read_write) = intent.read_write.filter(|_| caps.read_write_mode) {
            if read_write && caps.autocommit_suspension && self.state.autocommit {
                statements.push(PlannedStatement::with_effect(
                    dialect.autocommit_statement(false),
                    StateEffect::Autocommit(false),
                ));
            }
            clauses.push(dialect.access_mode_clause(read_write));
        }

        if let Some(sql) = intent
            .isolation
            .and_then(|level| dialect.isolation_statement(level))
        {
            statements.push(PlannedStatement::new(sql));
        }

        if let Some(name) = &name {
            statements.push(PlannedStatement::new(format!("/* trans_start:{name} */")));
        }

        let suffix = if clauses.is_empty() {
            String::new()
        } else {
            format!(" {}", clauses.join(", "))
        };
        statements.push(PlannedStatement::with_effect(
            dialect.start_transaction_statement(&suffix),
            StateEffect::Opened { name },
        ));

        Ok(TransactionPlan {
            operation: "begin",
            statements,
            outcome: PlanOutcome::Begin,
        })
    }

    /// Plan a commit. `None` when no transaction is open.
    pub fn plan_commit<D: Dialect + ?Sized>(
        &self,
        dialect: &D,
        flags: TransactionFlags,
    ) -> Option<TransactionPlan> {
        self.plan_terminal(dialect, flags, Terminal::Commit)
    }

    /// Plan a rollback. `None` when no transaction is open.
    pub fn plan_rollback<D: Dialect + ?Sized>(
        &self,
        dialect: &D,
        flags: TransactionFlags,
    ) -> Option<TransactionPlan> {
        self.plan_terminal(dialect, flags, Terminal::Rollback)
    }

    fn plan_terminal<D: Dialect + ?Sized>(
        &self,
        dialect: &D,
        flags: TransactionFlags,
        terminal: Terminal,
    ) -> Option<TransactionPlan> {
        if !self.state.in_transaction {
            return None;
        }

        let chain = decode_chain(flags);
        let chaining = chain == Some(true);
        let mut statements = Vec::with_capacity(4);

        if let Some(name) = &self.state.transaction_name {
            statements.push(PlannedStatement::new(format!(
                "/* trans_{}:{name} */",
                terminal.operation()
            )));
        }

        let suffix = match chain {
            Some(chain) if self.capabilities.chaining => dialect.chain_suffix(chain),
            _ => "",
        };
        let terminal_sql = match terminal {
            Terminal::Commit => dialect.commit_statement(suffix),
            Terminal::Rollback => dialect.rollback_statement(suffix),
        };
        let native_chain = chaining && self.capabilities.chaining;
        statements.push(PlannedStatement::with_effect(
            terminal_sql,
            if native_chain {
                StateEffect::Chained
            } else {
                StateEffect::Closed
            },
        ));

        if chaining && !native_chain {
            // Emulated chain: open the next transaction straight away.
            statements.push(PlannedStatement::with_effect(
                dialect.start_transaction_statement(""),
                StateEffect::Opened {
                    name: self.state.transaction_name.clone(),
                },
            ));
        }

        if !chaining && !self.state.autocommit {
            statements.push(PlannedStatement::with_effect(
                dialect.autocommit_statement(true),
                StateEffect::Autocommit(true),
            ));
        }

        Some(TransactionPlan {
            operation: terminal.operation(),
            statements,
            outcome: if chaining {
                PlanOutcome::Chain
            } else {
                PlanOutcome::Finish
            },
        })
    }

    /// Execute a plan and apply its state changes.
    ///
    /// Statements go out as one newline-joined call when multi-statement execution
    /// is enabled, otherwise one call each, in order. Executor errors are returned
    /// unchanged. In sequential mode each statement's effect is applied as soon as
    /// it succeeds, so the state matches the engine up to the failure point. A
    /// failed batch applies nothing.
    pub async fn execute<E: SqlExecutor>(
        &mut self,
        executor: &mut E,
        plan: TransactionPlan,
    ) -> DbResult<()> {
        let TransactionPlan {
            operation,
            statements,
            outcome,
        } = plan;
        let ending_name = self.state.transaction_name.clone();

        if self.capabilities.multi_statement_exec && statements.len() > 1 {
            let batch = statements
                .iter()
                .map(|s| s.sql.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            debug!(
                operation = operation,
                statements = statements.len(),
                sql = %batch,
                "Executing transaction batch"
            );
            if let Err(err) = executor.exec(&batch).await {
                warn!(operation = operation, error = %err, "Transaction batch failed");
                return Err(err);
            }
            for statement in statements {
                self.apply_effect(statement.effect);
            }
        } else {
            for statement in statements {
                debug!(operation = operation, sql = %statement.sql, "Executing transaction statement");
                if let Err(err) = executor.exec(&statement.sql).await {
                    warn!(
                        operation = operation,
                        sql = %statement.sql,
                        error = %err,
                        in_transaction = self.state.in_transaction,
                        autocommit = self.state.autocommit,
                        "Transaction statement failed"
                    );
                    return Err(err);
                }
                self.apply_effect(statement.effect);
            }
        }

        match outcome {
            PlanOutcome::Begin => info!(
                transaction_name = ?self.state.transaction_name,
                autocommit = self.state.autocommit,
                "Transaction started"
            ),
            PlanOutcome::Chain => info!(
                operation = operation,
                transaction_name = ?self.state.transaction_name,
                "Transaction chained"
            ),
            PlanOutcome::Finish => info!(
                operation = operation,
                transaction_name = ?ending_name,
                "Transaction finished"
            ),
        }
        Ok(())
    }

    fn apply_effect(&mut self, effect: Option<StateEffect>) {
        let Some(effect) = effect else {
            return;
        };
        match effect {
            StateEffect::Autocommit(enabled) => self.state.autocommit = enabled,
            StateEffect::Opened { name } => {
                self.state.in_transaction = true;
                self.state.transaction_name = name;
                self.state.started_at = Some(Utc::now());
            }
            StateEffect::Chained => self.state.started_at = Some(Utc::now()),
            StateEffect::Closed => {
                self.state.in_transaction = false;
                self.state.transaction_name = None;
                self.state.started_at = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ConnectionOptions};
    use crate::db::RecordingExecutor;
    use crate::dialect::{DialectKind, MySqlDialect, SqliteDialect};

    fn mysql_controller() -> TransactionController {
        TransactionController::new(MySqlDialect::default().capabilities())
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("main", DialectKind::MySql)
    }

    #[test]
    fn test_begin_snapshot_read_write_suffix() {
        let controller = mysql_controller();
        let plan = controller
            .plan_begin(
                &MySqlDialect::default(),
                TransactionFlags::REPEATABLE_READ
                    | TransactionFlags::CONSISTENT_SNAPSHOT
                    | TransactionFlags::READ_WRITE,
                None,
                &config(),
            )
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec![
                "SET SESSION autocommit = 0;",
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ;",
                "START TRANSACTION WITH CONSISTENT SNAPSHOT, READ WRITE;",
            ]
        );
        assert_eq!(
            plan.statements()[0].effect,
            Some(StateEffect::Autocommit(false))
        );
    }

    #[test]
    fn test_begin_read_only_keeps_autocommit() {
        let controller = mysql_controller();
        let plan = controller
            .plan_begin(
                &MySqlDialect::default(),
                TransactionFlags::READ_ONLY | TransactionFlags::SERIALIZABLE,
                None,
                &config(),
            )
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec![
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE;",
                "START TRANSACTION READ ONLY;",
            ]
        );
    }

    #[test]
    fn test_begin_without_access_mode_has_no_suffix() {
        let controller = mysql_controller();
        let plan = controller
            .plan_begin(
                &MySqlDialect::default(),
                TransactionFlags::READ_COMMITTED,
                None,
                &config(),
            )
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec![
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED;",
                "START TRANSACTION;",
            ]
        );
    }

    #[test]
    fn test_begin_on_sqlite_ignores_mysql_only_clauses() {
        let controller = TransactionController::new(SqliteDialect::default().capabilities());
        let plan = controller
            .plan_begin(
                &SqliteDialect::default(),
                TransactionFlags::REPEATABLE_READ
                    | TransactionFlags::CONSISTENT_SNAPSHOT
                    | TransactionFlags::READ_WRITE,
                Some("import".to_string()),
                &config(),
            )
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec!["/* trans_start:import */", "BEGIN TRANSACTION;"]
        );
    }

    #[test]
    fn test_snapshot_without_access_mode() {
        let controller = mysql_controller();
        let plan = controller
            .plan_begin(
                &MySqlDialect::default(),
                TransactionFlags::REPEATABLE_READ | TransactionFlags::CONSISTENT_SNAPSHOT,
                None,
                &config(),
            )
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec![
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ;",
                "START TRANSACTION WITH CONSISTENT SNAPSHOT;",
            ]
        );
    }

    #[test]
    fn test_commit_plan_is_none_when_idle() {
        let controller = mysql_controller();
        assert!(
            controller
                .plan_commit(&MySqlDialect::default(), TransactionFlags::empty())
                .is_none()
        );
        assert!(
            controller
                .plan_rollback(&MySqlDialect::default(), TransactionFlags::CHAIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_commit_restores_autocommit() {
        let dialect = MySqlDialect::default();
        let mut controller = mysql_controller();
        let mut executor = RecordingExecutor::new();

        let plan = controller
            .plan_begin(&dialect, TransactionFlags::empty(), None, &config())
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();
        assert!(controller.state().in_transaction());
        assert!(!controller.state().autocommit());

        let plan = controller
            .plan_commit(&dialect, TransactionFlags::NO_CHAIN)
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec!["COMMIT AND NO CHAIN;", "SET SESSION autocommit = 1;"]
        );
        controller.execute(&mut executor, plan).await.unwrap();
        assert!(!controller.state().in_transaction());
        assert!(controller.state().autocommit());
    }

    #[tokio::test]
    async fn test_chained_rollback_keeps_transaction_open() {
        let dialect = MySqlDialect::default();
        let mut controller = mysql_controller();
        let mut executor = RecordingExecutor::new();

        let plan = controller
            .plan_begin(
                &dialect,
                TransactionFlags::READ_WRITE,
                Some("batch".to_string()),
                &config(),
            )
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();

        let plan = controller
            .plan_rollback(&dialect, TransactionFlags::CHAIN)
            .unwrap();
        assert_eq!(
            plan.sql(),
            vec!["/* trans_rollback:batch */", "ROLLBACK AND CHAIN;"]
        );
        assert_eq!(plan.outcome(), PlanOutcome::Chain);
        controller.execute(&mut executor, plan).await.unwrap();

        assert!(controller.state().in_transaction());
        assert!(!controller.state().autocommit());
        assert_eq!(controller.state().transaction_name(), Some("batch"));
    }

    #[tokio::test]
    async fn test_batched_execution_is_one_call() {
        let dialect = MySqlDialect::default();
        let caps = dialect.capabilities().with_options(&ConnectionOptions {
            multi_statements: Some(true),
            ..Default::default()
        });
        let mut controller = TransactionController::new(caps);
        let mut executor = RecordingExecutor::new();

        let plan = controller
            .plan_begin(
                &dialect,
                TransactionFlags::READ_WRITE,
                Some("sync".to_string()),
                &config(),
            )
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();

        assert_eq!(
            executor.calls(),
            &["SET SESSION autocommit = 0;\n/* trans_start:sync */\nSTART TRANSACTION READ WRITE;"
                .to_string()]
        );
        assert!(controller.state().in_transaction());
        assert!(!controller.state().autocommit());
    }

    #[tokio::test]
    async fn test_batched_failure_applies_nothing() {
        let dialect = MySqlDialect::default();
        let caps = dialect.capabilities().with_options(&ConnectionOptions {
            multi_statements: Some(true),
            ..Default::default()
        });
        let mut controller = TransactionController::new(caps);
        let mut executor = RecordingExecutor::failing_on("START TRANSACTION");

        let plan = controller
            .plan_begin(&dialect, TransactionFlags::READ_WRITE, None, &config())
            .unwrap();
        let err = controller.execute(&mut executor, plan).await.unwrap_err();

        assert!(matches!(err, DbError::Database { .. }));
        assert_eq!(controller.state(), &TransactionState::new());
    }

    #[tokio::test]
    async fn test_sequential_failure_keeps_applied_effects() {
        let dialect = MySqlDialect::default();
        let mut controller = mysql_controller();
        let mut executor = RecordingExecutor::failing_on("START TRANSACTION");

        let plan = controller
            .plan_begin(&dialect, TransactionFlags::READ_WRITE, None, &config())
            .unwrap();
        assert!(controller.execute(&mut executor, plan).await.is_err());

        // autocommit really was switched off before START TRANSACTION failed
        assert!(!controller.state().autocommit());
        assert!(!controller.state().in_transaction());
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_begin_while_active_is_rejected_with_redacted_config() {
        let dialect = MySqlDialect::default();
        let mut controller = mysql_controller();
        let mut executor = RecordingExecutor::new();
        let config = ConnectionConfig::parse("mysql://app:hunter2@db:3306/shop").unwrap();

        let plan = controller
            .plan_begin(&dialect, TransactionFlags::empty(), None, &config)
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();
        let before = controller.state().clone();

        let err = controller
            .plan_begin(&dialect, TransactionFlags::empty(), None, &config)
            .unwrap_err();
        match err {
            DbError::AlreadyInTransaction { config } => {
                assert!(!config.contains("hunter2"));
                assert!(config.contains(r#""database":"shop""#));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(controller.state(), &before);
    }

    #[test]
    fn test_reset() {
        let mut controller = mysql_controller();
        controller.state.in_transaction = true;
        controller.state.autocommit = false;
        controller.reset();
        assert_eq!(controller.state(), &TransactionState::new());
    }

    #[tokio::test]
    async fn test_emulated_chain_plan_carries_close_then_open() {
        let dialect = SqliteDialect::default();
        let mut controller = TransactionController::new(dialect.capabilities());
        let mut executor = RecordingExecutor::new();

        let plan = controller
            .plan_begin(
                &dialect,
                TransactionFlags::empty(),
                Some("load".to_string()),
                &config(),
            )
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();

        let plan = controller
            .plan_commit(&dialect, TransactionFlags::CHAIN)
            .unwrap();
        let effects: Vec<_> = plan.statements().iter().map(|s| s.effect.clone()).collect();
        assert_eq!(
            effects,
            vec![
                None,
                Some(StateEffect::Closed),
                Some(StateEffect::Opened {
                    name: Some("load".to_string())
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_after_terminal_reflects_closed_transaction() {
        let dialect = MySqlDialect::default();
        let mut controller = mysql_controller();
        let mut executor = RecordingExecutor::failing_on("autocommit = 1");

        let plan = controller
            .plan_begin(
                &dialect,
                TransactionFlags::READ_WRITE,
                Some("job".to_string()),
                &config(),
            )
            .unwrap();
        controller.execute(&mut executor, plan).await.unwrap();

        let plan = controller
            .plan_commit(&dialect, TransactionFlags::empty())
            .unwrap();
        assert!(controller.execute(&mut executor, plan).await.is_err());

        // COMMIT went through, re-enabling autocommit did not
        assert!(!controller.state().in_transaction());
        assert_eq!(controller.state().transaction_name(), None);
        assert_eq!(controller.state().started_at(), None);
        assert!(!controller.state().autocommit());
    }
}

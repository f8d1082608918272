//! db-connection - Main entry point.
//!
//! Renders (dry run) or runs a single transaction script: bootstrap the
//! connection, begin, execute the given statements, then commit or roll back.

use clap::Parser;
use db_connection::config::Config;
use db_connection::{
    AnyDialect, Connection, DbError, DbResult, DialectKind, RecordingExecutor, SqlExecutor,
    TransactionFlags,
};
use sqlx::{Connection as _, MySqlConnection, SqliteConnection};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let connection_config = config.connection_config()?;
    info!(
        connection_id = %connection_config.id,
        dialect = %connection_config.dialect,
        target = %connection_config.masked_connection_string(),
        dry_run = config.database.is_none(),
        "Starting db-connection v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.database.is_none() {
        let conn = Connection::from_config(connection_config, RecordingExecutor::new());
        let conn = run_script(conn, &config).await.inspect_err(report_failure)?;
        for sql in conn.executor().calls() {
            println!("{sql}");
        }
        return Ok(());
    }

    match connection_config.dialect {
        DialectKind::Sqlite | DialectKind::SqliteProvider => {
            let executor = SqliteConnection::connect(&connection_config.connection_string)
                .await
                .map_err(DbError::from)?;
            let conn = run_script(Connection::from_config(connection_config, executor), &config)
                .await
                .inspect_err(report_failure)?;
            conn.into_executor().close().await.map_err(DbError::from)?;
        }
        DialectKind::MySql => {
            let executor = MySqlConnection::connect(&connection_config.connection_string)
                .await
                .map_err(DbError::from)?;
            let conn = run_script(Connection::from_config(connection_config, executor), &config)
                .await
                .inspect_err(report_failure)?;
            conn.into_executor().close().await.map_err(DbError::from)?;
        }
    }

    info!("Transaction script finished");
    Ok(())
}

fn report_failure(err: &DbError) {
    error!(
        error = %err,
        sql_state = ?err.sql_state(),
        suggestion = err.suggestion().unwrap_or_default(),
        retryable = err.is_retryable(),
        "Transaction script failed"
    );
}

/// Bootstrap, begin, run the user statements, then commit or roll back.
///
/// A failing user statement rolls the transaction back (unless the connection
/// is gone) and the error is returned.
async fn run_script<E: SqlExecutor>(
    mut conn: Connection<AnyDialect, E>,
    config: &Config,
) -> DbResult<Connection<AnyDialect, E>> {
    conn.bootstrap().await?;
    conn.begin_transaction(config.begin_flags(), config.name.as_deref())
        .await?;

    for sql in &config.statements {
        if let Err(err) = conn.executor_mut().exec(sql).await {
            error!(sql = %sql, error = %err, "Statement failed");
            if conn.is_connection_lost(&err) {
                conn.reset_transaction_state();
            } else if let Err(rollback_err) = conn.rollback(TransactionFlags::empty()).await {
                error!(error = %rollback_err, "Rollback after failure also failed");
            }
            return Err(err);
        }
    }

    let end = config.end_flags();
    if config.rollback {
        conn.rollback(end).await?;
    } else {
        conn.commit(end).await?;
    }

    // A chained terminal leaves a fresh transaction open; close it.
    if conn.in_transaction() {
        conn.commit(TransactionFlags::NO_CHAIN).await?;
    }

    Ok(conn)
}

//! Configuration handling.
//!
//! Connection settings are parsed from a database URL whose query string may carry
//! options for this crate (they are stripped before the URL reaches the driver).
//! The CLI configuration for the `db-connection` binary lives here as well.

use crate::dialect::DialectKind;
use crate::transaction::{IsolationLevel, TransactionFlags};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const DEFAULT_CONNECTION_ID: &str = "default";
pub const DRY_RUN_CONNECTION_ID: &str = "dry_run";

/// Option keys consumed from the URL query string.
const OPTION_KEYS: &[&str] = &[
    "dialect",
    "multi_statements",
    "read_write_mode",
    "autocommit_suspension",
    "init",
];

/// Per-connection options. Capability overrides left as `None` keep the dialect default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Allow several statements in one executor call (never auto-detected).
    #[serde(default)]
    pub multi_statements: Option<bool>,
    /// Override whether `READ WRITE` / `READ ONLY` is rendered on transaction start.
    #[serde(default)]
    pub read_write_mode: Option<bool>,
    /// Override whether read-write transactions switch session autocommit off.
    #[serde(default)]
    pub autocommit_suspension: Option<bool>,
    /// Statements run by the base setup step of every bootstrap, in order.
    #[serde(default)]
    pub init_statements: Vec<String>,
}

/// Configuration for a single database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub dialect: DialectKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    /// Removed from every diagnostic payload.
    pub password: Option<String>,
    /// Driver URL with our options stripped. Contains credentials - never log.
    #[serde(skip_serializing, default)]
    pub connection_string: String,
    #[serde(default)]
    pub options: ConnectionOptions,
}

impl ConnectionConfig {
    /// Create a configuration without a driver URL (dry runs, tests).
    pub fn new(id: impl Into<String>, dialect: DialectKind) -> Self {
        Self {
            id: id.into(),
            dialect,
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
            connection_string: String::new(),
            options: ConnectionOptions::default(),
        }
    }

    /// Replace the connection options.
    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse a connection config from `url` or `id=url`.
    ///
    /// # Examples
    ///
    /// ```text
    /// sqlite:data.db
    /// sqlite::memory:?dialect=sqlite-provider
    /// reports=mysql://app:secret@db:3306/reports?multi_statements=true
    /// mysql://app@db/shop?init=SET%20NAMES%20utf8mb4&autocommit_suspension=false
    /// ```
    pub fn parse(s: &str) -> Result<Self, ConnectionConfigError> {
        // Split name=url format (only if '=' before ':')
        let scheme_pos = s.find(':').unwrap_or(s.len());
        let (explicit_name, url_str) = match s[..scheme_pos].find('=') {
            Some(idx) => (Some(s[..idx].trim()), &s[idx + 1..]),
            None => (None, s),
        };

        if let Some(name) = explicit_name {
            validate_id(name)?;
        }

        let mut url =
            Url::parse(url_str).map_err(|e| ConnectionConfigError::InvalidUrl(e.to_string()))?;
        let opts = extract_options(&mut url, OPTION_KEYS);

        let mut dialect = DialectKind::from_scheme(url.scheme())
            .ok_or_else(|| ConnectionConfigError::UnknownDialect(url.scheme().to_string()))?;
        let mut options = ConnectionOptions::default();

        for (key, value) in opts {
            match key.as_str() {
                "dialect" => {
                    dialect = value
                        .parse()
                        .map_err(|_| ConnectionConfigError::UnknownDialect(value.clone()))?;
                }
                "multi_statements" => options.multi_statements = Some(parse_bool(&key, &value)?),
                "read_write_mode" => options.read_write_mode = Some(parse_bool(&key, &value)?),
                "autocommit_suspension" => {
                    options.autocommit_suspension = Some(parse_bool(&key, &value)?)
                }
                "init" if !value.trim().is_empty() => options.init_statements.push(value),
                _ => {}
            }
        }

        let is_sqlite = dialect.is_sqlite();
        let database = db_name(&url);
        let id = explicit_name
            .map(String::from)
            .or_else(|| database.clone())
            .unwrap_or_else(|| DEFAULT_CONNECTION_ID.to_string());

        Ok(Self {
            id,
            dialect,
            host: if is_sqlite {
                None
            } else {
                url.host_str().map(String::from)
            },
            port: url.port(),
            database,
            user: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(String::from),
            password: url.password().map(String::from),
            connection_string: url.to_string(),
            options,
        })
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            let scheme_end = self.connection_string.find("://").map_or(0, |p| p + 3);
            if let Some(colon_pos) = self.connection_string[scheme_end..at_pos].rfind(':') {
                let colon_pos = scheme_end + colon_pos;
                let prefix = &self.connection_string[..colon_pos + 1];
                let suffix = &self.connection_string[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.connection_string.clone()
    }
}

/// Supplies connection configuration for diagnostic payloads.
pub trait ConfigProvider {
    /// The configuration as a JSON object.
    fn config_map(&self) -> Map<String, Value>;

    /// The configuration serialized as JSON with the `password` field removed.
    fn redacted_config_json(&self) -> String {
        let mut map = self.config_map();
        map.remove("password");
        Value::Object(map).to_string()
    }
}

impl ConfigProvider for ConnectionConfig {
    fn config_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl ConfigProvider for Map<String, Value> {
    fn config_map(&self) -> Map<String, Value> {
        self.clone()
    }
}

/// Errors that can occur when parsing a connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection ID cannot be empty")]
    EmptyId,

    #[error("Connection ID contains invalid characters: {0}")]
    InvalidId(String),

    #[error("Connection ID '{0}' is reserved")]
    ReservedId(String),

    #[error("Unknown database dialect: {0}")]
    UnknownDialect(String),

    #[error("Invalid value '{value}' for option '{key}' (expected true or false)")]
    InvalidOption { key: String, value: String },
}

fn validate_id(id: &str) -> Result<(), ConnectionConfigError> {
    if id.is_empty() {
        return Err(ConnectionConfigError::EmptyId);
    }
    if id.eq_ignore_ascii_case(DEFAULT_CONNECTION_ID) {
        return Err(ConnectionConfigError::ReservedId(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConnectionConfigError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConnectionConfigError> {
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Ok(false)
    } else {
        Err(ConnectionConfigError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Extract our options from URL query params, keeping others for the driver.
/// Repeated keys are kept in order.
fn extract_options(url: &mut Url, keys: &[&str]) -> Vec<(String, String)> {
    let mut opts = Vec::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.push((key_lower, v.into_owned()));
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

fn db_name(url: &Url) -> Option<String> {
    url.path()
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && *s != ":memory:")
        .map(|s| s.trim_end_matches(".sqlite").trim_end_matches(".db"))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Command-line configuration for the `db-connection` binary.
///
/// Without `--database` the transaction script is only rendered: every statement
/// that would be sent is printed, one per line.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-connection",
    about = "Render or run a transaction script against a SQL database",
    version
)]
pub struct Config {
    /// Database URL ("url" or "id=url"). Omit for a dry run.
    #[arg(short = 'd', long = "database", value_name = "URL", env = "DB_CONNECTION_URL")]
    pub database: Option<String>,

    /// Dialect used for dry runs
    #[arg(long, value_enum, default_value = "mysql", env = "DB_CONNECTION_DIALECT")]
    pub dialect: DialectKind,

    /// Isolation level for the transaction
    #[arg(long, value_enum)]
    pub isolation: Option<IsolationLevel>,

    /// Start a read-only transaction instead of a read-write one
    #[arg(long)]
    pub read_only: bool,

    /// Start with a consistent snapshot (only with --isolation repeatable-read)
    #[arg(long)]
    pub consistent_snapshot: bool,

    /// Transaction name, embedded in SQL comments
    #[arg(long)]
    pub name: Option<String>,

    /// Statement to run inside the transaction (repeatable)
    #[arg(short = 'e', long = "exec", value_name = "SQL")]
    pub statements: Vec<String>,

    /// Roll back instead of committing
    #[arg(long)]
    pub rollback: bool,

    /// Chain a new transaction onto the commit/rollback
    #[arg(long)]
    pub chain: bool,

    /// Send transaction statements as one multi-statement call
    #[arg(long)]
    pub multi_statements: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "DB_CONNECTION_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_CONNECTION_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Flags for the opening `begin_transaction` call.
    pub fn begin_flags(&self) -> TransactionFlags {
        let mut flags = if self.read_only {
            TransactionFlags::READ_ONLY
        } else {
            TransactionFlags::READ_WRITE
        };
        if let Some(level) = self.isolation {
            flags |= level.flag();
        }
        if self.consistent_snapshot {
            flags |= TransactionFlags::CONSISTENT_SNAPSHOT;
        }
        flags
    }

    /// Flags for the terminal commit or rollback.
    pub fn end_flags(&self) -> TransactionFlags {
        if self.chain {
            TransactionFlags::CHAIN
        } else {
            TransactionFlags::empty()
        }
    }

    /// Build the connection configuration, falling back to a dry-run config.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConnectionConfigError> {
        let mut config = match &self.database {
            Some(url) => ConnectionConfig::parse(url)?,
            None => ConnectionConfig::new(DRY_RUN_CONNECTION_ID, self.dialect),
        };
        if self.multi_statements {
            config.options.multi_statements = Some(true);
        }
        Ok(config)
    }
}

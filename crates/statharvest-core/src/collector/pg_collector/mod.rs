//! PostgreSQL metrics collector.
//!
//! Collects instance-wide metrics from PostgreSQL statistics views:
//! - `version()` — server version, selects the `pg_stat_activity` query shape
//! - `pg_stat_database` — counters summed across all databases
//! - `pg_stat_activity` — connection counts grouped by state and waiting flag
//! - `pg_database_size()` — total on-disk size of all connectable databases
//!
//! One connection is opened per fetch and closed before the fetch returns.
//! Query failures abort the fetch; a row that fails to decode is logged and
//! skipped so one odd row does not discard the whole instance's statistics.

mod activity;
mod database;
pub(crate) mod queries;
mod size;
mod source;
mod version;

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::metrics::{MetricMap, merge_metrics};

pub use activity::{
    ConnectionStateRow, SEEDED_STATES, fetch_connections, fold_connection_states, normalize_state,
};
pub use database::{StatDatabaseRow, StatDatabaseTotals, fetch_stat_database};
pub use queries::select_connections_query;
pub use size::{DatabaseSizeRow, fetch_database_size, fold_database_size};
pub use source::{ClientSource, PgSource, ScannedRows};
pub use version::{Version, detect_version};

/// Error type for PostgreSQL collection.
#[derive(Debug, Error)]
pub enum PgCollectError {
    /// Connection could not be established.
    #[error("PostgreSQL: {0}")]
    Connection(String),
    /// `version()` missing or not in the expected format.
    #[error("PostgreSQL version: {0}")]
    VersionParse(String),
    /// Query execution failed.
    #[error("PostgreSQL query error: {0}")]
    Query(String),
    /// A single result row could not be decoded.
    #[error("PostgreSQL row scan error: {0}")]
    RowScan(String),
}

/// libpq-style `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(format!("unknown sslmode '{}'", other)),
        }
    }
}

impl SslMode {
    /// Closest mode the driver understands; certificate checks are configured
    /// on the TLS connector instead.
    fn driver_mode(self) -> postgres::config::SslMode {
        match self {
            SslMode::Disable => postgres::config::SslMode::Disable,
            SslMode::Allow | SslMode::Prefer => postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                postgres::config::SslMode::Require
            }
        }
    }
}

/// Connection parameters assembled by the caller.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sslmode: SslMode,
    /// Connect timeout in seconds; 0 waits indefinitely.
    pub connect_timeout: u64,
    /// Extra libpq `key=value` options, e.g. `dbname=app`.
    pub option: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            sslmode: SslMode::Disable,
            connect_timeout: 5,
            option: None,
        }
    }
}

impl PostgresConfig {
    /// Builds the driver configuration. The option string is parsed first so
    /// explicit fields take precedence.
    pub fn to_pg_config(&self) -> Result<postgres::Config, PgCollectError> {
        let mut config = match self.option.as_deref().map(str::trim) {
            Some(option) if !option.is_empty() => option.parse::<postgres::Config>().map_err(|e| {
                PgCollectError::Connection(format!("invalid connection option '{}': {}", option, e))
            })?,
            _ => postgres::Config::new(),
        };

        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .ssl_mode(self.sslmode.driver_mode());
        if self.connect_timeout > 0 {
            config.connect_timeout(Duration::from_secs(self.connect_timeout));
        }

        Ok(config)
    }
}

/// Runs the full statistics pipeline over an open source.
///
/// Order is fixed: version, `pg_stat_database`, `pg_stat_activity`, size.
/// The per-view maps are merged in that order, later keys winning.
pub fn collect_metrics<S: PgSource>(source: &mut S) -> Result<MetricMap, PgCollectError> {
    let version = detect_version(source)?;
    let database = fetch_stat_database(source)?;
    let connections = fetch_connections(source, version)?;
    let size = fetch_database_size(source)?;

    let metrics = merge_metrics([database, connections, size]);
    debug!(%version, metrics = metrics.len(), "PostgreSQL statistics collected");
    Ok(metrics)
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}

//! Query execution seam between the statistics pipeline and the database.
//!
//! `PgSource` lets the pipeline run against a live `postgres::Client` or an
//! in-memory mock for tests.

use native_tls::TlsConnector;
use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, error};

use super::activity::ConnectionStateRow;
use super::database::StatDatabaseRow;
use super::queries::{DATABASE_SIZE_QUERY, STAT_DATABASE_QUERY, VERSION_QUERY};
use super::size::DatabaseSizeRow;
use super::{PgCollectError, PostgresConfig, SslMode, format_postgres_error};

/// Result rows where each row decoded independently.
///
/// The outer `Result` of a query is execution success; each element carries
/// its own `RowScan` error so callers can skip bad rows.
pub type ScannedRows<T> = Vec<Result<T, PgCollectError>>;

/// Source of PostgreSQL statistics rows.
pub trait PgSource {
    /// Text of `select version()`, or `None` when no row came back.
    fn query_version(&mut self) -> Result<Option<String>, PgCollectError>;

    /// All rows of `pg_stat_database`.
    fn query_stat_database(&mut self) -> Result<ScannedRows<StatDatabaseRow>, PgCollectError>;

    /// `(count, state, waiting)` groups from `pg_stat_activity` using `query`.
    fn query_connection_states(
        &mut self,
        query: &str,
    ) -> Result<ScannedRows<ConnectionStateRow>, PgCollectError>;

    /// Summed database size rows.
    fn query_database_size(&mut self) -> Result<ScannedRows<DatabaseSizeRow>, PgCollectError>;
}

/// Live source backed by a single `postgres::Client`.
pub struct ClientSource {
    client: Client,
}

impl ClientSource {
    /// Opens a connection, through TLS unless `sslmode` is `disable`.
    pub fn connect(config: &PostgresConfig) -> Result<Self, PgCollectError> {
        let pg_config = config.to_pg_config()?;

        let client = match config.sslmode {
            SslMode::Disable => pg_config.connect(NoTls),
            mode => pg_config.connect(MakeTlsConnector::new(build_tls_connector(mode)?)),
        }
        .map_err(|e| PgCollectError::Connection(format_postgres_error(&e)))?;

        debug!(host = %config.host, port = config.port, "connected to PostgreSQL");
        Ok(Self { client })
    }

    /// Closes the connection, sending a graceful terminate message.
    pub fn close(self) {
        if let Err(e) = self.client.close() {
            debug!(error = %format_postgres_error(&e), "error while closing connection");
        }
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, PgCollectError> {
        self.client
            .query(sql, &[])
            .map_err(|e| PgCollectError::Query(format_postgres_error(&e)))
    }
}

fn build_tls_connector(mode: SslMode) -> Result<TlsConnector, PgCollectError> {
    let mut builder = TlsConnector::builder();
    match mode {
        SslMode::VerifyFull => {}
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        _ => {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
    }
    builder
        .build()
        .map_err(|e| PgCollectError::Connection(format!("TLS setup failed: {}", e)))
}

fn scan_rows<T>(
    rows: &[Row],
    decode: impl Fn(&Row) -> Result<T, postgres::Error>,
) -> ScannedRows<T> {
    rows.iter()
        .map(|row| decode(row).map_err(|e| PgCollectError::RowScan(e.to_string())))
        .collect()
}

impl PgSource for ClientSource {
    fn query_version(&mut self) -> Result<Option<String>, PgCollectError> {
        let rows = self.query(VERSION_QUERY)?;
        match rows.first() {
            Some(row) => row.try_get::<_, String>(0).map(Some).map_err(|e| {
                error!(error = %e, "failed to scan version()");
                PgCollectError::VersionParse(e.to_string())
            }),
            None => Ok(None),
        }
    }

    fn query_stat_database(&mut self) -> Result<ScannedRows<StatDatabaseRow>, PgCollectError> {
        let rows = self.query(STAT_DATABASE_QUERY)?;
        Ok(scan_rows(&rows, StatDatabaseRow::from_row))
    }

    fn query_connection_states(
        &mut self,
        query: &str,
    ) -> Result<ScannedRows<ConnectionStateRow>, PgCollectError> {
        let rows = self.query(query)?;
        Ok(scan_rows(&rows, ConnectionStateRow::from_row))
    }

    fn query_database_size(&mut self) -> Result<ScannedRows<DatabaseSizeRow>, PgCollectError> {
        let rows = self.query(DATABASE_SIZE_QUERY)?;
        Ok(scan_rows(&rows, DatabaseSizeRow::from_row))
    }
}

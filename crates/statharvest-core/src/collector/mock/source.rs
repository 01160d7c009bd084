//! In-memory `PgSource` returning canned rows.

use crate::collector::pg_collector::queries::{
    DATABASE_SIZE_QUERY, STAT_DATABASE_QUERY, VERSION_QUERY,
};
use crate::collector::pg_collector::{
    ConnectionStateRow, DatabaseSizeRow, PgCollectError, PgSource, ScannedRows, StatDatabaseRow,
};

/// In-memory PostgreSQL source for testing.
///
/// Rows are stored as `Result<_, String>`; an `Err` entry is returned as a
/// `RowScan` error to simulate a row that fails to decode.
#[derive(Debug, Clone, Default)]
pub struct MockPgSource {
    version: Option<String>,
    stat_database: Vec<Result<StatDatabaseRow, String>>,
    connection_states: Vec<Result<ConnectionStateRow, String>>,
    database_size: Vec<Result<DatabaseSizeRow, String>>,
    /// Queries containing any of these substrings fail with `Query`.
    failing: Vec<String>,
    executed: Vec<String>,
}

fn scanned<T: Clone>(rows: &[Result<T, String>]) -> ScannedRows<T> {
    rows.iter()
        .map(|row| row.clone().map_err(PgCollectError::RowScan))
        .collect()
}

impl MockPgSource {
    /// Creates a source with no version row and empty views.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn add_stat_database(&mut self, row: StatDatabaseRow) {
        self.stat_database.push(Ok(row));
    }

    pub fn add_connection_state(&mut self, count: f64, state: &str, waiting: bool) {
        self.connection_states.push(Ok(ConnectionStateRow {
            count,
            state: state.to_string(),
            waiting,
        }));
    }

    pub fn add_database_size(&mut self, size: f64) {
        self.database_size.push(Ok(DatabaseSizeRow { size }));
    }

    /// Adds a `pg_stat_database` row that fails to decode.
    pub fn add_bad_stat_database_row(&mut self, reason: &str) {
        self.stat_database.push(Err(reason.to_string()));
    }

    /// Adds a `pg_stat_activity` row that fails to decode.
    pub fn add_bad_connection_state_row(&mut self, reason: &str) {
        self.connection_states.push(Err(reason.to_string()));
    }

    /// Makes every query containing `needle` fail.
    pub fn fail_query(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Queries run so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// The pg_stat_activity query chosen by the pipeline, if it ran.
    pub fn executed_connections_query(&self) -> Option<&str> {
        self.executed
            .iter()
            .find(|q| q.contains("pg_stat_activity"))
            .map(String::as_str)
    }

    fn run(&mut self, query: &str) -> Result<(), PgCollectError> {
        self.executed.push(query.to_string());
        match self.failing.iter().find(|needle| query.contains(needle.as_str())) {
            Some(needle) => Err(PgCollectError::Query(format!(
                "mock failure for '{}'",
                needle
            ))),
            None => Ok(()),
        }
    }
}

impl PgSource for MockPgSource {
    fn query_version(&mut self) -> Result<Option<String>, PgCollectError> {
        self.run(VERSION_QUERY)?;
        Ok(self.version.clone())
    }

    fn query_stat_database(&mut self) -> Result<ScannedRows<StatDatabaseRow>, PgCollectError> {
        self.run(STAT_DATABASE_QUERY)?;
        Ok(scanned(&self.stat_database))
    }

    fn query_connection_states(
        &mut self,
        query: &str,
    ) -> Result<ScannedRows<ConnectionStateRow>, PgCollectError> {
        self.run(query)?;
        Ok(scanned(&self.connection_states))
    }

    fn query_database_size(&mut self) -> Result<ScannedRows<DatabaseSizeRow>, PgCollectError> {
        self.run(DATABASE_SIZE_QUERY)?;
        Ok(scanned(&self.database_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_executed_queries() {
        let mut source = MockPgSource::new().with_version("PostgreSQL 16.2 on x");
        source.query_version().unwrap();
        source.query_database_size().unwrap();
        assert_eq!(source.executed(), &[VERSION_QUERY, DATABASE_SIZE_QUERY]);
    }

    #[test]
    fn bad_rows_become_scan_errors() {
        let mut source = MockPgSource::new();
        source.add_bad_stat_database_row("invalid type");
        let rows = source.query_stat_database().unwrap();
        assert!(matches!(rows[0], Err(PgCollectError::RowScan(_))));
    }

    #[test]
    fn failing_query_is_recorded() {
        let mut source = MockPgSource::new().fail_query("version");
        assert!(source.query_version().is_err());
        assert_eq!(source.executed().len(), 1);
    }
}

//! Total database size.

use postgres::Row;
use tracing::{error, warn};

use super::PgCollectError;
use super::source::PgSource;
use crate::metrics::MetricMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatabaseSizeRow {
    pub size: f64,
}

impl DatabaseSizeRow {
    /// A NULL sum (no connectable database) fails to decode.
    pub(crate) fn from_row(row: &Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            size: row.try_get("dbsize")?,
        })
    }
}

/// Sums the size rows into `total_size`, skipping undecodable rows.
pub fn fold_database_size<I>(rows: I) -> MetricMap
where
    I: IntoIterator<Item = Result<DatabaseSizeRow, PgCollectError>>,
{
    let mut total_size = 0.0;
    for row in rows {
        match row {
            Ok(row) => total_size += row.size,
            Err(e) => warn!(error = %e, "failed to scan database size row, skipping"),
        }
    }
    MetricMap::from([("total_size".to_string(), total_size)])
}

/// On-disk size of every database the monitoring role may connect to.
pub fn fetch_database_size<S: PgSource>(source: &mut S) -> Result<MetricMap, PgCollectError> {
    let rows = source
        .query_database_size()
        .inspect_err(|e| error!(error = %e, "failed to select pg_database_size"))?;
    Ok(fold_database_size(rows))
}

//! pg_stat_database aggregation.

use postgres::Row;
use postgres::types::FromSql;
use tracing::{error, warn};

use super::PgCollectError;
use super::source::PgSource;
use crate::metrics::MetricMap;

/// One database's counters from `pg_stat_database`.
///
/// `Option` fields are NULL on some rows or missing on older servers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatDatabaseRow {
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub blk_read_time: Option<f64>,
    pub blk_write_time: Option<f64>,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub deadlocks: Option<i64>,
    pub temp_bytes: Option<i64>,
}

/// Reads a nullable column, treating a column absent from the result set as NULL.
fn optional_column<'a, T: FromSql<'a>>(
    row: &'a Row,
    name: &str,
) -> Result<Option<T>, postgres::Error> {
    if row.columns().iter().any(|c| c.name() == name) {
        row.try_get::<_, Option<T>>(name)
    } else {
        Ok(None)
    }
}

impl StatDatabaseRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            xact_commit: row.try_get("xact_commit")?,
            xact_rollback: row.try_get("xact_rollback")?,
            blks_read: row.try_get("blks_read")?,
            blks_hit: row.try_get("blks_hit")?,
            blk_read_time: optional_column(row, "blk_read_time")?,
            blk_write_time: optional_column(row, "blk_write_time")?,
            tup_returned: row.try_get("tup_returned")?,
            tup_fetched: row.try_get("tup_fetched")?,
            tup_inserted: row.try_get("tup_inserted")?,
            tup_updated: row.try_get("tup_updated")?,
            tup_deleted: row.try_get("tup_deleted")?,
            deadlocks: optional_column(row, "deadlocks")?,
            temp_bytes: optional_column(row, "temp_bytes")?,
        })
    }
}

/// Instance-wide totals. Optional counters stay `None` until some row reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatDatabaseTotals {
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub blk_read_time: Option<f64>,
    pub blk_write_time: Option<f64>,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub deadlocks: Option<i64>,
    pub temp_bytes: Option<i64>,
}

fn add_optional<T: std::ops::Add<Output = T>>(total: Option<T>, value: Option<T>) -> Option<T> {
    match (total, value) {
        (Some(t), Some(v)) => Some(t + v),
        (None, v) => v,
        (t, None) => t,
    }
}

impl StatDatabaseTotals {
    pub fn add(&mut self, row: &StatDatabaseRow) {
        self.xact_commit += row.xact_commit;
        self.xact_rollback += row.xact_rollback;
        self.blks_read += row.blks_read;
        self.blks_hit += row.blks_hit;
        self.blk_read_time = add_optional(self.blk_read_time, row.blk_read_time);
        self.blk_write_time = add_optional(self.blk_write_time, row.blk_write_time);
        self.tup_returned += row.tup_returned;
        self.tup_fetched += row.tup_fetched;
        self.tup_inserted += row.tup_inserted;
        self.tup_updated += row.tup_updated;
        self.tup_deleted += row.tup_deleted;
        self.deadlocks = add_optional(self.deadlocks, row.deadlocks);
        self.temp_bytes = add_optional(self.temp_bytes, row.temp_bytes);
    }

    /// Folds scanned rows, skipping those that failed to decode.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Result<StatDatabaseRow, PgCollectError>>,
    {
        let mut totals = Self::default();
        for row in rows {
            match row {
                Ok(row) => totals.add(&row),
                Err(e) => warn!(error = %e, "failed to scan pg_stat_database row, skipping"),
            }
        }
        totals
    }

    /// Metric keys for the totals. Unreported optional counters are omitted.
    pub fn into_metrics(self) -> MetricMap {
        let mut stat = MetricMap::new();
        stat.insert("xact_commit".into(), self.xact_commit as f64);
        stat.insert("xact_rollback".into(), self.xact_rollback as f64);
        stat.insert("blks_read".into(), self.blks_read as f64);
        stat.insert("blks_hit".into(), self.blks_hit as f64);
        if let Some(v) = self.blk_read_time {
            stat.insert("blk_read_time".into(), v);
        }
        if let Some(v) = self.blk_write_time {
            stat.insert("blk_write_time".into(), v);
        }
        stat.insert("tup_returned".into(), self.tup_returned as f64);
        stat.insert("tup_fetched".into(), self.tup_fetched as f64);
        stat.insert("tup_inserted".into(), self.tup_inserted as f64);
        stat.insert("tup_updated".into(), self.tup_updated as f64);
        stat.insert("tup_deleted".into(), self.tup_deleted as f64);
        if let Some(v) = self.deadlocks {
            stat.insert("deadlocks".into(), v as f64);
        }
        if let Some(v) = self.temp_bytes {
            stat.insert("temp_bytes".into(), v as f64);
        }
        stat
    }
}

/// Sums `pg_stat_database` across every database of the instance.
pub fn fetch_stat_database<S: PgSource>(source: &mut S) -> Result<MetricMap, PgCollectError> {
    let rows = source
        .query_stat_database()
        .inspect_err(|e| error!(error = %e, "failed to select pg_stat_database"))?;
    Ok(StatDatabaseTotals::from_rows(rows).into_metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockPgSource;

    fn row(xact_commit: i64, deadlocks: Option<i64>) -> StatDatabaseRow {
        StatDatabaseRow {
            xact_commit,
            deadlocks,
            ..Default::default()
        }
    }

    #[test]
    fn sums_required_counters() {
        let totals = StatDatabaseTotals::from_rows([
            Ok(row(10, None)),
            Ok(row(20, None)),
            Ok(row(5, None)),
        ]);
        assert_eq!(totals.xact_commit, 35);
    }

    #[test]
    fn optional_counter_sums_present_values_only() {
        let totals = StatDatabaseTotals::from_rows([
            Ok(row(10, Some(2))),
            Ok(row(20, None)),
            Ok(row(5, Some(1))),
        ]);
        let metrics = totals.into_metrics();
        assert_eq!(metrics["xact_commit"], 35.0);
        assert_eq!(metrics["deadlocks"], 3.0);
    }

    #[test]
    fn optional_counter_present_in_one_row() {
        let metrics = StatDatabaseTotals::from_rows([
            Ok(row(10, None)),
            Ok(row(20, Some(0))),
            Ok(row(5, None)),
        ])
        .into_metrics();
        assert_eq!(metrics["deadlocks"], 0.0);
    }

    #[test]
    fn optional_counter_absent_when_never_reported() {
        let metrics = StatDatabaseTotals::from_rows([
            Ok(row(10, None)),
            Ok(row(20, None)),
            Ok(row(5, None)),
        ])
        .into_metrics();
        assert_eq!(metrics["xact_commit"], 35.0);
        assert!(!metrics.contains_key("deadlocks"));
        assert!(!metrics.contains_key("temp_bytes"));
        assert!(!metrics.contains_key("blk_read_time"));
        assert!(!metrics.contains_key("blk_write_time"));
    }

    #[test]
    fn timing_counters_sum_as_float() {
        let rows = [
            StatDatabaseRow {
                blk_read_time: Some(1.5),
                blk_write_time: Some(0.25),
                ..Default::default()
            },
            StatDatabaseRow {
                blk_read_time: Some(2.0),
                ..Default::default()
            },
        ];
        let metrics = StatDatabaseTotals::from_rows(rows.into_iter().map(Ok)).into_metrics();
        assert_eq!(metrics["blk_read_time"], 3.5);
        assert_eq!(metrics["blk_write_time"], 0.25);
    }

    #[test]
    fn scan_failures_are_skipped() {
        let totals = StatDatabaseTotals::from_rows([
            Ok(row(10, None)),
            Err(PgCollectError::RowScan("bad row".to_string())),
            Ok(row(5, None)),
        ]);
        assert_eq!(totals.xact_commit, 15);
    }

    #[test]
    fn empty_view_reports_zero_counters() {
        let metrics = StatDatabaseTotals::from_rows(Vec::new()).into_metrics();
        assert_eq!(metrics.len(), 9);
        assert!(metrics.values().all(|v| *v == 0.0));
    }

    #[test]
    fn fetch_propagates_query_error() {
        let mut source = MockPgSource::typical_instance().fail_query("pg_stat_database");
        assert!(matches!(
            fetch_stat_database(&mut source),
            Err(PgCollectError::Query(_))
        ));
    }
}

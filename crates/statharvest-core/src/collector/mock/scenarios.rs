//! Pre-built PostgreSQL instance scenarios for testing.

use super::source::MockPgSource;
use crate::collector::pg_collector::StatDatabaseRow;

impl MockPgSource {
    /// A current server with three databases and a handful of sessions.
    ///
    /// Commits are 10, 20 and 5; one database has no deadlock count.
    pub fn typical_instance() -> Self {
        let mut source = Self::new().with_version(
            "PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 12.2.0, 64-bit",
        );

        source.add_stat_database(StatDatabaseRow {
            xact_commit: 10,
            xact_rollback: 1,
            blks_read: 100,
            blks_hit: 900,
            blk_read_time: Some(1.25),
            blk_write_time: Some(0.5),
            tup_returned: 1000,
            tup_fetched: 500,
            tup_inserted: 10,
            tup_updated: 5,
            tup_deleted: 1,
            deadlocks: Some(2),
            temp_bytes: Some(4096),
        });
        source.add_stat_database(StatDatabaseRow {
            xact_commit: 20,
            xact_rollback: 0,
            blks_read: 50,
            blks_hit: 450,
            blk_read_time: Some(0.75),
            blk_write_time: Some(0.0),
            tup_returned: 300,
            tup_fetched: 100,
            tup_inserted: 3,
            tup_updated: 2,
            tup_deleted: 0,
            deadlocks: None,
            temp_bytes: Some(0),
        });
        source.add_stat_database(StatDatabaseRow {
            xact_commit: 5,
            xact_rollback: 2,
            blks_read: 7,
            blks_hit: 93,
            blk_read_time: None,
            blk_write_time: None,
            tup_returned: 42,
            tup_fetched: 21,
            tup_inserted: 0,
            tup_updated: 0,
            tup_deleted: 0,
            deadlocks: Some(1),
            temp_bytes: None,
        });

        source.add_connection_state(4.0, "active", false);
        source.add_connection_state(1.0, "active", true);
        source.add_connection_state(12.0, "idle", false);
        source.add_connection_state(2.0, "idle in transaction", false);

        source.add_database_size(123_456_789.0);
        source
    }

    /// A 9.1 server: no timing, deadlock or temp file columns, legacy `waiting`.
    pub fn legacy_instance() -> Self {
        let mut source = Self::new().with_version(
            "PostgreSQL 9.1.24 on x86_64-unknown-linux-gnu, compiled by gcc (GCC) 4.4.7, 64-bit",
        );

        for (commit, rollback) in [(120, 3), (80, 1)] {
            source.add_stat_database(StatDatabaseRow {
                xact_commit: commit,
                xact_rollback: rollback,
                ..Default::default()
            });
        }

        source.add_connection_state(3.0, "active", false);
        source.add_connection_state(2.0, "active", true);
        source.add_connection_state(5.0, "idle", false);

        source.add_database_size(6_815_744.0);
        source
    }

    /// A server where some rows fail to decode.
    pub fn with_bad_rows() -> Self {
        let mut source = Self::typical_instance();
        source.add_bad_stat_database_row("error deserializing column 1");
        source.add_bad_connection_state_row("unexpected NULL in column state");
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::pg_collector::collect_metrics;

    #[test]
    fn typical_instance_totals() {
        let metrics = collect_metrics(&mut MockPgSource::typical_instance()).unwrap();
        assert_eq!(metrics["xact_commit"], 35.0);
        assert_eq!(metrics["xact_rollback"], 3.0);
        assert_eq!(metrics["blks_hit"], 1443.0);
        assert_eq!(metrics["blk_read_time"], 2.0);
        assert_eq!(metrics["temp_bytes"], 4096.0);
        assert_eq!(metrics["idle"], 12.0);
    }

    #[test]
    fn bad_rows_do_not_change_totals() {
        let good = collect_metrics(&mut MockPgSource::typical_instance()).unwrap();
        let partial = collect_metrics(&mut MockPgSource::with_bad_rows()).unwrap();
        assert_eq!(good, partial);
    }

    #[test]
    fn legacy_instance_totals() {
        let metrics = collect_metrics(&mut MockPgSource::legacy_instance()).unwrap();
        assert_eq!(metrics["xact_commit"], 200.0);
        assert_eq!(metrics["active"], 3.0);
        assert_eq!(metrics["idle_in_transaction"], 0.0);
    }
}

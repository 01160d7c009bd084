//! pg_stat_activity aggregation into connection-state buckets.

use std::sync::LazyLock;

use postgres::Row;
use regex::Regex;
use tracing::{error, warn};

use super::PgCollectError;
use super::queries::select_connections_query;
use super::source::PgSource;
use super::version::Version;
use crate::metrics::MetricMap;

/// Runs of characters that are not allowed in a metric key.
static NON_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("state regex is valid"));

/// State keys always reported, even with no matching connections.
pub const SEEDED_STATES: [&str; 5] = [
    "active",
    "active_waiting",
    "idle",
    "idle_in_transaction",
    "idle_in_transaction_aborted",
];

/// One `(count, state, waiting)` group.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStateRow {
    pub count: f64,
    pub state: String,
    pub waiting: bool,
}

impl ConnectionStateRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            count: row.try_get(0)?,
            state: row.try_get(1)?,
            waiting: row.try_get(2)?,
        })
    }
}

/// Turns a free-text state label into a metric key.
///
/// `"idle in transaction (aborted)"` becomes `"idle_in_transaction_aborted"`;
/// a waiting connection gets a `_waiting` suffix.
pub fn normalize_state(state: &str, waiting: bool) -> String {
    let replaced = NON_KEY_CHARS.replace_all(state, "_");
    let mut key = replaced.trim_end_matches('_').to_string();
    if waiting {
        key.push_str("_waiting");
    }
    key
}

fn seeded_buckets() -> MetricMap {
    SEEDED_STATES
        .iter()
        .map(|state| (state.to_string(), 0.0))
        .collect()
}

/// Builds state buckets from scanned rows. Each row is already a distinct
/// group, so its count replaces the bucket value.
pub fn fold_connection_states<I>(rows: I) -> MetricMap
where
    I: IntoIterator<Item = Result<ConnectionStateRow, PgCollectError>>,
{
    let mut stat = seeded_buckets();
    for row in rows {
        match row {
            Ok(row) => {
                stat.insert(normalize_state(&row.state, row.waiting), row.count);
            }
            Err(e) => warn!(error = %e, "failed to scan pg_stat_activity row, skipping"),
        }
    }
    stat
}

/// Counts connections per state using the query matching `version`.
pub fn fetch_connections<S: PgSource>(
    source: &mut S,
    version: Version,
) -> Result<MetricMap, PgCollectError> {
    let query = select_connections_query(version);
    let rows = source
        .query_connection_states(query)
        .inspect_err(|e| error!(error = %e, "failed to select pg_stat_activity"))?;
    Ok(fold_connection_states(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(count: f64, state: &str, waiting: bool) -> Result<ConnectionStateRow, PgCollectError> {
        Ok(ConnectionStateRow {
            count,
            state: state.to_string(),
            waiting,
        })
    }

    #[test]
    fn normalize_plain_labels() {
        assert_eq!(normalize_state("idle in transaction", false), "idle_in_transaction");
        assert_eq!(normalize_state("active", true), "active_waiting");
        assert_eq!(normalize_state("idle", false), "idle");
    }

    #[test]
    fn normalize_punctuation() {
        assert_eq!(normalize_state("idle (aborted)", false), "idle_aborted");
        assert_eq!(
            normalize_state("idle in transaction (aborted)", false),
            "idle_in_transaction_aborted"
        );
        assert_eq!(
            normalize_state("fastpath function call", false),
            "fastpath_function_call"
        );
    }

    #[test]
    fn normalize_keeps_dash_and_underscore() {
        assert_eq!(normalize_state("a-b_c", false), "a-b_c");
    }

    #[test]
    fn normalize_is_total() {
        assert_eq!(normalize_state("", false), "");
        assert_eq!(normalize_state("", true), "_waiting");
        assert_eq!(normalize_state("()", false), "");
        assert_eq!(normalize_state("état 😀", false), "_tat");
    }

    #[test]
    fn zero_rows_emit_seeded_keys() {
        let stat = fold_connection_states(Vec::new());
        assert_eq!(stat.len(), SEEDED_STATES.len());
        for state in SEEDED_STATES {
            assert_eq!(stat[state], 0.0, "{state}");
        }
    }

    #[test]
    fn rows_overwrite_buckets() {
        let stat = fold_connection_states([
            group(3.0, "active", false),
            group(1.0, "active", true),
            group(7.0, "idle", false),
            group(2.0, "idle in transaction (aborted)", false),
        ]);
        assert_eq!(stat["active"], 3.0);
        assert_eq!(stat["active_waiting"], 1.0);
        assert_eq!(stat["idle"], 7.0);
        assert_eq!(stat["idle_in_transaction"], 0.0);
        assert_eq!(stat["idle_in_transaction_aborted"], 2.0);
    }

    #[test]
    fn unknown_states_added_dynamically() {
        let stat = fold_connection_states([
            group(1.0, "disabled", false),
            group(2.0, "idle in transaction", true),
        ]);
        assert_eq!(stat["disabled"], 1.0);
        assert_eq!(stat["idle_in_transaction_waiting"], 2.0);
        assert_eq!(stat.len(), SEEDED_STATES.len() + 2);
    }

    #[test]
    fn scan_failures_are_skipped() {
        let stat = fold_connection_states([
            Err(PgCollectError::RowScan("null state".to_string())),
            group(4.0, "active", false),
        ]);
        assert_eq!(stat["active"], 4.0);
        assert_eq!(stat.len(), SEEDED_STATES.len());
    }
}

//! PostgreSQL plugin.

use tracing::error;

use super::{GraphDeclaration, MetricsPlugin, PluginError, Unit, graph, title_case};
use crate::collector::{ClientSource, PostgresConfig, collect_metrics};
use crate::metrics::MetricMap;

pub struct PostgresPlugin {
    config: PostgresConfig,
    prefix: String,
}

impl PostgresPlugin {
    pub const DEFAULT_PREFIX: &'static str = "postgres";

    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config,
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    /// Sets the metric key prefix. An empty prefix keeps the default.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.prefix = prefix;
        }
        self
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

impl MetricsPlugin for PostgresPlugin {
    fn metric_key_prefix(&self) -> &str {
        &self.prefix
    }

    /// Opens one connection, runs the statistics pipeline and closes the
    /// connection whether or not the pipeline succeeded.
    fn fetch_metrics(&self) -> Result<MetricMap, PluginError> {
        let mut source = ClientSource::connect(&self.config)
            .inspect_err(|e| error!(error = %e, "failed to connect to PostgreSQL"))?;
        let result = collect_metrics(&mut source);
        source.close();
        Ok(result?)
    }

    fn graph_definition(&self) -> GraphDeclaration {
        let label_prefix = title_case(&self.prefix);

        GraphDeclaration::from([
            (
                "connections".to_string(),
                graph(
                    format!("{label_prefix} Connections"),
                    Unit::Integer,
                    &[
                        ("active", "Active", false, true),
                        ("active_waiting", "Active waiting", false, true),
                        ("idle", "Idle", false, true),
                        ("idle_in_transaction", "Idle in transaction", false, true),
                        (
                            "idle_in_transaction_aborted",
                            "Idle in transaction (aborted)",
                            false,
                            true,
                        ),
                        ("fastpath_function_call", "fast-path function call", false, true),
                        ("disabled", "Disabled", false, true),
                    ],
                ),
            ),
            (
                "commits".to_string(),
                graph(
                    format!("{label_prefix} Commits"),
                    Unit::Integer,
                    &[
                        ("xact_commit", "Xact Commit", true, false),
                        ("xact_rollback", "Xact Rollback", true, false),
                    ],
                ),
            ),
            (
                "blocks".to_string(),
                graph(
                    format!("{label_prefix} Blocks"),
                    Unit::Integer,
                    &[
                        ("blks_read", "Blocks Read", true, false),
                        ("blks_hit", "Blocks Hit", true, false),
                    ],
                ),
            ),
            (
                "rows".to_string(),
                graph(
                    format!("{label_prefix} Rows"),
                    Unit::Integer,
                    &[
                        ("tup_returned", "Returned Rows", true, false),
                        ("tup_fetched", "Fetched Rows", true, true),
                        ("tup_inserted", "Inserted Rows", true, true),
                        ("tup_updated", "Updated Rows", true, true),
                        ("tup_deleted", "Deleted Rows", true, true),
                    ],
                ),
            ),
            (
                "size".to_string(),
                graph(
                    format!("{label_prefix} Data Size"),
                    Unit::Integer,
                    &[("total_size", "Total Size", false, false)],
                ),
            ),
            (
                "deadlocks".to_string(),
                graph(
                    format!("{label_prefix} Dead Locks"),
                    Unit::Integer,
                    &[("deadlocks", "Deadlocks", true, false)],
                ),
            ),
            (
                "iotime".to_string(),
                graph(
                    format!("{label_prefix} Block I/O time"),
                    Unit::Float,
                    &[
                        ("blk_read_time", "Block Read Time (ms)", true, false),
                        ("blk_write_time", "Block Write Time (ms)", true, false),
                    ],
                ),
            ),
            (
                "tempfile".to_string(),
                graph(
                    format!("{label_prefix} Temporary file"),
                    Unit::Integer,
                    &[("temp_bytes", "Temporary file size (byte)", true, false)],
                ),
            ),
        ])
    }
}

//! Plugin runner speaking the mackerel-agent plugin protocol.
//!
//! Two modes:
//! - values: one `name\tvalue\tepoch` line per metric; `diff` metrics are
//!   reported as per-minute rates against the previous run
//! - meta: a `# mackerel-agent-plugin` header followed by the graph
//!   definitions as JSON

mod state;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::metrics::MetricMap;
use crate::plugin::{Graph, GraphDeclaration, MetricsPlugin, PluginError};

pub use state::PreviousValues;

/// Header line that marks graph-definition output.
pub const META_HEADER: &str = "# mackerel-agent-plugin";

/// Environment variable set by the agent when it asks for graph definitions.
pub const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

/// Samples further apart than this are not used for rates.
const MAX_RATE_INTERVAL_SECS: i64 = 600;

/// Error type for a runner invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("output: {0}")]
    Io(#[from] io::Error),
    #[error("graph definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// One formatted output line.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: String,
    pub value: f64,
    pub epoch: i64,
}

impl std::fmt::Display for MetricLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.value, self.epoch)
    }
}

/// Per-minute rate of a counter, or `None` when it cannot be computed.
pub fn counter_rate(current: f64, previous: f64, elapsed_secs: i64) -> Option<f64> {
    if elapsed_secs <= 0 || elapsed_secs > MAX_RATE_INTERVAL_SECS {
        return None;
    }
    // Counter went backwards: server restart or stats reset.
    if current < previous {
        return None;
    }
    Some((current - previous) * 60.0 / elapsed_secs as f64)
}

/// Lays out metric lines in graph order. Metrics missing from `metrics` are
/// skipped; `diff` metrics are skipped until a usable previous value exists.
pub fn format_values(
    prefix: &str,
    graphs: &GraphDeclaration,
    metrics: &MetricMap,
    previous: Option<&PreviousValues>,
    now: DateTime<Utc>,
) -> Vec<MetricLine> {
    let epoch = now.timestamp();
    let mut lines = Vec::new();

    for (graph_key, graph) in graphs {
        for def in &graph.metrics {
            let Some(&current) = metrics.get(&def.name) else {
                continue;
            };
            let value = if def.diff {
                let rate = previous.and_then(|prev| {
                    let last = prev.values.get(&def.name)?;
                    counter_rate(current, *last, prev.elapsed_secs(now))
                });
                match rate {
                    Some(rate) => rate,
                    None => {
                        debug!(metric = %def.name, "no usable previous value, skipping rate");
                        continue;
                    }
                }
            } else {
                current
            };

            lines.push(MetricLine {
                name: format!("{}.{}.{}", prefix, graph_key, def.name),
                value,
                epoch,
            });
        }
    }

    lines
}

/// Graph definitions keyed by `<prefix>.<graph>`, as the agent expects them.
pub fn definitions_json(prefix: &str, graphs: &GraphDeclaration) -> serde_json::Value {
    let keyed: BTreeMap<String, &Graph> = graphs
        .iter()
        .map(|(key, graph)| (format!("{}.{}", prefix, key), graph))
        .collect();
    json!({ "graphs": keyed })
}

/// Default state file for a prefix, under the system temp directory.
pub fn default_tempfile(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("statharvest-{}", prefix))
}

/// Drives one plugin invocation.
pub struct Runner<P> {
    plugin: P,
    tempfile: PathBuf,
}

impl<P: MetricsPlugin> Runner<P> {
    pub fn new(plugin: P) -> Self {
        let tempfile = default_tempfile(plugin.metric_key_prefix());
        Self { plugin, tempfile }
    }

    /// Overrides the state file location.
    pub fn with_tempfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.tempfile = path.into();
        self
    }

    pub fn tempfile(&self) -> &Path {
        &self.tempfile
    }

    /// Fetches metrics and writes value lines for the current time.
    pub fn output_values<W: Write>(&self, out: &mut W) -> Result<usize, RunnerError> {
        self.output_values_at(out, Utc::now())
    }

    /// Fetches metrics, writes value lines and stores the raw values for the
    /// next run. Returns the number of lines written.
    pub fn output_values_at<W: Write>(
        &self,
        out: &mut W,
        now: DateTime<Utc>,
    ) -> Result<usize, RunnerError> {
        let metrics = self.plugin.fetch_metrics()?;
        let previous = PreviousValues::load(&self.tempfile);
        let lines = format_values(
            self.plugin.metric_key_prefix(),
            &self.plugin.graph_definition(),
            &metrics,
            previous.as_ref(),
            now,
        );

        for line in &lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;

        PreviousValues::new(metrics, now).save(&self.tempfile)?;
        info!(
            lines = lines.len(),
            tempfile = %self.tempfile.display(),
            "metrics written"
        );
        Ok(lines.len())
    }

    /// Writes the meta header and graph definitions.
    pub fn output_definitions<W: Write>(&self, out: &mut W) -> Result<(), RunnerError> {
        let defs = definitions_json(
            self.plugin.metric_key_prefix(),
            &self.plugin.graph_definition(),
        );
        writeln!(out, "{}", META_HEADER)?;
        serde_json::to_writer(&mut *out, &defs)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

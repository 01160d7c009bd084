//! Plugin contract consumed by the runner.
//!
//! A plugin exposes two things: the metric values of one fetch cycle and a
//! static declaration of how those metrics group into graphs.

mod memcached;
mod pg;
mod varnish;

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::collector::{MemcachedError, PgCollectError, VarnishError};
use crate::metrics::MetricMap;

pub use memcached::MemcachedPlugin;
pub use pg::PostgresPlugin;
pub use varnish::VarnishPlugin;

/// Error type for a fetch cycle.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Postgres(#[from] PgCollectError),
    #[error(transparent)]
    Memcached(#[from] MemcachedError),
    #[error(transparent)]
    Varnish(#[from] VarnishError),
}

/// Display unit of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Integer,
    Float,
    Bytes,
    Percentage,
}

/// One series of a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDef {
    pub name: String,
    pub label: String,
    /// The runner reports this metric as a per-minute rate.
    #[serde(skip)]
    pub diff: bool,
    pub stacked: bool,
}

impl MetricDef {
    pub fn new(name: &str, label: &str, diff: bool, stacked: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            diff,
            stacked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub label: String,
    pub unit: Unit,
    pub metrics: Vec<MetricDef>,
}

/// Graph key (without prefix) → graph.
pub type GraphDeclaration = BTreeMap<String, Graph>;

/// Contract between a service adapter and the runner.
pub trait MetricsPlugin {
    /// First component of every emitted metric name.
    fn metric_key_prefix(&self) -> &str;

    /// Runs one fetch cycle and returns absolute values.
    fn fetch_metrics(&self) -> Result<MetricMap, PluginError>;

    /// Static graph layout. Never depends on the connected server.
    fn graph_definition(&self) -> GraphDeclaration;
}

/// Capitalizes the first letter of each word: `"postgres"` → `"Postgres"`.
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

/// Builds a graph from `(name, label, diff, stacked)` tuples.
pub(crate) fn graph(label: String, unit: Unit, metrics: &[(&str, &str, bool, bool)]) -> Graph {
    Graph {
        label,
        unit,
        metrics: metrics
            .iter()
            .map(|(name, label, diff, stacked)| MetricDef::new(name, label, *diff, *stacked))
            .collect(),
    }
}

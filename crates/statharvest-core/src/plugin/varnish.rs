//! Varnish plugin.

use std::path::PathBuf;

use super::{GraphDeclaration, MetricsPlugin, PluginError, Unit, graph, title_case};
use crate::collector::varnish::fetch_stats;
use crate::metrics::MetricMap;

pub struct VarnishPlugin {
    varnishstat: PathBuf,
    prefix: String,
}

impl VarnishPlugin {
    pub const DEFAULT_PREFIX: &'static str = "varnish";

    pub fn new(varnishstat: impl Into<PathBuf>) -> Self {
        Self {
            varnishstat: varnishstat.into(),
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
}

impl MetricsPlugin for VarnishPlugin {
    fn metric_key_prefix(&self) -> &str {
        &self.prefix
    }

    fn fetch_metrics(&self) -> Result<MetricMap, PluginError> {
        Ok(fetch_stats(&self.varnishstat)?)
    }

    fn graph_definition(&self) -> GraphDeclaration {
        GraphDeclaration::from([(
            "requests".to_string(),
            graph(
                format!("{} Client Requests", title_case(&self.prefix)),
                Unit::Integer,
                &[
                    ("requests", "Requests", true, false),
                    ("cache_hits", "Hits", true, false),
                ],
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_requests_graph() {
        let graphs = VarnishPlugin::new("/usr/bin/varnishstat").graph_definition();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs["requests"].label, "Varnish Client Requests");
        assert!(graphs["requests"].metrics.iter().all(|m| m.diff));
    }

    #[test]
    fn fetch_fails_without_varnishstat() {
        let err = VarnishPlugin::new("/nonexistent/varnishstat")
            .fetch_metrics()
            .unwrap_err();
        assert!(matches!(err, PluginError::Varnish(_)));
    }
}

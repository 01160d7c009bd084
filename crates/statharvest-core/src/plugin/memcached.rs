//! memcached plugin.

use std::time::Duration;

use super::{GraphDeclaration, MetricsPlugin, PluginError, Unit, graph, title_case};
use crate::collector::MemcachedTarget;
use crate::collector::memcached::fetch_stats;
use crate::metrics::MetricMap;

pub struct MemcachedPlugin {
    target: MemcachedTarget,
    prefix: String,
    timeout: Duration,
}

impl MemcachedPlugin {
    pub const DEFAULT_PREFIX: &'static str = "memcached";

    pub fn new(target: MemcachedTarget) -> Self {
        Self {
            target,
            prefix: Self::DEFAULT_PREFIX.to_string(),
            timeout: Duration::from_secs(5),
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

    /// Read/write timeout on the stats connection.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl MetricsPlugin for MemcachedPlugin {
    fn metric_key_prefix(&self) -> &str {
        &self.prefix
    }

    fn fetch_metrics(&self) -> Result<MetricMap, PluginError> {
        Ok(fetch_stats(&self.target, self.timeout)?)
    }

    fn graph_definition(&self) -> GraphDeclaration {
        let p = title_case(&self.prefix);

        // https://github.com/memcached/memcached/blob/master/doc/protocol.txt
        GraphDeclaration::from([
            (
                "connections".to_string(),
                graph(
                    format!("{p} Connections"),
                    Unit::Integer,
                    &[("curr_connections", "Connections", false, false)],
                ),
            ),
            (
                "cmd".to_string(),
                graph(
                    format!("{p} Command"),
                    Unit::Integer,
                    &[
                        ("cmd_get", "Get", true, false),
                        ("cmd_set", "Set", true, false),
                        ("cmd_flush", "Flush", true, false),
                        ("cmd_touch", "Touch", true, false),
                    ],
                ),
            ),
            (
                "hitmiss".to_string(),
                graph(
                    format!("{p} Hits/Misses"),
                    Unit::Integer,
                    &[
                        ("get_hits", "Get Hits", true, false),
                        ("get_misses", "Get Misses", true, false),
                        ("delete_hits", "Delete Hits", true, false),
                        ("delete_misses", "Delete Misses", true, false),
                        ("incr_hits", "Incr Hits", true, false),
                        ("incr_misses", "Incr Misses", true, false),
                        ("cas_hits", "Cas Hits", true, false),
                        ("cas_misses", "Cas Misses", true, false),
                        ("touch_hits", "Touch Hits", true, false),
                        ("touch_misses", "Touch Misses", true, false),
                    ],
                ),
            ),
            (
                "evictions".to_string(),
                graph(
                    format!("{p} Evictions"),
                    Unit::Integer,
                    &[("evictions", "Evictions", true, false)],
                ),
            ),
            (
                "unfetched".to_string(),
                graph(
                    format!("{p} Unfetched"),
                    Unit::Integer,
                    &[
                        ("expired_unfetched", "Expired unfetched", true, false),
                        ("evicted_unfetched", "Evicted unfetched", true, false),
                    ],
                ),
            ),
            (
                "rusage".to_string(),
                graph(
                    format!("{p} Resource Usage"),
                    Unit::Float,
                    &[
                        ("rusage_user", "User", true, false),
                        ("rusage_system", "System", true, false),
                    ],
                ),
            ),
            (
                "bytes".to_string(),
                graph(
                    format!("{p} Traffics"),
                    Unit::Bytes,
                    &[
                        ("bytes_read", "Read", true, false),
                        ("bytes_written", "Write", true, false),
                    ],
                ),
            ),
            (
                "cachesize".to_string(),
                graph(
                    format!("{p} Cache Size"),
                    Unit::Bytes,
                    &[
                        ("limit_maxbytes", "Total", false, false),
                        ("bytes", "Used", false, false),
                    ],
                ),
            ),
            (
                "items".to_string(),
                graph(
                    format!("{p} Items"),
                    Unit::Integer,
                    &[
                        ("curr_items", "Current Items", false, false),
                        ("new_items", "New Items", true, false),
                    ],
                ),
            ),
        ])
    }
}

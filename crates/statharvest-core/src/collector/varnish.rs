//! varnishstat collector.

use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::metrics::MetricMap;

static COUNTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^ ]+) +(\d+)").expect("varnishstat regex is valid"));

/// Error type for varnish collection.
#[derive(Debug, Error)]
pub enum VarnishError {
    #[error("varnish: failed to run {path}: {source}")]
    Spawn { path: String, source: io::Error },
    #[error("varnish: {path} exited with {status}: {stderr}")]
    Failed {
        path: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Runs `<varnishstat> -1` and extracts the request counters.
pub fn fetch_stats(varnishstat: &Path) -> Result<MetricMap, VarnishError> {
    let path = varnishstat.display().to_string();
    debug!(%path, "running varnishstat");

    let output = Command::new(varnishstat)
        .arg("-1")
        .output()
        .map_err(|source| VarnishError::Spawn {
            path: path.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(VarnishError::Failed {
            path,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_stats(&String::from_utf8_lossy(&output.stdout)))
}

/// Maps varnishstat counters onto metric keys. Counter names are accepted
/// with or without the `MAIN.` prefix used since Varnish 4.
pub fn parse_stats(output: &str) -> MetricMap {
    let mut stat = MetricMap::new();
    for line in output.lines() {
        let Some(caps) = COUNTER_LINE.captures(line) else {
            continue;
        };
        let key = match &caps[1] {
            "client_req" | "MAIN.client_req" => "requests",
            "cache_hit" | "MAIN.cache_hit" => "cache_hits",
            _ => continue,
        };
        if let Ok(value) = caps[2].parse::<f64>() {
            stat.insert(key.to_string(), value);
        }
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_varnish4_counters() {
        let out = "\
MGT.uptime              12345         1.00 Management process uptime
MAIN.client_req         98765         8.00 Good client requests received
MAIN.cache_hit          54321         4.40 Cache hits
MAIN.cache_miss          1111         0.09 Cache misses
";
        let stat = parse_stats(out);
        assert_eq!(stat["requests"], 98765.0);
        assert_eq!(stat["cache_hits"], 54321.0);
        assert_eq!(stat.len(), 2);
    }

    #[test]
    fn parses_varnish3_counters() {
        let out = "client_req 100 1.00 Client requests received\ncache_hit 60 0.60 Cache hits\n";
        let stat = parse_stats(out);
        assert_eq!(stat["requests"], 100.0);
        assert_eq!(stat["cache_hits"], 60.0);
    }

    #[test]
    fn ignores_unrelated_and_malformed_lines() {
        let stat = parse_stats("\nMAIN.client_req  n/a\n  leading space 5\n");
        assert!(stat.is_empty());
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let err = fetch_stats(Path::new("/nonexistent/varnishstat-12345")).unwrap_err();
        assert!(matches!(err, VarnishError::Spawn { .. }));
    }
}

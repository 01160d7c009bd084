//! memcached `stats` collector.
//!
//! Sends `stats` over TCP or a Unix socket and reads `STAT <name> <value>`
//! lines until `END`.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::metrics::MetricMap;

/// Error type for memcached collection.
#[derive(Debug, Error)]
pub enum MemcachedError {
    #[error("memcached: {0}")]
    Io(#[from] io::Error),
    /// The server closed the stream before sending `END`.
    #[error("memcached: stats response ended before END")]
    Truncated,
    #[error("memcached: unix sockets are not supported on this platform")]
    UnsupportedSocket,
}

/// Where the memcached server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemcachedTarget {
    /// `host:port`
    Tcp(String),
    Unix(PathBuf),
}

impl std::fmt::Display for MemcachedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemcachedTarget::Tcp(addr) => write!(f, "tcp://{}", addr),
            MemcachedTarget::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Connects to `target`, issues `stats` and parses the reply.
pub fn fetch_stats(target: &MemcachedTarget, timeout: Duration) -> Result<MetricMap, MemcachedError> {
    debug!(%target, "querying memcached stats");
    match target {
        MemcachedTarget::Tcp(addr) => {
            let stream = TcpStream::connect(addr)?;
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
            query_stats(stream)
        }
        #[cfg(unix)]
        MemcachedTarget::Unix(path) => {
            let stream = UnixStream::connect(path)?;
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
            query_stats(stream)
        }
        #[cfg(not(unix))]
        MemcachedTarget::Unix(_) => Err(MemcachedError::UnsupportedSocket),
    }
}

fn query_stats<S: io::Read + Write>(mut stream: S) -> Result<MetricMap, MemcachedError> {
    stream.write_all(b"stats\r\n")?;
    stream.flush()?;
    parse_stats(BufReader::new(stream))
}

/// Parses a `stats` reply. Values that are not numbers (`version`,
/// `libevent`) are skipped. `new_items` mirrors `total_items` so the
/// runner can report it as a rate.
pub fn parse_stats<R: BufRead>(reader: R) -> Result<MetricMap, MemcachedError> {
    let mut stat = MetricMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line == "END" {
            if let Some(total) = stat.get("total_items").copied() {
                stat.insert("new_items".to_string(), total);
            }
            return Ok(stat);
        }

        let mut fields = line.split(' ');
        if fields.next() != Some("STAT") {
            continue;
        }
        let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
            trace!(line, "malformed STAT line");
            continue;
        };
        match value.parse::<f64>() {
            Ok(v) => {
                stat.insert(name.to_string(), v);
            }
            Err(_) => trace!(name, value, "skipping non-numeric stat"),
        }
    }

    Err(MemcachedError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::net::TcpListener;
    use std::thread;

    const STATS: &str = "STAT pid 2571\r\n\
STAT uptime 1234\r\n\
STAT version 1.6.21\r\n\
STAT libevent 2.1.12-stable\r\n\
STAT rusage_user 0.123456\r\n\
STAT curr_connections 10\r\n\
STAT cmd_get 42\r\n\
STAT get_hits 40\r\n\
STAT total_items 17\r\n\
END\r\n";

    #[test]
    fn parses_numeric_stats() {
        let stat = parse_stats(Cursor::new(STATS)).unwrap();
        assert_eq!(stat["curr_connections"], 10.0);
        assert_eq!(stat["cmd_get"], 42.0);
        assert_eq!(stat["rusage_user"], 0.123456);
    }

    #[test]
    fn skips_non_numeric_values() {
        let stat = parse_stats(Cursor::new(STATS)).unwrap();
        assert!(!stat.contains_key("version"));
        assert!(!stat.contains_key("libevent"));
    }

    #[test]
    fn new_items_mirrors_total_items() {
        let stat = parse_stats(Cursor::new(STATS)).unwrap();
        assert_eq!(stat["new_items"], 17.0);
    }

    #[test]
    fn new_items_absent_without_total_items() {
        let stat = parse_stats(Cursor::new("STAT curr_items 3\nEND\n")).unwrap();
        assert!(!stat.contains_key("new_items"));
        assert_eq!(stat["curr_items"], 3.0);
    }

    #[test]
    fn ignores_lines_after_end() {
        let stat = parse_stats(Cursor::new("STAT a 1\nEND\nSTAT b 2\n")).unwrap();
        assert!(!stat.contains_key("b"));
    }

    #[test]
    fn missing_end_is_truncated() {
        let err = parse_stats(Cursor::new("STAT a 1\r\n")).unwrap_err();
        assert!(matches!(err, MemcachedError::Truncated));
    }

    #[test]
    fn fetch_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 7];
            conn.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"stats\r\n");
            conn.write_all(STATS.as_bytes()).unwrap();
        });

        let stat = fetch_stats(
            &MemcachedTarget::Tcp(addr.to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        server.join().unwrap();
        assert_eq!(stat["get_hits"], 40.0);
    }

    #[test]
    fn target_display() {
        assert_eq!(
            MemcachedTarget::Tcp("localhost:11211".to_string()).to_string(),
            "tcp://localhost:11211"
        );
    }
}

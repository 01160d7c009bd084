//! Previous-value store for rate computation.
//!
//! Values from the last run are kept as JSON in a small state file. The file
//! is replaced atomically so a crash mid-write never leaves a torn file.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::metrics::MetricMap;

/// Metric values of the previous run and when they were taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousValues {
    /// Unix epoch seconds.
    pub last_time: i64,
    pub values: MetricMap,
}

impl PreviousValues {
    pub fn new(values: MetricMap, taken_at: DateTime<Utc>) -> Self {
        Self {
            last_time: taken_at.timestamp(),
            values,
        }
    }

    /// Loads the state file. A missing or unreadable file means "no history".
    pub fn load(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no previous values");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read previous values");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt previous values");
                None
            }
        }
    }

    /// Writes the state file via a temporary file in the same directory.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Seconds elapsed between the stored sample and `now`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.last_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample() -> PreviousValues {
        let values = MetricMap::from([("xact_commit".to_string(), 35.0)]);
        PreviousValues::new(values, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statharvest-postgres");
        sample().save(&path).unwrap();
        assert_eq!(PreviousValues::load(&path), Some(sample()));
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        fs::write(&path, "old contents").unwrap();
        sample().save(&path).unwrap();
        assert_eq!(PreviousValues::load(&path), Some(sample()));
    }

    #[test]
    fn missing_file_is_no_history() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PreviousValues::load(&dir.path().join("absent")), None);
    }

    #[test]
    fn corrupt_file_is_no_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(PreviousValues::load(&path), None);
    }

    #[test]
    fn elapsed_seconds() {
        let now = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        assert_eq!(sample().elapsed_secs(now), 60);
    }
}

//! Server version detection from `select version()`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, error};

use super::PgCollectError;
use super::queries::VERSION_QUERY;
use super::source::PgSource;

/// Matches `PostgreSQL 9.6.24 on x86_64...` and `PostgreSQL 16.2 on ...`.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PostgreSQL (\d+)\.(\d+)(\.(\d+))? ").expect("version regex is valid")
});

/// Three-part server version. `patch` is 0 for two-part versions (10+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Version {
    /// Extracts the version from the text returned by `version()`.
    pub fn parse(version_str: &str) -> Result<Self, PgCollectError> {
        let caps = VERSION_RE.captures(version_str).ok_or_else(|| {
            PgCollectError::VersionParse(format!("unrecognized version string: {version_str:?}"))
        })?;

        let number = |idx: usize| -> Result<u32, PgCollectError> {
            caps[idx].parse::<u32>().map_err(|e| {
                PgCollectError::VersionParse(format!("invalid number {:?}: {}", &caps[idx], e))
            })
        };

        let major = number(1)?;
        let minor = number(2)?;
        let patch = match caps.get(4) {
            Some(_) => number(4)?,
            None => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Runs `select version()` and parses the first row.
pub fn detect_version<S: PgSource>(source: &mut S) -> Result<Version, PgCollectError> {
    let version_str = source
        .query_version()
        .inspect_err(|e| error!(error = %e, "failed to select version()"))?
        .ok_or_else(|| PgCollectError::VersionParse(format!("no rows from {VERSION_QUERY}")))?;

    let version = Version::parse(&version_str)?;
    debug!(%version, "detected server version");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockPgSource;

    #[test]
    fn parse_three_part_version() {
        let v = Version::parse(
            "PostgreSQL 9.6.24 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 4.8.5, 64-bit",
        )
        .unwrap();
        assert_eq!(
            v,
            Version {
                major: 9,
                minor: 6,
                patch: 24
            }
        );
    }

    #[test]
    fn parse_two_part_version_defaults_patch() {
        let v = Version::parse("PostgreSQL 16.2 on aarch64-unknown-linux-gnu").unwrap();
        assert_eq!(
            v,
            Version {
                major: 16,
                minor: 2,
                patch: 0
            }
        );
    }

    #[test]
    fn parse_requires_trailing_space() {
        assert!(Version::parse("PostgreSQL 16.2").is_err());
    }

    #[test]
    fn parse_rejects_unknown_product() {
        let err = Version::parse("MySQL 8.0.36 ").unwrap_err();
        assert!(matches!(err, PgCollectError::VersionParse(_)));
    }

    #[test]
    fn parse_rejects_prerelease() {
        assert!(Version::parse("PostgreSQL 17beta1 on x86_64").is_err());
    }

    #[test]
    fn parse_rejects_overflowing_number() {
        let err = Version::parse("PostgreSQL 99999999999.1 on x86_64").unwrap_err();
        assert!(matches!(err, PgCollectError::VersionParse(_)));
    }

    #[test]
    fn parse_malformed_patch_is_not_guessed() {
        assert!(Version::parse("PostgreSQL 9.6.x on linux").is_err());
        let v = Version::parse("PostgreSQL 10.1 (Debian 10.1-1)").unwrap();
        assert_eq!(v.patch, 0);
    }

    #[test]
    fn version_ordering() {
        let a = Version::parse("PostgreSQL 9.5.3 on x").unwrap();
        let b = Version::parse("PostgreSQL 9.6.0 on x").unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "9.6.0");
    }

    #[test]
    fn detect_fails_without_rows() {
        let mut source = MockPgSource::new();
        let err = detect_version(&mut source).unwrap_err();
        assert!(matches!(err, PgCollectError::VersionParse(_)));
    }

    #[test]
    fn detect_propagates_query_error() {
        let mut source = MockPgSource::new().fail_query(VERSION_QUERY);
        let err = detect_version(&mut source).unwrap_err();
        assert!(matches!(err, PgCollectError::Query(_)));
    }

    #[test]
    fn detect_reads_version_row() {
        let mut source = MockPgSource::new().with_version("PostgreSQL 12.18 on x86_64");
        let v = detect_version(&mut source).unwrap();
        assert_eq!((v.major, v.minor, v.patch), (12, 18, 0));
    }
}

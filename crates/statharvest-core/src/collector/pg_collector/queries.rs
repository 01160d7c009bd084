//! SQL text for the PostgreSQL statistics views.

use super::version::Version;

pub(crate) const VERSION_QUERY: &str = "select version()";

/// Every column of `pg_stat_database`; the set differs between server versions,
/// so missing optional columns are resolved while scanning rows.
pub(crate) const STAT_DATABASE_QUERY: &str = "SELECT * FROM pg_stat_database";

/// 9.6+ replaced `pg_stat_activity.waiting` with `wait_event`.
pub(crate) const CONNECTIONS_QUERY: &str = "select count(*)::double precision, state, \
     wait_event is not null from pg_stat_activity group by state, wait_event is not null";

pub(crate) const CONNECTIONS_QUERY_LEGACY: &str = "select count(*)::double precision, state, \
     waiting from pg_stat_activity group by state, waiting";

pub(crate) const DATABASE_SIZE_QUERY: &str = "select sum(pg_database_size(datname))::double precision as dbsize \
     from pg_database where has_database_privilege(datname, 'connect')";

/// Server version that introduced `pg_stat_activity.wait_event`.
const WAIT_EVENT_SINCE: (u32, u32) = (9, 6);

/// Picks the pg_stat_activity query matching the server's schema.
pub fn select_connections_query(version: Version) -> &'static str {
    let (major, minor) = WAIT_EVENT_SINCE;
    if version.major > major || (version.major == major && version.minor >= minor) {
        CONNECTIONS_QUERY
    } else {
        CONNECTIONS_QUERY_LEGACY
    }
}

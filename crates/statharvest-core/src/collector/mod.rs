//! Statistics collectors for the services statharvest can watch.
//!
//! Each collector talks to one running service, reads its native statistics
//! and folds them into a flat [`MetricMap`](crate::metrics::MetricMap).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     PostgreSQL pipeline                      │
//! │                                                              │
//! │  version() ──► Version ──► select_connections_query          │
//! │                                     │                        │
//! │  pg_stat_database ──► totals        │                        │
//! │  pg_stat_activity ◄─────────────────┘──► state buckets       │
//! │  pg_database_size ──► total_size                             │
//! │                                                              │
//! │          merge (database, connections, size)                 │
//! │                            │                                 │
//! │                     ┌──────▼──────┐                          │
//! │                     │  PgSource   │ (trait)                  │
//! │                     └──────┬──────┘                          │
//! └────────────────────────────┼─────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │ ClientSource│ │ MockPgSource│ │  Scenarios  │
//!       │ (postgres)  │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! memcached and varnish are line-oriented text parsers following the same
//! fetch → parse → normalize shape.
//!
//! # Testing (with MockPgSource)
//!
//! ```
//! use statharvest_core::collector::{collect_metrics, MockPgSource};
//!
//! let mut source = MockPgSource::typical_instance();
//! let metrics = collect_metrics(&mut source).unwrap();
//! assert_eq!(metrics["xact_commit"], 35.0);
//! ```

pub mod memcached;
pub mod mock;
pub mod pg_collector;
pub mod varnish;

pub use memcached::{MemcachedError, MemcachedTarget};
pub use mock::MockPgSource;
pub use pg_collector::{
    ClientSource, PgCollectError, PgSource, PostgresConfig, SEEDED_STATES, SslMode, Version,
    collect_metrics,
};
pub use varnish::VarnishError;

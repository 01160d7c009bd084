//! statharvest-core — shared library for the statharvest plugin family.
//!
//! Provides:
//! - `collector` — per-service statistics collection (PostgreSQL, memcached, varnish)
//! - `metrics` — the flat metric map and its merge rule
//! - `plugin` — the plugin contract (metrics + graph definitions) and its adapters
//! - `runner` — value/meta output and the previous-value store

pub mod collector;
pub mod metrics;
pub mod plugin;
pub mod runner;

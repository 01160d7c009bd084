//! Mock statistics sources for testing.
//!
//! This module provides `MockPgSource` and pre-built scenarios for testing
//! the PostgreSQL pipeline without a running server.

mod scenarios;
mod source;

pub use source::MockPgSource;

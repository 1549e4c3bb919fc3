//! Infrastructure layer: everything that touches a socket, a file, or the
//! process environment on behalf of the application layer above it.

pub mod config;
pub mod ingestion;
pub mod journal;
pub mod observability;
#[cfg(feature = "read-api")]
pub mod read_api;
pub mod rule_store;

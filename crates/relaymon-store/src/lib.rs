//! PostgreSQL persistence gateway for relaymon
//!
//! This crate owns every statement the monitor issues against the shared
//! relational store. The `ConnectionStore` trait is the seam the tracker
//! and maintenance jobs are written (and tested) against; `PgStore` is the
//! production implementation.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ConnectionStore, DbSettings, PgStore};

// Re-export types used in our public API
pub use relaymon_types::{ConnectionId, UserId, UserLimit};

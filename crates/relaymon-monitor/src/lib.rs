//! Connection tracking and maintenance for relaymon
//!
//! This crate consumes the typed events produced by `relaymon-logs`,
//! maintains the in-memory view of open connections and cached per-user
//! limits, and keeps the persistent store consistent with what the logs
//! show. It also owns the periodic jobs: limit-cache refresh and the
//! retention sweep.

mod limits;
mod maintenance;
mod monitor;
mod tracker;

#[cfg(test)]
mod testutil;

pub use limits::LimitCache;
pub use maintenance::{MaintenanceSettings, run_limit_refresh, run_retention_sweep};
pub use monitor::{MonitorSettings, run};
pub use tracker::ConnectionTracker;

// Re-export types used in our public API
pub use relaymon_logs::SourceSettings;
pub use relaymon_types::LogEvent;

//! Log ingestion for relaymon
//!
//! This crate provides the line matchers that turn raw proxy-server log
//! lines into typed events, and the source reader that produces those raw
//! lines from a journald unit or a rotating log file.

mod extract;
mod journal;
mod reader;
mod tail;

pub use extract::extract;
pub use reader::{SourceReader, SourceSettings};
pub use tail::FileTailer;

// Re-export types used in our public API
pub use relaymon_types::LogEvent;

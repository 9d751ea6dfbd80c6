//! Operator-facing telemetry: per-endpoint traffic counters and a bounded
//! message log. Both are designed for concurrent writers on the dispatch
//! path with snapshot-style readers in the UI collaborator.

mod log;
mod traffic;

pub use log::{LogEntry, LogEvent, MessageLog, DEFAULT_LOG_CAPACITY, MAX_LOG_CAPACITY};
pub use traffic::{TrafficAnalyzer, TrafficSnapshot};

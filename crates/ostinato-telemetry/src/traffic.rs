//! Per-endpoint sliding traffic counters.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ostinato_core::fold_key;
use std::time::{Duration, Instant};

/// Floor for rate computation so a snapshot taken immediately after a
/// window reset never divides by zero.
const MIN_WINDOW: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Counter {
    messages: u64,
    bytes: u64,
    /// Bit n set = channel n+1 observed this window.
    channel_mask: u16,
    window_start: Instant,
}

impl Counter {
    fn fresh(now: Instant) -> Self {
        Self {
            messages: 0,
            bytes: 0,
            channel_mask: 0,
            window_start: now,
        }
    }
}

/// Rates observed since the counter window started.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSnapshot {
    pub endpoint_id: String,
    pub messages_per_second: f64,
    pub bytes_per_second: f64,
    /// Sorted ascending, values in 1..=16.
    pub active_channels: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Thread-safe per-endpoint counters. Endpoints are independent: the map
/// is sharded, and each counter is only locked for its own updates.
#[derive(Default)]
pub struct TrafficAnalyzer {
    counters: DashMap<String, Counter>,
}

impl TrafficAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message. Channels outside 1..=16 are counted but not
    /// added to the active set.
    pub fn register(&self, endpoint_id: &str, byte_count: usize, channel: u8) {
        let now = Instant::now();
        let mut counter = self
            .counters
            .entry(fold_key(endpoint_id))
            .or_insert_with(|| Counter::fresh(now));
        counter.messages += 1;
        counter.bytes += byte_count as u64;
        if (1..=16).contains(&channel) {
            counter.channel_mask |= 1 << (channel - 1);
        }
    }

    /// Compute the current rates and reset the window atomically.
    pub fn snapshot(&self, endpoint_id: &str) -> TrafficSnapshot {
        let now = Instant::now();
        let mut counter = self
            .counters
            .entry(fold_key(endpoint_id))
            .or_insert_with(|| Counter::fresh(now));
        let snapshot = Self::compute(endpoint_id, &counter, now);
        *counter = Counter::fresh(now);
        snapshot
    }

    /// Compute the current rates without resetting the window.
    pub fn peek(&self, endpoint_id: &str) -> TrafficSnapshot {
        let now = Instant::now();
        match self.counters.get(&fold_key(endpoint_id)) {
            Some(counter) => Self::compute(endpoint_id, &counter, now),
            None => Self::compute(endpoint_id, &Counter::fresh(now), now),
        }
    }

    fn compute(endpoint_id: &str, counter: &Counter, now: Instant) -> TrafficSnapshot {
        let elapsed = now
            .saturating_duration_since(counter.window_start)
            .max(MIN_WINDOW)
            .as_secs_f64();
        let active_channels = (1..=16u8)
            .filter(|ch| counter.channel_mask & (1 << (ch - 1)) != 0)
            .collect();
        TrafficSnapshot {
            endpoint_id: endpoint_id.to_string(),
            messages_per_second: counter.messages as f64 / elapsed,
            bytes_per_second: counter.bytes as f64 / elapsed,
            active_channels,
            captured_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_peek() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("hw:A", 3, 1);
        traffic.register("hw:A", 3, 5);
        traffic.register("hw:A", 2, 5);

        let snap = traffic.peek("hw:A");
        assert!(snap.messages_per_second > 0.0);
        assert!(snap.bytes_per_second > 0.0);
        assert_eq!(snap.active_channels, vec![1, 5]);
    }

    #[test]
    fn test_snapshot_resets_window() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("hw:A", 3, 2);

        let first = traffic.snapshot("hw:A");
        assert_eq!(first.active_channels, vec![2]);

        let second = traffic.peek("hw:A");
        assert_eq!(second.messages_per_second, 0.0);
        assert_eq!(second.bytes_per_second, 0.0);
        assert!(second.active_channels.is_empty());
    }

    #[test]
    fn test_peek_does_not_reset() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("hw:A", 3, 2);
        traffic.peek("hw:A");

        let snap = traffic.peek("hw:A");
        assert_eq!(snap.active_channels, vec![2]);
        assert!(snap.messages_per_second > 0.0);
    }

    #[test]
    fn test_channel_zero_not_recorded_as_active() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("hw:A", 1, 0);
        traffic.register("hw:A", 1, 17);

        let snap = traffic.peek("hw:A");
        assert!(snap.active_channels.is_empty());
        assert!(snap.messages_per_second > 0.0);
    }

    #[test]
    fn test_endpoints_are_independent() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("hw:A", 3, 1);
        traffic.register("hw:B", 3, 2);

        traffic.snapshot("hw:A");
        let b = traffic.peek("hw:B");
        assert_eq!(b.active_channels, vec![2]);
    }

    #[test]
    fn test_ids_are_case_insensitive() {
        let traffic = TrafficAnalyzer::new();
        traffic.register("HW:A", 3, 4);
        let snap = traffic.peek("hw:a");
        assert_eq!(snap.active_channels, vec![4]);
    }

    #[test]
    fn test_unknown_endpoint_peeks_zero() {
        let traffic = TrafficAnalyzer::new();
        let snap = traffic.peek("hw:nothing");
        assert_eq!(snap.messages_per_second, 0.0);
        assert!(snap.active_channels.is_empty());
    }
}

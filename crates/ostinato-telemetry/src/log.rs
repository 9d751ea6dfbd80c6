//! Bounded ring buffer of structured log entries.

use chrono::{DateTime, Utc};
use ostinato_core::{EventBus, Subscription};
use ostinato_midi::MessageType;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 5000;
pub const MAX_LOG_CAPACITY: usize = 200_000;

/// One line in the operator-visible traffic log. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub endpoint_name: String,
    /// 0 for non-channel messages.
    pub channel: u8,
    pub message_type: MessageType,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub enum LogEvent {
    EntryAdded(LogEntry),
    Cleared,
}

struct RingState {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

/// Bounded log; oldest entries are evicted first. `size <= capacity` holds
/// at all times, including across concurrent `add` and `configure`.
pub struct MessageLog {
    state: Mutex<RingState>,
    events: EventBus<LogEvent>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = Self::clamp_capacity(capacity);
        Self {
            state: Mutex::new(RingState {
                entries: VecDeque::new(),
                capacity,
            }),
            events: EventBus::new(),
        }
    }

    fn clamp_capacity(capacity: usize) -> usize {
        capacity.clamp(1, MAX_LOG_CAPACITY)
    }

    /// Change the capacity, evicting the oldest entries on shrink.
    pub fn configure(&self, capacity: usize) {
        let capacity = Self::clamp_capacity(capacity);
        let mut state = self.state.lock();
        state.capacity = capacity;
        while state.entries.len() > capacity {
            state.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Append an entry, evicting the oldest if full.
    pub fn add(&self, entry: LogEntry) {
        {
            let mut state = self.state.lock();
            if state.entries.len() == state.capacity {
                state.entries.pop_front();
            }
            state.entries.push_back(entry.clone());
        }
        self.events.emit(&LogEvent::EntryAdded(entry));
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
        self.events.emit(&LogEvent::Cleared);
    }

    /// Snapshot copy in insertion order.
    pub fn list(&self) -> Vec<LogEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    pub fn subscribe(&self, handler: impl Fn(&LogEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(handler)
    }
}

//! Per-route message filters.

use crate::error::{Result, RoutingError};
use ostinato_midi::MessageType;
use std::collections::BTreeSet;

/// Predicate over (channel, message type). Empty sets mean "allow all"
/// for that dimension. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteFilter {
    channels: BTreeSet<u8>,
    message_types: BTreeSet<MessageType>,
}

impl RouteFilter {
    /// Build a filter. Inputs are de-duplicated; channels outside 1..=16
    /// are rejected.
    pub fn new(
        channels: impl IntoIterator<Item = u8>,
        message_types: impl IntoIterator<Item = MessageType>,
    ) -> Result<Self> {
        let mut channel_set = BTreeSet::new();
        for channel in channels {
            if !(1..=16).contains(&channel) {
                return Err(RoutingError::InvalidFilter(format!(
                    "channel {channel} out of range 1..=16"
                )));
            }
            channel_set.insert(channel);
        }
        Ok(Self {
            channels: channel_set,
            message_types: message_types.into_iter().collect(),
        })
    }

    /// Filter that passes every message.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A (channel, type) pair passes iff each non-empty set contains it.
    #[inline]
    pub fn allows(&self, channel: u8, message_type: MessageType) -> bool {
        (self.channels.is_empty() || self.channels.contains(&channel))
            && (self.message_types.is_empty() || self.message_types.contains(&message_type))
    }

    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.channels.iter().copied()
    }

    pub fn message_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.message_types.iter().copied()
    }

    pub fn is_allow_all(&self) -> bool {
        self.channels.is_empty() && self.message_types.is_empty()
    }
}

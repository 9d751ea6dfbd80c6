//! Immutable decoded MIDI packets.

use crate::taxonomy::{classify, MessageType};
use chrono::{DateTime, Utc};

/// Default cap on SysEx payloads. Oversized messages are truncated; the
/// limit is configurable at the session layer.
pub const SYSEX_MAX_BYTES: usize = 64 * 1024;

/// One decoded MIDI message: raw bytes plus the classification and the
/// arrival timestamp. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPacket {
    pub source_endpoint_id: String,
    pub data: Vec<u8>,
    /// 0 for non-channel messages, 1..=16 otherwise.
    pub channel: u8,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl MidiPacket {
    /// Classify `data` and build a packet with the default SysEx cap.
    pub fn classify(
        source_endpoint_id: impl Into<String>,
        data: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::classify_with_limit(source_endpoint_id, data, timestamp, SYSEX_MAX_BYTES)
    }

    /// Classify `data`, truncating SysEx payloads longer than `sysex_limit`.
    pub fn classify_with_limit(
        source_endpoint_id: impl Into<String>,
        mut data: Vec<u8>,
        timestamp: DateTime<Utc>,
        sysex_limit: usize,
    ) -> Self {
        let classified = classify(&data);
        if classified.message_type == MessageType::SysEx && data.len() > sysex_limit {
            data.truncate(sysex_limit);
        }
        Self {
            source_endpoint_id: source_endpoint_id.into(),
            data,
            channel: classified.channel,
            message_type: classified.message_type,
            timestamp,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_builds_packet() {
        let p = MidiPacket::classify("hw:in", vec![0x91, 60, 100], Utc::now());
        assert_eq!(p.message_type, MessageType::NoteOn);
        assert_eq!(p.channel, 2);
        assert_eq!(p.data, vec![0x91, 60, 100]);
    }

    #[test]
    fn test_sysex_truncated_at_limit() {
        let mut bytes = vec![0xF0];
        bytes.extend(std::iter::repeat(0x55).take(100));
        bytes.push(0xF7);

        let p = MidiPacket::classify_with_limit("hw:in", bytes, Utc::now(), 16);
        assert_eq!(p.message_type, MessageType::SysEx);
        assert_eq!(p.len(), 16);
    }

    #[test]
    fn test_non_sysex_never_truncated() {
        let p = MidiPacket::classify_with_limit("hw:in", vec![0x90, 60, 100], Utc::now(), 2);
        assert_eq!(p.len(), 3);
    }
}

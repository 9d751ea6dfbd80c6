//! Stateless classification of a MIDI byte stream.
//!
//! Running status is not handled here: the port backend is required to
//! deliver complete messages, so the first byte is always a status byte.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message classes the router filters on. Everything else is `Unknown`
/// and still passes through byte-accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageType {
    NoteOn,
    NoteOff,
    ControlChange,
    ProgramChange,
    PitchBend,
    SysEx,
    Clock,
    Unknown,
}

impl MessageType {
    /// Parse a serialized variant name; `None` for anything unrecognized
    /// (config documents from newer builds may carry names we don't know).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NoteOn" => Some(MessageType::NoteOn),
            "NoteOff" => Some(MessageType::NoteOff),
            "ControlChange" => Some(MessageType::ControlChange),
            "ProgramChange" => Some(MessageType::ProgramChange),
            "PitchBend" => Some(MessageType::PitchBend),
            "SysEx" => Some(MessageType::SysEx),
            "Clock" => Some(MessageType::Clock),
            "Unknown" => Some(MessageType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::NoteOn => "NoteOn",
            MessageType::NoteOff => "NoteOff",
            MessageType::ControlChange => "ControlChange",
            MessageType::ProgramChange => "ProgramChange",
            MessageType::PitchBend => "PitchBend",
            MessageType::SysEx => "SysEx",
            MessageType::Clock => "Clock",
            MessageType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub message_type: MessageType,
    /// 0 for non-channel messages, 1..=16 otherwise.
    pub channel: u8,
    /// Expected message length in bytes; `None` for variable-length SysEx.
    pub expected_len: Option<usize>,
}

impl Classified {
    const fn system(message_type: MessageType, expected_len: usize) -> Self {
        Self {
            message_type,
            channel: 0,
            expected_len: Some(expected_len),
        }
    }
}

/// Classify a complete MIDI message by its status byte.
pub fn classify(data: &[u8]) -> Classified {
    let Some(&status) = data.first() else {
        return Classified {
            message_type: MessageType::Unknown,
            channel: 0,
            expected_len: Some(0),
        };
    };

    let channel = (status & 0x0F) + 1;
    let channel_voice = |message_type, expected_len| Classified {
        message_type,
        channel,
        expected_len: Some(expected_len),
    };

    match status & 0xF0 {
        0x80 => channel_voice(MessageType::NoteOff, 3),
        0x90 => channel_voice(MessageType::NoteOn, 3),
        // Polyphonic aftertouch: opaque to the router but channel-addressed.
        0xA0 => channel_voice(MessageType::Unknown, 3),
        0xB0 => channel_voice(MessageType::ControlChange, 3),
        0xC0 => channel_voice(MessageType::ProgramChange, 2),
        // Channel pressure: opaque, channel-addressed.
        0xD0 => channel_voice(MessageType::Unknown, 2),
        0xE0 => channel_voice(MessageType::PitchBend, 3),
        _ => match status {
            0xF0 | 0xF7 => Classified {
                message_type: MessageType::SysEx,
                channel: 0,
                expected_len: None,
            },
            0xF8 | 0xFA | 0xFB | 0xFC => Classified::system(MessageType::Clock, 1),
            _ => Classified::system(MessageType::Unknown, 1),
        },
    }
}

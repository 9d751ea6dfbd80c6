//! Human-readable one-line message summaries for the traffic log.
//!
//! The formats here are load-bearing for operators reading the log pane;
//! keep them stable.

use crate::packet::MidiPacket;
use crate::taxonomy::MessageType;
use std::fmt::Write;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Note number to scientific pitch, middle C (60) = C4.
fn note_name(note: u8) -> String {
    let name = NOTE_NAMES[(note % 12) as usize];
    let octave = (note / 12) as i32 - 1;
    format!("{name}{octave}")
}

fn hex_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Summarize a packet for the message log, e.g. `NoteOn C4 Vel:92`.
pub fn format_detail(packet: &MidiPacket) -> String {
    if packet.data.is_empty() {
        return "Empty".to_string();
    }
    let data = &packet.data;
    let byte = |i: usize| data.get(i).copied().unwrap_or(0);

    match packet.message_type {
        MessageType::NoteOn => format!("NoteOn {} Vel:{}", note_name(byte(1)), byte(2)),
        MessageType::NoteOff => format!("NoteOff {} Vel:{}", note_name(byte(1)), byte(2)),
        MessageType::ControlChange => format!("CC#{} Val:{}", byte(1), byte(2)),
        MessageType::ProgramChange => format!("Program {}", byte(1)),
        MessageType::PitchBend => {
            let value = (byte(1) as i32 | ((byte(2) as i32) << 7)) - 8192;
            format!("Pitch {value}")
        }
        MessageType::SysEx => format!("SysEx {} bytes", data.len()),
        MessageType::Clock => format!("Clock {:02X}", byte(0)),
        MessageType::Unknown => format!("Unknown [{}]", hex_bytes(data)),
    }
}

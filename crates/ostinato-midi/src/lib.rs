//! MIDI byte-stream classification and packet types.
//!
//! The router never interprets message payloads beyond what filtering and
//! log readability need: a packet is classified once on arrival (status
//! byte → [`MessageType`] + channel) and the raw bytes pass through
//! untouched.

mod detail;
mod packet;
mod taxonomy;

pub use detail::format_detail;
pub use packet::{MidiPacket, SYSEX_MAX_BYTES};
pub use taxonomy::{classify, Classified, MessageType};

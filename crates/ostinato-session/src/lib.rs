//! Port providers and the reconciling MIDI session.
//!
//! A [`PortProvider`] turns endpoint ids into live OS ports; the
//! [`MidiSession`] keeps the open-port set converged on what the endpoint
//! catalog currently desires, reacting to hot-plug bursts through a
//! debounced, mutually-exclusive reconciliation worker.
//!
//! ```text
//! EndpointCatalog ──EndpointsChanged──▶ reconcile thread (debounced)
//!                                             │ open/close
//!                                             ▼
//! PortProvider ──inbound bytes──▶ MidiSession ──PacketReceived──▶ worker
//!                ◀──send bytes───
//! ```

mod error;
mod loopback;
mod midir_backend;
mod provider;
mod session;

pub use error::{ProviderError, Result, SessionError};
pub use loopback::{LoopbackProvider, LOOPBACK_PREFIX};
pub use midir_backend::{MidirProvider, HARDWARE_PREFIX};
pub use provider::{InboundSink, PortHandle, PortProvider};
pub use session::{
    MidiSession, PacketReceived, SessionOptions, SessionState, StateChanged, DEFAULT_DEBOUNCE,
};

//! ostinato — a MIDI routing engine.
//!
//! Ingests MIDI from a dynamic set of physical and virtual endpoints,
//! evaluates per-route channel/type filters, and forwards matching
//! messages to output endpoints with bounded latency. Hot-plugged
//! hardware is reconciled into the open-port set automatically; traffic
//! counters and a bounded message log keep the whole thing observable.
//!
//! # Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let engine = OstinatoEngine::builder()
//!     .with_loopback_store("loopbacks.json")
//!     .build();
//!
//! let route = RouteDefinition::new(
//!     "hw:Arturia KeyStep",
//!     "hw:Synth Out",
//!     RouteFilter::new([1], [MessageType::NoteOn, MessageType::NoteOff])?,
//! )?;
//! engine.matrix().upsert(route)?;
//!
//! let cancel = CancellationToken::new();
//! engine.start(&cancel)?;
//! // ... packets flow ...
//! engine.stop();
//! ```

mod builder;
mod config;
mod engine;
mod error;
mod worker;

pub use builder::EngineBuilder;
pub use config::{AppConfig, ProfileConfig, RouteConfig, CONFIG_VERSION, DEFAULT_PROFILE_NAME};
pub use engine::OstinatoEngine;
pub use error::{ConfigError, Error, Result};
pub use worker::{RouteForwarded, RoutingWorker};

// Member-crate surfaces, re-exported so embedders need one dependency.
pub use ostinato_catalog::{
    CatalogError, EndpointCatalog, EndpointDescriptor, EndpointKind, EndpointsChanged,
    HardwareEnumerator, HardwarePort, HotplugEvent, LoopbackStore, PersistedLoopback,
    PollingWatcher, PortDirection,
};
pub use ostinato_core::{fold_key, CancellationToken, EventBus, Subscription};
pub use ostinato_midi::{
    classify, format_detail, Classified, MessageType, MidiPacket, SYSEX_MAX_BYTES,
};
pub use ostinato_routing::{
    RouteDefinition, RouteFilter, RouteId, RouteIndex, RouteMatrix, RoutesChanged, RoutingError,
};
pub use ostinato_session::{
    InboundSink, LoopbackProvider, MidiSession, MidirProvider, PacketReceived, PortHandle,
    PortProvider, ProviderError, SessionError, SessionOptions, SessionState, StateChanged,
    DEFAULT_DEBOUNCE, HARDWARE_PREFIX, LOOPBACK_PREFIX,
};
pub use ostinato_telemetry::{
    LogEntry, LogEvent, MessageLog, TrafficAnalyzer, TrafficSnapshot, DEFAULT_LOG_CAPACITY,
    MAX_LOG_CAPACITY,
};

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::{
        AppConfig, CancellationToken, EndpointCatalog, EndpointDescriptor, EngineBuilder,
        MessageType, MidiPacket, MidiSession, OstinatoEngine, RouteDefinition, RouteFilter,
        RouteMatrix, SessionState,
    };
}

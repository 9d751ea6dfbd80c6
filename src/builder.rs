//! Builder wiring the engine's components together.

use crate::engine::OstinatoEngine;
use crate::worker::RoutingWorker;
use ostinato_catalog::{EndpointCatalog, HardwareEnumerator, LoopbackStore};
use ostinato_routing::RouteMatrix;
use ostinato_session::{
    LoopbackProvider, MidiSession, MidirProvider, PortProvider, SessionOptions,
};
use ostinato_telemetry::{MessageLog, TrafficAnalyzer, DEFAULT_LOG_CAPACITY};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Configures an [`OstinatoEngine`].
///
/// By default the engine runs against real hardware: a midir provider
/// (which doubles as the hardware enumerator), the in-process loopback
/// provider, and a polling hot-plug watcher. Tests and embedders inject
/// their own providers and enumerator instead.
pub struct EngineBuilder {
    providers: Vec<Arc<dyn PortProvider>>,
    enumerator: Option<Arc<dyn HardwareEnumerator>>,
    loopback_store: PathBuf,
    session_options: SessionOptions,
    log_capacity: usize,
    stop_timeout: Duration,
    watch_interval: Option<Duration>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            enumerator: None,
            loopback_store: PathBuf::from("loopbacks.json"),
            session_options: SessionOptions::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            watch_interval: Some(DEFAULT_WATCH_INTERVAL),
        }
    }
}

impl EngineBuilder {
    /// Register an additional port provider; earlier registrations win
    /// when two providers claim the same id prefix.
    pub fn with_provider(mut self, provider: Arc<dyn PortProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the hardware enumerator (default: the midir backend).
    pub fn with_enumerator(mut self, enumerator: Arc<dyn HardwareEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    /// Where user-managed loopback endpoints are persisted.
    pub fn with_loopback_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.loopback_store = path.into();
        self
    }

    /// Hot-plug coalescing window for the session's reconciler.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.session_options.debounce = debounce;
        self
    }

    /// Cap on accepted SysEx payloads.
    pub fn with_sysex_limit(mut self, limit: usize) -> Self {
        self.session_options.sysex_limit = limit;
        self
    }

    /// Initial message-log capacity.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// How long `stop` waits for the dispatch queue to drain.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Hardware re-enumeration interval; `None` disables the watcher
    /// (hot-plug then only happens through explicit refresh).
    pub fn with_watch_interval(mut self, interval: Option<Duration>) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn build(self) -> OstinatoEngine {
        let mut providers = self.providers;
        let enumerator = match self.enumerator {
            Some(enumerator) => enumerator,
            None => {
                // One midir instance serves as both the hw: opener and
                // the enumerator the catalog refreshes from.
                let midir = Arc::new(MidirProvider::new());
                providers.push(Arc::clone(&midir) as Arc<dyn PortProvider>);
                midir as Arc<dyn HardwareEnumerator>
            }
        };
        if !providers.iter().any(|p| p.owns("loop:")) {
            providers.push(Arc::new(LoopbackProvider::new()));
        }

        let catalog = Arc::new(EndpointCatalog::new(
            Arc::clone(&enumerator),
            LoopbackStore::new(self.loopback_store),
        ));
        let matrix = Arc::new(RouteMatrix::new());
        let traffic = Arc::new(TrafficAnalyzer::new());
        let log = Arc::new(MessageLog::with_capacity(self.log_capacity));
        let session =
            MidiSession::with_options(Arc::clone(&catalog), providers, self.session_options);
        let worker = RoutingWorker::new(
            session.clone(),
            Arc::clone(&matrix),
            Arc::clone(&catalog),
            Arc::clone(&traffic),
            Arc::clone(&log),
        );

        OstinatoEngine {
            catalog,
            matrix,
            session,
            worker,
            traffic,
            log,
            enumerator,
            watch_interval: self.watch_interval,
            stop_timeout: self.stop_timeout,
            watcher: Mutex::new(None),
        }
    }
}

//! The reconciling MIDI session.
//!
//! The session owns every open port handle. A dedicated reconcile thread
//! converges the open set on the catalog's desired set, debouncing
//! hot-plug bursts; a single-permit gate guarantees at most one pass runs
//! at a time, and a burst arriving mid-pass collapses into exactly one
//! follow-up pass.

use crate::error::{ProviderError, Result, SessionError};
use crate::provider::{InboundSink, PortHandle, PortProvider};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ostinato_catalog::EndpointCatalog;
use ostinato_core::{fold_key, CancellationToken, EventBus, Subscription};
use ostinato_midi::{MidiPacket, SYSEX_MAX_BYTES};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default coalescing window for hot-plug bursts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(120);

/// Session lifecycle. `Faulted` is entered when a reconciliation pass
/// fails fatally and leaves only through an explicit stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Faulted(String),
}

/// Emitted exactly once per state change; duplicates are suppressed.
#[derive(Debug, Clone)]
pub struct StateChanged {
    pub state: SessionState,
    pub detail: Option<String>,
}

/// One inbound packet, already classified. The dispatch worker subscribes
/// to this stream.
#[derive(Debug, Clone)]
pub struct PacketReceived(pub MidiPacket);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub sysex_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            sysex_limit: SYSEX_MAX_BYTES,
        }
    }
}

enum ReconcileMsg {
    Nudge,
    Shutdown,
}

#[derive(Clone)]
struct OpenPort {
    handle: PortHandle,
    provider: usize,
}

#[derive(Default)]
struct OpenPorts {
    /// Folded endpoint id → open handle, one namespace per direction.
    inputs: HashMap<String, OpenPort>,
    outputs: HashMap<String, OpenPort>,
}

struct Runtime {
    nudge: Sender<ReconcileMsg>,
    thread: JoinHandle<()>,
    cancel: CancellationToken,
    _catalog_sub: Subscription,
}

/// MIDI session facade. Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct MidiSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    catalog: Arc<EndpointCatalog>,
    providers: Vec<Arc<dyn PortProvider>>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    ports: Mutex<OpenPorts>,
    /// Single-permit mutual exclusion for reconciliation passes.
    reconcile_gate: Mutex<()>,
    packet_events: EventBus<PacketReceived>,
    state_events: EventBus<StateChanged>,
    runtime: Mutex<Option<Runtime>>,
}

impl MidiSession {
    pub fn new(catalog: Arc<EndpointCatalog>, providers: Vec<Arc<dyn PortProvider>>) -> Self {
        Self::with_options(catalog, providers, SessionOptions::default())
    }

    pub fn with_options(
        catalog: Arc<EndpointCatalog>,
        providers: Vec<Arc<dyn PortProvider>>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                catalog,
                providers,
                options,
                state: Mutex::new(SessionState::Stopped),
                ports: Mutex::new(OpenPorts::default()),
                reconcile_gate: Mutex::new(()),
                packet_events: EventBus::new(),
                state_events: EventBus::new(),
                runtime: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn subscribe_packets(
        &self,
        handler: impl Fn(&PacketReceived) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.packet_events.subscribe(handler)
    }

    pub fn subscribe_state(
        &self,
        handler: impl Fn(&StateChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state_events.subscribe(handler)
    }

    /// Start the session: refresh the catalog, begin watching it, run one
    /// reconciliation, and enter `Running`. No-op when already started.
    pub fn start(&self, cancel: &CancellationToken) -> Result<()> {
        {
            let state = self.inner.state.lock();
            if matches!(*state, SessionState::Starting | SessionState::Running) {
                return Ok(());
            }
        }
        self.inner.set_state(SessionState::Starting);

        if let Err(e) = self.inner.catalog.refresh() {
            let error = SessionError::from(e);
            self.inner
                .set_state(SessionState::Faulted(error.to_string()));
            return Err(error);
        }

        let (nudge_tx, nudge_rx) = unbounded();
        let cancel = cancel.clone();
        // The thread holds the session weakly so dropping the last handle
        // without an explicit stop still tears it down.
        let worker_inner = Arc::downgrade(&self.inner);
        let worker_cancel = cancel.clone();
        let debounce = self.inner.options.debounce;
        let thread = thread::spawn(move || {
            SessionInner::reconcile_loop(worker_inner, nudge_rx, worker_cancel, debounce)
        });

        let nudge_for_catalog = nudge_tx.clone();
        let catalog_sub = self.inner.catalog.subscribe(move |_| {
            let _ = nudge_for_catalog.send(ReconcileMsg::Nudge);
        });

        *self.inner.runtime.lock() = Some(Runtime {
            nudge: nudge_tx,
            thread,
            cancel: cancel.clone(),
            _catalog_sub: catalog_sub,
        });

        if let Err(e) = self.inner.reconcile_once(&cancel) {
            self.inner.set_state(SessionState::Faulted(e.to_string()));
            return Err(e);
        }
        self.inner.set_state(SessionState::Running);
        Ok(())
    }

    /// Stop the session: unsubscribe from the catalog, cancel any pending
    /// debounce, wait out an in-flight reconciliation, close every open
    /// port, and enter `Stopped`. Idempotent.
    pub fn stop(&self) {
        let runtime = self.inner.runtime.lock().take();
        if let Some(runtime) = runtime {
            runtime.cancel.cancel();
            let _ = runtime.nudge.send(ReconcileMsg::Shutdown);
            let _ = runtime.thread.join();
        }

        // The gate is free once no pass is running; taking it fences any
        // straggling start-time pass before we drain the handles.
        let _gate = self.inner.reconcile_gate.lock();
        let ports = std::mem::take(&mut *self.inner.ports.lock());
        for open in ports.inputs.into_values().chain(ports.outputs.into_values()) {
            self.inner.providers[open.provider].close(&open.handle);
        }
        self.inner.set_state(SessionState::Stopped);
    }

    /// Send raw bytes to an endpoint's output port.
    ///
    /// A vanished endpoint (no open handle) is a silent success; provider
    /// failures surface so the dispatcher can log them.
    pub fn send(&self, endpoint_id: &str, bytes: &[u8]) -> Result<()> {
        let open = {
            let ports = self.inner.ports.lock();
            ports
                .outputs
                .get(&fold_key(endpoint_id))
                .map(|open| (open.handle.clone(), open.provider))
        };
        let Some((handle, provider)) = open else {
            return Ok(());
        };
        self.inner.providers[provider]
            .send(&handle, bytes)
            .map_err(SessionError::from)
    }

    /// Force one reconciliation pass outside the debounce path.
    pub fn reconcile_now(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.reconcile_once(cancel)
    }
}

impl SessionInner {
    fn set_state(&self, new: SessionState) {
        {
            let mut state = self.state.lock();
            if *state == new {
                return;
            }
            *state = new.clone();
        }
        info!(state = ?new, "session state changed");
        let detail = match &new {
            SessionState::Faulted(detail) => Some(detail.clone()),
            _ => None,
        };
        self.state_events.emit(&StateChanged { state: new, detail });
    }

    fn provider_for(&self, endpoint_id: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.owns(endpoint_id))
    }

    fn inbound_sink(self: &Arc<Self>) -> InboundSink {
        let weak = Arc::downgrade(self);
        let sysex_limit = self.options.sysex_limit;
        Arc::new(move |endpoint_id, bytes, timestamp| {
            if let Some(inner) = weak.upgrade() {
                let packet = MidiPacket::classify_with_limit(
                    endpoint_id,
                    bytes.to_vec(),
                    timestamp,
                    sysex_limit,
                );
                inner.packet_events.emit(&PacketReceived(packet));
            }
        })
    }

    /// One reconciliation pass: close handles no longer desired, then
    /// open missing ones. `PortUnavailable` skips the endpoint until the
    /// next pass; anything else is fatal to the session. On cancellation
    /// the pass returns early with every opened handle already tracked.
    fn reconcile_once(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        let _gate = self.reconcile_gate.lock();
        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut desired_inputs: HashMap<String, String> = HashMap::new();
        let mut desired_outputs: HashMap<String, String> = HashMap::new();
        for endpoint in self.catalog.list().into_iter().filter(|e| e.is_online) {
            let key = fold_key(&endpoint.id);
            if endpoint.supports_input {
                desired_inputs.insert(key.clone(), endpoint.id.clone());
            }
            if endpoint.supports_output {
                desired_outputs.insert(key, endpoint.id);
            }
        }

        let to_close = {
            let mut ports = self.ports.lock();
            let mut closed = Vec::new();
            ports.inputs.retain(|key, open| {
                let keep = desired_inputs.contains_key(key);
                if !keep {
                    closed.push(open.clone());
                }
                keep
            });
            ports.outputs.retain(|key, open| {
                let keep = desired_outputs.contains_key(key);
                if !keep {
                    closed.push(open.clone());
                }
                keep
            });
            closed
        };
        for open in to_close {
            debug!(endpoint = %open.handle.endpoint_id, "closing port");
            self.providers[open.provider].close(&open.handle);
        }

        let missing = |desired: &HashMap<String, String>, open: &HashMap<String, OpenPort>| {
            desired
                .iter()
                .filter(|(key, _)| !open.contains_key(*key))
                .map(|(key, id)| (key.clone(), id.clone()))
                .collect::<Vec<_>>()
        };
        let (missing_inputs, missing_outputs) = {
            let ports = self.ports.lock();
            (
                missing(&desired_inputs, &ports.inputs),
                missing(&desired_outputs, &ports.outputs),
            )
        };

        for (key, endpoint_id) in missing_inputs {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(provider) = self.provider_for(&endpoint_id) else {
                debug!(endpoint = %endpoint_id, "no provider owns this id; skipping");
                continue;
            };
            match self.providers[provider].open_input(&endpoint_id, self.inbound_sink()) {
                Ok(handle) => {
                    debug!(endpoint = %endpoint_id, "opened input");
                    self.ports
                        .lock()
                        .inputs
                        .insert(key, OpenPort { handle, provider });
                }
                Err(ProviderError::PortUnavailable(reason)) => {
                    debug!(endpoint = %endpoint_id, reason, "input unavailable; will retry");
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (key, endpoint_id) in missing_outputs {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(provider) = self.provider_for(&endpoint_id) else {
                debug!(endpoint = %endpoint_id, "no provider owns this id; skipping");
                continue;
            };
            match self.providers[provider].open_output(&endpoint_id) {
                Ok(handle) => {
                    debug!(endpoint = %endpoint_id, "opened output");
                    self.ports
                        .lock()
                        .outputs
                        .insert(key, OpenPort { handle, provider });
                }
                Err(ProviderError::PortUnavailable(reason)) => {
                    debug!(endpoint = %endpoint_id, reason, "output unavailable; will retry");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn run_pass(self: &Arc<Self>, cancel: &CancellationToken) {
        if let Err(e) = self.reconcile_once(cancel) {
            warn!(error = %e, "reconciliation failed fatally");
            self.set_state(SessionState::Faulted(e.to_string()));
        }
    }

    fn reconcile_loop(
        inner: Weak<SessionInner>,
        messages: Receiver<ReconcileMsg>,
        cancel: CancellationToken,
        debounce: Duration,
    ) {
        loop {
            match messages.recv() {
                Ok(ReconcileMsg::Nudge) => {}
                Ok(ReconcileMsg::Shutdown) | Err(_) => break,
            }

            // Absorb the burst: restart the window on every new signal.
            loop {
                match messages.recv_timeout(debounce) {
                    Ok(ReconcileMsg::Nudge) => continue,
                    Ok(ReconcileMsg::Shutdown) => return,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            let Some(session) = inner.upgrade() else { break };
            session.run_pass(&cancel);

            // Signals that landed during the pass collapse into a single
            // follow-up pass.
            let mut pending = false;
            loop {
                match messages.try_recv() {
                    Ok(ReconcileMsg::Nudge) => pending = true,
                    Ok(ReconcileMsg::Shutdown) => return,
                    Err(_) => break,
                }
            }
            if pending && !cancel.is_cancelled() {
                session.run_pass(&cancel);
            }
        }
        debug!("reconcile worker stopped");
    }
}

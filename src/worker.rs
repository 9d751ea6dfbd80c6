//! The dispatch worker: consumes inbound packets, evaluates routes, and
//! forwards to output endpoints.
//!
//! The queue is a multi-producer FIFO fed by provider callback threads;
//! a single dedicated reader drains it, which is what gives per-source
//! delivery ordering. Route lookups go through an atomically-published
//! [`RouteIndex`]; one packet is handled entirely against one index
//! version.

use crate::error::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ostinato_catalog::EndpointCatalog;
use ostinato_core::{fold_key, EventBus, Subscription};
use ostinato_midi::{format_detail, MidiPacket};
use ostinato_routing::{RouteId, RouteIndex, RouteMatrix};
use ostinato_session::{MidiSession, PacketReceived};
use ostinato_telemetry::{LogEntry, MessageLog, TrafficAnalyzer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Emitted after each successful forward.
#[derive(Debug, Clone)]
pub struct RouteForwarded {
    pub route_id: RouteId,
    pub source: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

enum WorkItem {
    Packet(MidiPacket),
    Shutdown,
}

struct WorkerRuntime {
    queue: Sender<WorkItem>,
    thread: Option<JoinHandle<()>>,
    done: Receiver<()>,
    _subscriptions: Vec<Subscription>,
}

/// Routing worker facade. Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct RoutingWorker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    session: MidiSession,
    matrix: Arc<RouteMatrix>,
    catalog: Arc<EndpointCatalog>,
    traffic: Arc<TrafficAnalyzer>,
    log: Arc<MessageLog>,
    index: ArcSwap<RouteIndex>,
    /// Folded endpoint id → display name, invalidated on catalog change.
    names: ArcSwap<HashMap<String, String>>,
    forwarded: EventBus<RouteForwarded>,
    runtime: Mutex<Option<WorkerRuntime>>,
}

impl RoutingWorker {
    pub fn new(
        session: MidiSession,
        matrix: Arc<RouteMatrix>,
        catalog: Arc<EndpointCatalog>,
        traffic: Arc<TrafficAnalyzer>,
        log: Arc<MessageLog>,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                session,
                matrix,
                catalog,
                traffic,
                log,
                index: ArcSwap::from_pointee(RouteIndex::empty()),
                names: ArcSwap::from_pointee(HashMap::new()),
                forwarded: EventBus::new(),
                runtime: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe_forwarded(
        &self,
        handler: impl Fn(&RouteForwarded) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.forwarded.subscribe(handler)
    }

    /// Build the index and name cache, subscribe to change streams, and
    /// spawn the reader task. No-op when already started.
    pub fn start(&self) -> Result<()> {
        let mut runtime = self.inner.runtime.lock();
        if runtime.is_some() {
            return Ok(());
        }

        // Subscribe before the initial rebuild so a mutation landing in
        // between is never missed.
        let mut subscriptions = Vec::new();

        let weak = Arc::downgrade(&self.inner);
        subscriptions.push(self.inner.matrix.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.rebuild_index();
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        subscriptions.push(self.inner.catalog.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.rebuild_names();
            }
        }));

        self.inner.rebuild_index();
        self.inner.rebuild_names();

        let (queue, queue_rx) = unbounded();
        let enqueue = queue.clone();
        subscriptions.push(self.inner.session.subscribe_packets(
            move |PacketReceived(packet)| {
                let _ = enqueue.send(WorkItem::Packet(packet.clone()));
            },
        ));

        let (done_tx, done) = crossbeam_channel::bounded(1);
        let reader_inner = Arc::downgrade(&self.inner);
        let thread = thread::spawn(move || {
            Self::reader(reader_inner, queue_rx);
            let _ = done_tx.send(());
        });

        *runtime = Some(WorkerRuntime {
            queue,
            thread: Some(thread),
            done,
            _subscriptions: subscriptions,
        });
        Ok(())
    }

    /// Unsubscribe, signal completion, and wait for the reader up to
    /// `timeout`; past the timeout the reader is abandoned with whatever
    /// is left in its queue.
    pub fn stop(&self, timeout: Duration) {
        let Some(mut runtime) = self.inner.runtime.lock().take() else {
            return;
        };
        runtime._subscriptions.clear();
        let _ = runtime.queue.send(WorkItem::Shutdown);

        match runtime.done.recv_timeout(timeout) {
            Ok(()) => {
                if let Some(thread) = runtime.thread.take() {
                    let _ = thread.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("routing worker did not drain in time; abandoning reader");
            }
            Err(RecvTimeoutError::Disconnected) => {}
        }
    }

    fn reader(inner: Weak<WorkerInner>, queue: Receiver<WorkItem>) {
        while let Ok(item) = queue.recv() {
            match item {
                WorkItem::Shutdown => break,
                WorkItem::Packet(packet) => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.dispatch(&packet);
                }
            }
        }
        debug!("routing worker reader stopped");
    }
}

impl WorkerInner {
    fn rebuild_index(&self) {
        let index = RouteIndex::build(&self.matrix.list());
        self.index.store(Arc::new(index));
        debug!("route index rebuilt");
    }

    fn rebuild_names(&self) {
        let names: HashMap<String, String> = self
            .catalog
            .list()
            .into_iter()
            .map(|endpoint| (fold_key(&endpoint.id), endpoint.name))
            .collect();
        self.names.store(Arc::new(names));
    }

    fn display_name(&self, endpoint_id: &str) -> String {
        self.names
            .load()
            .get(&fold_key(endpoint_id))
            .cloned()
            .unwrap_or_else(|| endpoint_id.to_string())
    }

    fn dispatch(&self, packet: &MidiPacket) {
        let source_name = self.display_name(&packet.source_endpoint_id);
        self.traffic
            .register(&packet.source_endpoint_id, packet.len(), packet.channel);
        self.log.add(LogEntry {
            timestamp: packet.timestamp,
            endpoint_name: source_name.clone(),
            channel: packet.channel,
            message_type: packet.message_type,
            detail: format!("IN {}", format_detail(packet)),
        });

        let index = self.index.load();
        for route in index.routes_for(&packet.source_endpoint_id) {
            if !route.enabled {
                continue;
            }
            if !route.filter.allows(packet.channel, packet.message_type) {
                continue;
            }
            let target_name = self.display_name(&route.target);
            match self.session.send(&route.target, &packet.data) {
                Ok(()) => {
                    self.traffic
                        .register(&route.target, packet.len(), packet.channel);
                    self.log.add(LogEntry {
                        timestamp: Utc::now(),
                        endpoint_name: target_name,
                        channel: packet.channel,
                        message_type: packet.message_type,
                        detail: format!(
                            "Routed from {} {}",
                            source_name,
                            format_detail(packet)
                        ),
                    });
                    self.forwarded.emit(&RouteForwarded {
                        route_id: route.id.clone(),
                        source: route.source.clone(),
                        target: route.target.clone(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    self.log.add(LogEntry {
                        timestamp: Utc::now(),
                        endpoint_name: target_name,
                        channel: packet.channel,
                        message_type: packet.message_type,
                        detail: format!("ERROR {e}"),
                    });
                }
            }
        }
    }
}

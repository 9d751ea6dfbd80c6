//! Engine supervisor coordinating the catalog, session, and dispatcher.

use crate::builder::EngineBuilder;
use crate::config::AppConfig;
use crate::error::Result;
use crate::worker::{RouteForwarded, RoutingWorker};
use ostinato_catalog::{EndpointCatalog, HardwareEnumerator, PollingWatcher};
use ostinato_core::{CancellationToken, Subscription};
use ostinato_routing::RouteMatrix;
use ostinato_session::MidiSession;
use ostinato_telemetry::{MessageLog, TrafficAnalyzer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Owns all router components and enforces startup/shutdown ordering:
/// refresh catalog → start dispatcher → start session, and the reverse
/// on shutdown. A failed step never skips the remaining shutdown steps.
pub struct OstinatoEngine {
    pub(crate) catalog: Arc<EndpointCatalog>,
    pub(crate) matrix: Arc<RouteMatrix>,
    pub(crate) session: MidiSession,
    pub(crate) worker: RoutingWorker,
    pub(crate) traffic: Arc<TrafficAnalyzer>,
    pub(crate) log: Arc<MessageLog>,
    pub(crate) enumerator: Arc<dyn HardwareEnumerator>,
    pub(crate) watch_interval: Option<Duration>,
    pub(crate) stop_timeout: Duration,
    pub(crate) watcher: Mutex<Option<PollingWatcher>>,
}

impl OstinatoEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    // ==================== Component Access ====================

    pub fn catalog(&self) -> &Arc<EndpointCatalog> {
        &self.catalog
    }

    pub fn matrix(&self) -> &Arc<RouteMatrix> {
        &self.matrix
    }

    pub fn session(&self) -> &MidiSession {
        &self.session
    }

    pub fn traffic(&self) -> &Arc<TrafficAnalyzer> {
        &self.traffic
    }

    pub fn message_log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn subscribe_forwarded(
        &self,
        handler: impl Fn(&RouteForwarded) + Send + Sync + 'static,
    ) -> Subscription {
        self.worker.subscribe_forwarded(handler)
    }

    // ==================== Lifecycle ====================

    /// Bring the router up. On failure everything already started is
    /// stopped again before the error is returned.
    pub fn start(&self, cancel: &CancellationToken) -> Result<()> {
        info!("starting engine");
        self.catalog.refresh()?;
        self.worker.start()?;
        if let Err(e) = self.session.start(cancel) {
            error!(error = %e, "session failed to start; rolling back");
            self.worker.stop(self.stop_timeout);
            return Err(e.into());
        }
        if let Some(interval) = self.watch_interval {
            *self.watcher.lock() = Some(PollingWatcher::spawn(
                Arc::clone(&self.enumerator),
                Arc::clone(&self.catalog),
                interval,
            ));
        }
        info!("engine running");
        Ok(())
    }

    /// Bring the router down in reverse order. Idempotent; every step
    /// runs even if an earlier one misbehaves.
    pub fn stop(&self) {
        info!("stopping engine");
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.worker.stop(self.stop_timeout);
        self.session.stop();
        info!("engine stopped");
    }

    /// Load the active profile's routes into the matrix and apply the
    /// configured log capacity.
    pub fn apply_config(&self, config: &AppConfig) -> Result<()> {
        self.log.configure(config.log_buffer_size);
        let routes = config.active_profile().to_routes();
        info!(
            profile = config.active_profile().name,
            routes = routes.len(),
            "applying configuration"
        );
        self.matrix.replace_all(routes)?;
        Ok(())
    }
}

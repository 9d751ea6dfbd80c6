//! Hardware enumeration seam and the polling hot-plug watcher.

use crate::catalog::{EndpointCatalog, HotplugEvent};
use crate::descriptor::PortDirection;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use ostinato_core::fold_key;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// One direction of one OS-level port, as seen by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwarePort {
    pub id: String,
    pub name: String,
    pub direction: PortDirection,
}

/// Backend seam for hardware discovery. The midir-backed provider
/// implements this; tests substitute fixed inventories.
pub trait HardwareEnumerator: Send + Sync {
    fn enumerate(&self) -> Vec<HardwarePort>;
}

/// Portable hot-plug watcher: re-enumerates on an interval and feeds the
/// diff into the catalog as arrive/depart signals.
pub struct PollingWatcher {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl PollingWatcher {
    pub fn spawn(
        enumerator: Arc<dyn HardwareEnumerator>,
        catalog: Arc<EndpointCatalog>,
        interval: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let thread = thread::spawn(move || {
            // Seed with the current inventory so the first tick only
            // reports actual changes; startup state comes from refresh().
            let mut last = snapshot(enumerator.enumerate());
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let current = snapshot(enumerator.enumerate());
                for (key, port) in &current {
                    if !last.contains_key(key) {
                        catalog.apply_hotplug(HotplugEvent::Arrived {
                            id: port.id.clone(),
                            name: port.name.clone(),
                            direction: port.direction,
                        });
                    }
                }
                for (key, port) in &last {
                    if !current.contains_key(key) {
                        catalog.apply_hotplug(HotplugEvent::Departed {
                            id: port.id.clone(),
                            direction: port.direction,
                        });
                    }
                }
                last = current;
            }
            debug!("hot-plug watcher stopped");
        });
        Self {
            shutdown,
            thread: Some(thread),
        }
    }

    /// Stop the polling thread and wait for it to exit.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

type DirectionKey = (String, bool);

fn snapshot(ports: Vec<HardwarePort>) -> HashMap<DirectionKey, HardwarePort> {
    ports
        .into_iter()
        .map(|p| {
            (
                (fold_key(&p.id), p.direction == PortDirection::Input),
                p,
            )
        })
        .collect()
}

//! Shared fixtures: an in-memory port provider with injectable inbound
//! traffic and a mutable hardware enumerator.

// Each integration binary compiles its own copy; not every binary uses
// every helper.
#![allow(dead_code)]

use ostinato::{
    fold_key, EngineBuilder, HardwareEnumerator, HardwarePort, InboundSink, OstinatoEngine,
    PortDirection, PortHandle, PortProvider, ProviderError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// In-memory hardware provider for the `hw:` namespace. Records sends and
/// exposes the inbound sinks so tests can inject traffic.
#[derive(Default)]
pub struct FakeHardware {
    next_token: AtomicU64,
    sinks: Mutex<HashMap<String, InboundSink>>,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver bytes as if the OS port called back.
    pub fn inject(&self, endpoint_id: &str, bytes: &[u8]) {
        let sink = self
            .sinks
            .lock()
            .get(&fold_key(endpoint_id))
            .cloned()
            .expect("input port not open");
        sink(endpoint_id, bytes, chrono::Utc::now());
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, endpoint_id: &str) -> Vec<Vec<u8>> {
        let key = fold_key(endpoint_id);
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| fold_key(id) == key)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn input_open(&self, endpoint_id: &str) -> bool {
        self.sinks.lock().contains_key(&fold_key(endpoint_id))
    }
}

impl PortProvider for FakeHardware {
    fn name(&self) -> &str {
        "fake-hardware"
    }

    fn owns(&self, endpoint_id: &str) -> bool {
        fold_key(endpoint_id).starts_with("hw:")
    }

    fn open_input(
        &self,
        endpoint_id: &str,
        sink: InboundSink,
    ) -> Result<PortHandle, ProviderError> {
        self.sinks.lock().insert(fold_key(endpoint_id), sink);
        Ok(PortHandle {
            endpoint_id: endpoint_id.to_string(),
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn open_output(&self, endpoint_id: &str) -> Result<PortHandle, ProviderError> {
        Ok(PortHandle {
            endpoint_id: endpoint_id.to_string(),
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn send(&self, handle: &PortHandle, bytes: &[u8]) -> Result<(), ProviderError> {
        self.sent
            .lock()
            .push((handle.endpoint_id.clone(), bytes.to_vec()));
        Ok(())
    }

    fn close(&self, handle: &PortHandle) {
        self.sinks.lock().remove(&fold_key(&handle.endpoint_id));
    }
}

pub struct FakeInventory {
    ports: Mutex<Vec<HardwarePort>>,
}

impl FakeInventory {
    pub fn new(ports: Vec<HardwarePort>) -> Self {
        Self {
            ports: Mutex::new(ports),
        }
    }

    pub fn set(&self, ports: Vec<HardwarePort>) {
        *self.ports.lock() = ports;
    }
}

impl HardwareEnumerator for FakeInventory {
    fn enumerate(&self) -> Vec<HardwarePort> {
        self.ports.lock().clone()
    }
}

pub fn input(id: &str, name: &str) -> HardwarePort {
    HardwarePort {
        id: id.to_string(),
        name: name.to_string(),
        direction: PortDirection::Input,
    }
}

pub fn output(id: &str, name: &str) -> HardwarePort {
    HardwarePort {
        id: id.to_string(),
        name: name.to_string(),
        direction: PortDirection::Output,
    }
}

pub struct Rig {
    pub _dir: TempDir,
    pub hardware: Arc<FakeHardware>,
    pub inventory: Arc<FakeInventory>,
    pub engine: OstinatoEngine,
}

/// Engine over fake hardware with fast debounce and no polling watcher
/// (tests drive hot-plug through explicit refresh).
pub fn rig(ports: Vec<HardwarePort>) -> Rig {
    let dir = TempDir::new().unwrap();
    let hardware = Arc::new(FakeHardware::new());
    let inventory = Arc::new(FakeInventory::new(ports));
    let engine = EngineBuilder::default()
        .with_provider(Arc::clone(&hardware) as Arc<dyn PortProvider>)
        .with_enumerator(Arc::clone(&inventory) as Arc<dyn HardwareEnumerator>)
        .with_loopback_store(dir.path().join("loopbacks.json"))
        .with_debounce(Duration::from_millis(5))
        .with_watch_interval(None)
        .build();
    Rig {
        _dir: dir,
        hardware,
        inventory,
        engine,
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition never became true");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// The condition must hold now and keep holding for a short settle
/// window (catches late, unwanted dispatches).
pub fn settle_and_check(mut condition: impl FnMut() -> bool) {
    wait_until(&mut condition);
    std::thread::sleep(Duration::from_millis(50));
    assert!(condition(), "condition did not hold after settling");
}

//! The endpoint catalog: inventory, hot-plug merge, loopback lifecycle.

use crate::descriptor::{EndpointDescriptor, EndpointKind, PortDirection};
use crate::error::Result;
use crate::store::{LoopbackStore, PersistedLoopback};
use crate::watcher::HardwareEnumerator;
use ostinato_core::{fold_key, EventBus, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Broadcast after every successful refresh or mutation, including
/// refreshes that found nothing new (downstream consumers are idempotent).
#[derive(Debug, Clone, Copy)]
pub struct EndpointsChanged;

/// Hot-plug signal from the platform watcher. Directions arrive and
/// depart independently; the catalog merges them per endpoint id.
#[derive(Debug, Clone)]
pub enum HotplugEvent {
    Arrived {
        id: String,
        name: String,
        direction: PortDirection,
    },
    Departed {
        id: String,
        direction: PortDirection,
    },
}

struct Sections {
    /// Folded id → discovered hardware endpoint.
    hardware: HashMap<String, EndpointDescriptor>,
    /// Folded id → persisted user-managed loopback record.
    loopbacks: HashMap<String, PersistedLoopback>,
}

/// Inventory of known endpoints, observable for change.
///
/// Hardware entries are owned by discovery (refresh + hot-plug); loopback
/// entries are owned by the operator and persisted through the store
/// before any in-memory commit, so a failed write leaves the catalog
/// unchanged.
pub struct EndpointCatalog {
    enumerator: Arc<dyn HardwareEnumerator>,
    store: LoopbackStore,
    sections: Mutex<Sections>,
    changed: EventBus<EndpointsChanged>,
}

impl EndpointCatalog {
    pub fn new(enumerator: Arc<dyn HardwareEnumerator>, store: LoopbackStore) -> Self {
        Self {
            enumerator,
            store,
            sections: Mutex::new(Sections {
                hardware: HashMap::new(),
                loopbacks: HashMap::new(),
            }),
            changed: EventBus::new(),
        }
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&EndpointsChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.changed.subscribe(handler)
    }

    /// Ordered snapshot: hardware before loopback, then name
    /// case-insensitively, then id as tiebreak.
    pub fn list(&self) -> Vec<EndpointDescriptor> {
        let sections = self.sections.lock();
        let mut endpoints: Vec<EndpointDescriptor> = sections
            .hardware
            .values()
            .cloned()
            .chain(
                sections
                    .loopbacks
                    .values()
                    .map(|p| EndpointDescriptor::loopback(&p.id, &p.name)),
            )
            .collect();
        drop(sections);
        endpoints.sort_by(|a, b| {
            (a.kind, fold_key(&a.name), fold_key(&a.id)).cmp(&(
                b.kind,
                fold_key(&b.name),
                fold_key(&b.id),
            ))
        });
        endpoints
    }

    /// Look up one endpoint by case-insensitive id.
    pub fn find(&self, id: &str) -> Option<EndpointDescriptor> {
        let key = fold_key(id);
        let sections = self.sections.lock();
        sections.hardware.get(&key).cloned().or_else(|| {
            sections
                .loopbacks
                .get(&key)
                .map(|p| EndpointDescriptor::loopback(&p.id, &p.name))
        })
    }

    /// Re-enumerate hardware and reload the persisted loopback set.
    /// Emits one [`EndpointsChanged`] per successful refresh.
    pub fn refresh(&self) -> Result<()> {
        let mut hardware: HashMap<String, EndpointDescriptor> = HashMap::new();
        for port in self.enumerator.enumerate() {
            merge_direction(&mut hardware, &port.id, &port.name, port.direction);
        }

        let mut loopbacks = HashMap::new();
        for record in self.store.load()? {
            loopbacks.insert(fold_key(&record.id), record);
        }

        {
            let mut sections = self.sections.lock();
            sections.hardware = hardware;
            sections.loopbacks = loopbacks;
        }
        debug!("endpoint catalog refreshed");
        self.changed.emit(&EndpointsChanged);
        Ok(())
    }

    /// Create a user-managed loopback endpoint. A blank name falls back
    /// to `Loopback HHmmss`. The store write happens before the
    /// in-memory commit.
    pub fn create_loopback(&self, name: &str) -> Result<EndpointDescriptor> {
        let name = normalize_loopback_name(name);
        let id = format!("loop:{}", Uuid::new_v4().simple());
        let record = PersistedLoopback::new(&id, &name);

        {
            let mut sections = self.sections.lock();
            let mut persisted = collect_persisted(&sections.loopbacks);
            persisted.push(record.clone());
            self.store.save(&persisted)?;
            sections.loopbacks.insert(fold_key(&id), record);
        }
        info!(id, name, "created loopback endpoint");
        self.changed.emit(&EndpointsChanged);
        Ok(EndpointDescriptor::loopback(id, name))
    }

    /// Rename a user-managed endpoint. Returns false for unknown ids,
    /// hardware ids, or a blank replacement name.
    pub fn rename_loopback(&self, id: &str, new_name: &str) -> Result<bool> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(false);
        }
        let key = fold_key(id);
        {
            let mut sections = self.sections.lock();
            let Some(record) = sections.loopbacks.get(&key) else {
                return Ok(false);
            };
            let mut updated = record.clone();
            updated.name = new_name.to_string();

            let mut persisted = collect_persisted(&sections.loopbacks);
            for entry in &mut persisted {
                if fold_key(&entry.id) == key {
                    entry.name = new_name.to_string();
                }
            }
            self.store.save(&persisted)?;
            sections.loopbacks.insert(key, updated);
        }
        self.changed.emit(&EndpointsChanged);
        Ok(true)
    }

    /// Delete a user-managed endpoint. Returns false for unknown or
    /// hardware ids.
    pub fn delete_loopback(&self, id: &str) -> Result<bool> {
        let key = fold_key(id);
        {
            let mut sections = self.sections.lock();
            if !sections.loopbacks.contains_key(&key) {
                return Ok(false);
            }
            let persisted: Vec<PersistedLoopback> = collect_persisted(&sections.loopbacks)
                .into_iter()
                .filter(|p| fold_key(&p.id) != key)
                .collect();
            self.store.save(&persisted)?;
            sections.loopbacks.remove(&key);
        }
        info!(id, "deleted loopback endpoint");
        self.changed.emit(&EndpointsChanged);
        Ok(true)
    }

    /// Merge one hot-plug signal into the hardware section.
    ///
    /// Arrival ORs the direction into an existing entry (or creates one);
    /// departure clears only that direction and drops the endpoint once
    /// neither direction remains.
    pub fn apply_hotplug(&self, event: HotplugEvent) {
        {
            let mut sections = self.sections.lock();
            match event {
                HotplugEvent::Arrived {
                    id,
                    name,
                    direction,
                } => {
                    debug!(id, ?direction, "hardware endpoint arrived");
                    merge_direction(&mut sections.hardware, &id, &name, direction);
                }
                HotplugEvent::Departed { id, direction } => {
                    debug!(id, ?direction, "hardware endpoint departed");
                    let key = fold_key(&id);
                    if let Some(descriptor) = sections.hardware.get_mut(&key) {
                        match direction {
                            PortDirection::Input => descriptor.supports_input = false,
                            PortDirection::Output => descriptor.supports_output = false,
                        }
                        if !descriptor.supports_input && !descriptor.supports_output {
                            sections.hardware.remove(&key);
                        }
                    }
                }
            }
        }
        self.changed.emit(&EndpointsChanged);
    }
}

fn merge_direction(
    hardware: &mut HashMap<String, EndpointDescriptor>,
    id: &str,
    name: &str,
    direction: PortDirection,
) {
    let descriptor = hardware
        .entry(fold_key(id))
        .or_insert_with(|| EndpointDescriptor::hardware(id, name, direction));
    descriptor.name = name.to_string();
    descriptor.is_online = true;
    match direction {
        PortDirection::Input => descriptor.supports_input = true,
        PortDirection::Output => descriptor.supports_output = true,
    }
}

/// Deterministic persisted order keeps the store file stable across
/// rewrites (and refresh snapshots byte-identical).
fn collect_persisted(loopbacks: &HashMap<String, PersistedLoopback>) -> Vec<PersistedLoopback> {
    let mut persisted: Vec<PersistedLoopback> = loopbacks.values().cloned().collect();
    persisted.sort_by_key(|p| fold_key(&p.id));
    persisted
}

fn normalize_loopback_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        format!("Loopback {}", chrono::Utc::now().format("%H%M%S"))
    } else {
        trimmed.to_string()
    }
}

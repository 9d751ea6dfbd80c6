//! Endpoint inventory for the router.
//!
//! The catalog merges two populations: hardware endpoints discovered via a
//! [`HardwareEnumerator`] (and kept current by hot-plug signals), and
//! user-managed loopback endpoints persisted through [`LoopbackStore`].
//! Every successful mutation or refresh broadcasts [`EndpointsChanged`].

mod catalog;
mod descriptor;
mod error;
mod store;
mod watcher;

pub use catalog::{EndpointCatalog, EndpointsChanged, HotplugEvent};
pub use descriptor::{EndpointDescriptor, EndpointKind, PortDirection};
pub use error::{CatalogError, Result};
pub use store::{LoopbackStore, PersistedLoopback};
pub use watcher::{HardwareEnumerator, HardwarePort, PollingWatcher};

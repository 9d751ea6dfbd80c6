//! The backend-abstract port seam.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Callback for inbound MIDI data. Invoked on backend-chosen threads with
/// one complete message per call; implementations must not block.
pub type InboundSink = Arc<dyn Fn(&str, &[u8], DateTime<Utc>) + Send + Sync>;

/// A live open port. Cheap to clone; `token` disambiguates successive
/// opens of the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortHandle {
    pub endpoint_id: String,
    pub token: u64,
}

/// Opens and closes OS-level ports for one endpoint-id namespace.
///
/// The session routes each endpoint to the first registered provider
/// whose [`owns`](PortProvider::owns) accepts its id prefix, which is how
/// a legacy device layer coexists with the native backend.
pub trait PortProvider: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Whether this provider's namespace contains `endpoint_id`.
    fn owns(&self, endpoint_id: &str) -> bool;

    fn open_input(
        &self,
        endpoint_id: &str,
        sink: InboundSink,
    ) -> std::result::Result<PortHandle, ProviderError>;

    fn open_output(&self, endpoint_id: &str) -> std::result::Result<PortHandle, ProviderError>;

    /// Fire-and-forget write. `PortClosed` means the handle is stale.
    fn send(&self, handle: &PortHandle, bytes: &[u8]) -> std::result::Result<(), ProviderError>;

    /// Idempotent.
    fn close(&self, handle: &PortHandle);
}

//! In-process loopback provider.
//!
//! A loopback endpoint's outbound sends are delivered straight back as
//! inbound packets on the same endpoint id, bypassing the OS entirely.

use crate::error::ProviderError;
use crate::provider::{InboundSink, PortHandle, PortProvider};
use chrono::Utc;
use dashmap::DashMap;
use ostinato_core::fold_key;
use std::sync::atomic::{AtomicU64, Ordering};

pub const LOOPBACK_PREFIX: &str = "loop:";

struct RegisteredSink {
    token: u64,
    /// Id spelling from `open_input`, used as the synthesized source.
    endpoint_id: String,
    sink: InboundSink,
}

/// Provider for the `loop:` namespace. Opens always succeed; `send`
/// echoes to the registered input sink with a fresh timestamp, or drops
/// silently when the input side is closed.
#[derive(Default)]
pub struct LoopbackProvider {
    next_token: AtomicU64,
    sinks: DashMap<String, RegisteredSink>,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }
}

impl PortProvider for LoopbackProvider {
    fn name(&self) -> &str {
        "loopback"
    }

    fn owns(&self, endpoint_id: &str) -> bool {
        fold_key(endpoint_id).starts_with(LOOPBACK_PREFIX)
    }

    fn open_input(
        &self,
        endpoint_id: &str,
        sink: InboundSink,
    ) -> Result<PortHandle, ProviderError> {
        let token = self.next_token();
        self.sinks.insert(
            fold_key(endpoint_id),
            RegisteredSink {
                token,
                endpoint_id: endpoint_id.to_string(),
                sink,
            },
        );
        Ok(PortHandle {
            endpoint_id: endpoint_id.to_string(),
            token,
        })
    }

    fn open_output(&self, endpoint_id: &str) -> Result<PortHandle, ProviderError> {
        Ok(PortHandle {
            endpoint_id: endpoint_id.to_string(),
            token: self.next_token(),
        })
    }

    fn send(&self, handle: &PortHandle, bytes: &[u8]) -> Result<(), ProviderError> {
        if let Some(registered) = self.sinks.get(&fold_key(&handle.endpoint_id)) {
            (registered.sink)(&registered.endpoint_id, bytes, Utc::now());
        }
        Ok(())
    }

    fn close(&self, handle: &PortHandle) {
        let key = fold_key(&handle.endpoint_id);
        // Only the input registration holds state; stale tokens are a no-op.
        self.sinks
            .remove_if(&key, |_, registered| registered.token == handle.token);
    }
}

//! Small observer registry for change notification.
//!
//! Publishers hold an [`EventBus`]; observers call [`EventBus::subscribe`]
//! and keep the returned [`Subscription`] alive for as long as they want
//! callbacks. `emit` snapshots the handler list under a short lock and
//! invokes handlers outside it, so handlers may subscribe elsewhere but
//! must not re-enter the publisher that is notifying them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    handlers: Mutex<Vec<(u64, Handler<E>)>>,
    next_id: AtomicU64,
}

/// Multicast change notification, best-effort and synchronous.
pub struct EventBus<E> {
    registry: Arc<Registry<E>>,
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a handler. Dropping the returned [`Subscription`]
    /// unregisters it.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.lock().push((id, Arc::new(handler)));

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            unsubscribe: Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.handlers.lock().retain(|(hid, _)| *hid != id);
                }
            }),
        }
    }

    /// Invoke every live handler with `event`.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let handlers = self.registry.handlers.lock();
            handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.registry.handlers.lock().len()
    }
}

/// RAII guard for a registered handler.
pub struct Subscription {
    unsubscribe: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    /// Detach without unsubscribing; the handler stays registered for the
    /// lifetime of the publisher.
    pub fn forever(mut self) {
        self.unsubscribe = Box::new(|| {});
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let unsubscribe = std::mem::replace(&mut self.unsubscribe, Box::new(|| {}));
        unsubscribe();
    }
}

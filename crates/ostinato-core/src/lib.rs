//! Shared primitives for the ostinato MIDI router.
//!
//! - [`EventBus`]: small observer registry with RAII unsubscription
//! - [`CancellationToken`]: cooperative cancellation flag
//! - [`fold_key`]: case-insensitive key normalization for endpoint ids

mod cancel;
mod key;
mod observer;

pub use cancel::CancellationToken;
pub use key::fold_key;
pub use observer::{EventBus, Subscription};

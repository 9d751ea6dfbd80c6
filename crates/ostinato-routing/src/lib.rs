//! Routing model: per-route filters, the authoritative route matrix, and
//! the derived source-indexed dispatch map.
//!
//! ```text
//! Operator / config          Dispatch worker
//!       │                          │
//!       ▼                          ▼
//! ┌─────────────┐  RoutesChanged  ┌──────────────┐
//! │ RouteMatrix │────────────────▶│  RouteIndex  │
//! │  (Mutex)    │   rebuild+swap  │ (immutable)  │
//! └─────────────┘                 └──────────────┘
//! ```
//!
//! The matrix serializes mutations; the index is rebuilt on change and
//! published atomically by its owner, so packet handling reads an entire
//! prior or entire new version, never a mix.

mod error;
mod filter;
mod index;
mod matrix;
mod route;

pub use error::{Result, RoutingError};
pub use filter::RouteFilter;
pub use index::RouteIndex;
pub use matrix::{RouteMatrix, RoutesChanged};
pub use route::{RouteDefinition, RouteId};

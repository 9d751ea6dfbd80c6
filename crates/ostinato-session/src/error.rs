//! Error types for providers and the session.

use thiserror::Error;

/// Failures at the port-provider seam.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The endpoint exists but its port could not be opened; the session
    /// skips it and retries on the next reconciliation pass.
    #[error("port unavailable: {0}")]
    PortUnavailable(String),

    /// The handle no longer refers to a live port; the send is dropped.
    #[error("port closed")]
    PortClosed,

    /// Catastrophic backend failure; moves the session to `Faulted`.
    #[error("backend fault: {0}")]
    BackendFault(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Catalog(#[from] ostinato_catalog::CatalogError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

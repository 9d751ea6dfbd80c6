//! Error types for the endpoint catalog.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Persisting the user-managed endpoint list failed; the in-memory
    /// catalog was left unchanged.
    #[error("failed to persist loopback endpoints: {0}")]
    PersistenceFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

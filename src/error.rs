//! Error types for the ostinato facade.

use thiserror::Error;

/// Top-level error aggregating the member crates' failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Routing(#[from] ostinato_routing::RoutingError),

    #[error(transparent)]
    Catalog(#[from] ostinato_catalog::CatalogError),

    #[error(transparent)]
    Session(#[from] ostinato_session::SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration load/save failures that are not recoverable by
/// substituting defaults.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the routing model.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

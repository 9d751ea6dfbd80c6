//! Route identity and definition.

use crate::error::{Result, RoutingError};
use crate::filter::RouteFilter;
use ostinato_core::fold_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque route identifier, stable for the route's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    /// Assign a fresh identifier.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RouteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RouteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed rule from a source endpoint to a target endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub id: RouteId,
    pub source: String,
    pub target: String,
    pub enabled: bool,
    pub filter: RouteFilter,
}

impl RouteDefinition {
    /// Build a validated route with a fresh id.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        filter: RouteFilter,
    ) -> Result<Self> {
        Self::with_id(RouteId::fresh(), source, target, filter)
    }

    /// Build a validated route with a caller-supplied id (config reload).
    pub fn with_id(
        id: RouteId,
        source: impl Into<String>,
        target: impl Into<String>,
        filter: RouteFilter,
    ) -> Result<Self> {
        let route = Self {
            id,
            source: source.into(),
            target: target.into(),
            enabled: true,
            filter,
        };
        route.validate()?;
        Ok(route)
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Source and target must be non-blank and distinct (ids compare
    /// case-insensitively).
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(RoutingError::InvalidRoute("source id is blank".into()));
        }
        if self.target.trim().is_empty() {
            return Err(RoutingError::InvalidRoute("target id is blank".into()));
        }
        if fold_key(&self.source) == fold_key(&self.target) {
            return Err(RoutingError::InvalidRoute(format!(
                "source and target are the same endpoint: {}",
                self.source
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(RouteId::fresh(), RouteId::fresh());
    }

    #[test]
    fn test_new_assigns_id_and_enables() {
        let route = RouteDefinition::new("hw:in", "hw:out", RouteFilter::allow_all()).unwrap();
        assert!(route.enabled);
        assert!(!route.id.as_str().is_empty());
    }

    #[test]
    fn test_rejects_blank_endpoints() {
        assert!(RouteDefinition::new("  ", "hw:out", RouteFilter::allow_all()).is_err());
        assert!(RouteDefinition::new("hw:in", "", RouteFilter::allow_all()).is_err());
    }

    #[test]
    fn test_rejects_self_route_case_insensitively() {
        let err = RouteDefinition::new("HW:Port", "hw:port", RouteFilter::allow_all());
        assert!(matches!(err, Err(RoutingError::InvalidRoute(_))));
    }
}

//! Read-optimized source → routes mapping.

use crate::route::RouteDefinition;
use ostinato_core::fold_key;
use std::collections::HashMap;

/// Immutable dispatch index derived from the matrix. Owners publish new
/// versions with an atomic swap (`arc_swap`); a reader keeps whichever
/// version it fetched for the duration of one packet.
#[derive(Debug, Default)]
pub struct RouteIndex {
    by_source: HashMap<String, Vec<RouteDefinition>>,
}

impl RouteIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group routes by case-folded source, preserving the order of the
    /// input sequence within each group. Disabled routes are indexed too;
    /// the dispatcher checks `enabled` per packet.
    pub fn build(routes: &[RouteDefinition]) -> Self {
        let mut by_source: HashMap<String, Vec<RouteDefinition>> = HashMap::new();
        for route in routes {
            by_source
                .entry(fold_key(&route.source))
                .or_default()
                .push(route.clone());
        }
        Self { by_source }
    }

    /// Routes originating at `source_id`; empty when none.
    #[inline]
    pub fn routes_for(&self, source_id: &str) -> &[RouteDefinition] {
        self.by_source
            .get(&fold_key(source_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn route_count(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

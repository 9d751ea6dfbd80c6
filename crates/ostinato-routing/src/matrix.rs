//! The authoritative, observable set of routes.

use crate::error::Result;
use crate::route::{RouteDefinition, RouteId};
use ostinato_core::{fold_key, EventBus, Subscription};
use parking_lot::Mutex;
use tracing::debug;

/// Broadcast when the route set changes.
#[derive(Debug, Clone, Copy)]
pub struct RoutesChanged;

/// Canonical route set. Mutations serialize through an internal lock and
/// notify observers after the lock is released, so handlers may read the
/// matrix but must not mutate it re-entrantly.
#[derive(Default)]
pub struct RouteMatrix {
    routes: Mutex<Vec<RouteDefinition>>,
    changed: EventBus<RoutesChanged>,
}

impl RouteMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot ordered by case-folded (source, target), id as tiebreak.
    pub fn list(&self) -> Vec<RouteDefinition> {
        let mut routes = self.routes.lock().clone();
        routes.sort_by(|a, b| {
            (fold_key(&a.source), fold_key(&a.target), &a.id).cmp(&(
                fold_key(&b.source),
                fold_key(&b.target),
                &b.id,
            ))
        });
        routes
    }

    pub fn get(&self, id: &RouteId) -> Option<RouteDefinition> {
        self.routes.lock().iter().find(|r| &r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }

    /// Insert or replace by id.
    pub fn upsert(&self, route: RouteDefinition) -> Result<()> {
        route.validate()?;
        {
            let mut routes = self.routes.lock();
            match routes.iter_mut().find(|r| r.id == route.id) {
                Some(existing) => *existing = route,
                None => routes.push(route),
            }
        }
        self.changed.emit(&RoutesChanged);
        Ok(())
    }

    /// Remove by id; notifies only on actual removal.
    pub fn remove(&self, id: &RouteId) -> bool {
        let removed = {
            let mut routes = self.routes.lock();
            let before = routes.len();
            routes.retain(|r| &r.id != id);
            routes.len() != before
        };
        if removed {
            self.changed.emit(&RoutesChanged);
        }
        removed
    }

    /// Atomically replace the whole set. Emits exactly one change
    /// notification; on validation failure the matrix is untouched.
    pub fn replace_all(&self, routes: impl IntoIterator<Item = RouteDefinition>) -> Result<()> {
        let routes: Vec<RouteDefinition> = routes.into_iter().collect();
        for route in &routes {
            route.validate()?;
        }
        debug!(count = routes.len(), "route set replaced");
        *self.routes.lock() = routes;
        self.changed.emit(&RoutesChanged);
        Ok(())
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&RoutesChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.changed.subscribe(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RouteFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn route(source: &str, target: &str) -> RouteDefinition {
        RouteDefinition::new(source, target, RouteFilter::allow_all()).unwrap()
    }

    fn change_counter(matrix: &RouteMatrix) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sub = matrix.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_upsert_inserts_then_replaces() {
        let matrix = RouteMatrix::new();
        let (changes, _sub) = change_counter(&matrix);

        let mut r = route("hw:in", "hw:out");
        matrix.upsert(r.clone()).unwrap();
        assert_eq!(matrix.len(), 1);

        r.enabled = false;
        matrix.upsert(r.clone()).unwrap();
        assert_eq!(matrix.len(), 1);
        assert!(!matrix.get(&r.id).unwrap().enabled);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_upsert_rejects_invalid_route() {
        let matrix = RouteMatrix::new();
        let (changes, _sub) = change_counter(&matrix);

        let mut bad = route("hw:in", "hw:out");
        bad.target = "HW:IN".to_string();
        assert!(matrix.upsert(bad).is_err());
        assert!(matrix.is_empty());
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_notifies_only_on_removal() {
        let matrix = RouteMatrix::new();
        let r = route("hw:in", "hw:out");
        matrix.upsert(r.clone()).unwrap();

        let (changes, _sub) = change_counter(&matrix);
        assert!(matrix.remove(&r.id));
        assert!(!matrix.remove(&r.id));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_all_emits_single_change() {
        let matrix = RouteMatrix::new();
        matrix.upsert(route("hw:a", "hw:b")).unwrap();

        let (changes, _sub) = change_counter(&matrix);
        matrix
            .replace_all([route("hw:c", "hw:d"), route("hw:e", "hw:f")])
            .unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_all_validation_failure_leaves_matrix() {
        let matrix = RouteMatrix::new();
        matrix.upsert(route("hw:a", "hw:b")).unwrap();

        let mut bad = route("hw:c", "hw:d");
        bad.source = String::new();
        assert!(matrix.replace_all([bad]).is_err());
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.list()[0].source, "hw:a");
    }

    #[test]
    fn test_list_is_ordered_by_source_then_target() {
        let matrix = RouteMatrix::new();
        matrix.upsert(route("hw:b", "hw:z")).unwrap();
        matrix.upsert(route("hw:A", "hw:y")).unwrap();
        matrix.upsert(route("hw:a", "hw:x")).unwrap();

        let pairs: Vec<(String, String)> = matrix
            .list()
            .into_iter()
            .map(|r| (r.source, r.target))
            .collect();
        assert_eq!(pairs[0].1, "hw:x");
        assert_eq!(pairs[1].1, "hw:y");
        assert_eq!(pairs[2].0, "hw:b");
    }
}

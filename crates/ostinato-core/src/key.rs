//! Case-insensitive key handling for endpoint ids.

/// Normalize an id for lookup. Endpoint ids are case-insensitive, so maps
/// key on the folded form and keep the original spelling for display.
#[inline]
pub fn fold_key(id: &str) -> String {
    id.to_lowercase()
}

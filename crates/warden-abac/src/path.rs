//! Dotted-path attribute lookup.
//!
//! Paths traverse nested JSON objects one segment at a time. A missing
//! segment, an empty segment, or a non-object intermediate value yields
//! `None` ("undefined"), which every operator except `neq` treats as a
//! non-match.

use serde_json::Value;

/// Namespaces of the merged evaluation context, in fallback order.
pub const NAMESPACES: [&str; 3] = ["principal", "resource", "context"];

/// Looks up `path` starting at `root`.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Resolves `path` against the merged context.
///
/// The path is first looked up from the root. When that fails and the path
/// is not already namespaced, each namespace (`principal`, `resource`,
/// `context`) is tried in turn, so `department` finds
/// `principal.department`.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(found) = lookup(root, path) {
        return Some(found);
    }

    let first = path.split('.').next().unwrap_or_default();
    if NAMESPACES.contains(&first) {
        return None;
    }

    NAMESPACES
        .iter()
        .filter_map(|ns| root.get(*ns))
        .find_map(|scope| lookup(scope, path))
}

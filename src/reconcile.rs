//! The reconciliation registry collaborator.
//!
//! Tracks which paths currently believe they need a reconciliation pass
//! (pending local updates not yet known to agree with the remote value).
//! [`crate::opendir::OpenDir`] registers and deregisters itself here as its
//! `needs_reconciliation` hint flips.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// A registry of paths that may need a reconciliation pass.
pub trait ReconciliationSet: Send + Sync {
    /// Mark `path` as needing reconciliation.
    fn add(&self, path: &str);
    /// Clear any previously recorded need for `path`.
    fn remove(&self, path: &str);
    /// True if `path` is currently marked.
    fn contains(&self, path: &str) -> bool;
}

/// An in-memory `ReconciliationSet` backed by a `HashSet`.
#[derive(Clone, Default)]
pub struct InMemoryReconciliationSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryReconciliationSet {
    /// A fresh, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of paths currently marked.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if no paths are currently marked.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl ReconciliationSet for InMemoryReconciliationSet {
    fn add(&self, path: &str) {
        self.inner.lock().insert(path.to_string());
    }

    fn remove(&self, path: &str) {
        self.inner.lock().remove(path);
    }

    fn contains(&self, path: &str) -> bool {
        self.inner.lock().contains(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_remove_roundtrip() {
        let set = InMemoryReconciliationSet::new();
        assert!(!set.contains("/a"));
        set.add("/a");
        assert!(set.contains("/a"));
        set.remove("/a");
        assert!(!set.contains("/a"));
    }
}

//! Pending, not-yet-persisted mutations to a directory.

use serde::{Deserialize, Serialize};

/// The kind of change an [`OpenDirUpdate`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum UpdateKind {
    /// An entry was added.
    Add,
    /// An entry was removed.
    Delete,
}

/// A single pending mutation to a directory: add or remove one entry.
///
/// Updates are versioned; within one [`crate::opendir::OpenDir`]'s pending
/// list, at most one update survives per entry name, and it is always the
/// one with the highest `version` seen for that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDirUpdate {
    /// The entry name this update applies to.
    pub name: String,
    /// Whether the entry was added or removed.
    pub kind: UpdateKind,
    /// Monotonic version; a later update with a lower or equal version than
    /// one already recorded for the same name is stale and discarded.
    pub version: u64,
}

impl OpenDirUpdate {
    /// Construct a new pending update.
    pub fn new(name: impl Into<String>, kind: UpdateKind, version: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            version,
        }
    }
}

//! The immutable-by-convention directory snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::update::{OpenDirUpdate, UpdateKind};

/// A single directory entry as stored in a [`DirData`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// The version this entry was last written at.
    pub version: u64,
}

/// An opaque, name-ordered snapshot of a directory's contents.
///
/// `DirData` is immutable by convention: every operation on it takes a value
/// and returns a new one rather than mutating in place, which keeps the
/// merge algorithm in [`crate::opendir::OpenDir::add_dir_data`] simple to
/// reason about even though the enclosing `OpenDir` is itself mutable.
///
/// Entries are kept in a name-sorted map, so two `DirData` values with the
/// same logical contents are `==` and serialize identically regardless of
/// the order operations produced them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirData {
    entries: BTreeMap<String, DirEntry>,
}

/// The outcome of merging two [`DirData`] snapshots.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The merged result: for each name, the entry with the higher version
    /// (ties keep `a`'s entry).
    pub result: DirData,
    /// Whether `a` had a name, or a higher version of a shared name, that
    /// `b` lacked.
    pub a_not_in_b: bool,
    /// Whether `b` had a name, or a higher version of a shared name, that
    /// `a` lacked.
    pub b_not_in_a: bool,
}

impl DirData {
    /// An empty directory snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a `DirData` from an iterator of `(name, version)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, version)| (name, DirEntry { version }))
                .collect(),
        }
    }

    /// True if this snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of entries in this snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up a single entry by name.
    pub fn get(&self, name: &str) -> Option<DirEntry> {
        self.entries.get(name).copied()
    }

    /// Iterate over `(name, entry)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DirEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Three-way merge of two snapshots.
    ///
    /// For each name present in either side, the entry with the higher
    /// version wins (a tie keeps `a`'s entry). `a_not_in_b`/`b_not_in_a`
    /// report whether either side held information — a name, or a strictly
    /// higher version of a shared name — that the other side lacked, which
    /// callers use to decide whether a write-back or a local update is
    /// warranted.
    pub fn merge(a: &DirData, b: &DirData) -> MergeOutcome {
        let mut result = BTreeMap::new();
        let mut a_not_in_b = false;
        let mut b_not_in_a = false;

        for (name, &entry) in &a.entries {
            match b.entries.get(name) {
                None => {
                    a_not_in_b = true;
                    result.insert(name.clone(), entry);
                }
                Some(&other) => {
                    if entry.version > other.version {
                        a_not_in_b = true;
                        result.insert(name.clone(), entry);
                    } else if other.version > entry.version {
                        b_not_in_a = true;
                        result.insert(name.clone(), other);
                    } else {
                        result.insert(name.clone(), entry);
                    }
                }
            }
        }
        for (name, &entry) in &b.entries {
            if !a.entries.contains_key(name) {
                b_not_in_a = true;
                result.insert(name.clone(), entry);
            }
        }

        MergeOutcome {
            result: DirData { entries: result },
            a_not_in_b,
            b_not_in_a,
        }
    }

    /// Deterministically fold a list of pending updates into this snapshot.
    ///
    /// An `Add` with `version` strictly greater than any existing entry for
    /// that name installs it (or inserts it, if absent); a `Delete` removes
    /// the entry only if its `version` is at least the existing entry's.
    /// Stale updates (lower or equal version where that ordering would be a
    /// no-op) leave the snapshot untouched.
    pub fn apply_updates(dd: &DirData, updates: &[OpenDirUpdate]) -> DirData {
        let mut entries = dd.entries.clone();
        for update in updates {
            match update.kind {
                UpdateKind::Add => {
                    let stale = entries
                        .get(&update.name)
                        .is_some_and(|existing| existing.version >= update.version);
                    if !stale {
                        entries.insert(
                            update.name.clone(),
                            DirEntry {
                                version: update.version,
                            },
                        );
                    }
                }
                UpdateKind::Delete => {
                    let keep = entries
                        .get(&update.name)
                        .is_some_and(|existing| existing.version > update.version);
                    if !keep {
                        entries.remove(&update.name);
                    }
                }
            }
        }
        DirData { entries }
    }
}

//! The remote key-value store collaborator.
//!
//! This module defines the boundary between the directory cache pipeline and
//! the actual key-value transport. A real deployment backs [`KvsSession`]
//! with a networked client; this crate ships only the in-memory test double
//! ([`InMemoryKvsSession`]) and a fault-injecting wrapper
//! ([`FaultInjectingSession`]) used by this crate's own scenario tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dirdata::DirData;

/// Metadata returned alongside a value from the key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueMetadata {
    /// The version this value was written at.
    pub version: u64,
    /// An identifier for whoever wrote this value, used to tell
    /// self-written values apart from ones written elsewhere.
    pub creator_id: u64,
}

/// Why a per-key operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureCause {
    /// The key has no value.
    NoSuchValue,
    /// Multiple concurrent values were observed for the key; the store could
    /// not produce a single authoritative answer.
    Multiple,
    /// Any other failure (transport, serialization, etc).
    Error,
}

/// The per-key outcome of a [`KvsSession::multi_get`] call.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum KeyState {
    /// The key-value store returned a value and its metadata.
    Succeeded {
        /// The stored directory snapshot.
        value: DirData,
        /// The value's version and creator.
        metadata: ValueMetadata,
    },
    /// The operation did not finish (timeout, retry budget exhausted, etc).
    Incomplete,
    /// The operation failed outright.
    Failed(FailureCause),
}

/// An error returned directly by a [`KvsSession`] call, distinct from a
/// per-key [`KeyState::Failed`] (which is reported per key, not as a call
/// error).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum KvsError {
    /// The underlying transport or session is unusable.
    #[error("key-value session error: {0}")]
    Session(String),
}

/// A session against the remote key-value store.
///
/// Implementations are expected to be cheap to hold one-per-worker-thread;
/// [`crate::reader::DirDataReader`] keeps a dedicated session per
/// [`crate::batch::BatchQueueProcessor`] worker rather than sharing one
/// across threads.
pub trait KvsSession: Send {
    /// Fetch the current value and metadata for each of `keys`, in order.
    /// Returns exactly one [`KeyState`] per input key.
    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<KeyState>, KvsError>;

    /// Write `value` for `key`, replacing whatever was there.
    fn put(&mut self, key: &str, value: DirData, metadata: ValueMetadata) -> Result<(), KvsError>;
}

#[derive(Default)]
struct Stored {
    value: DirData,
    metadata: ValueMetadata,
}

impl Default for ValueMetadata {
    fn default() -> Self {
        ValueMetadata {
            version: 0,
            creator_id: 0,
        }
    }
}

/// An in-memory `KvsSession` backed by a shared `HashMap`.
///
/// Multiple `InMemoryKvsSession` handles created from the same
/// [`InMemoryKvsSession::shared`] store share state, which lets tests model
/// one worker's write-back becoming visible to another worker's read.
#[derive(Clone)]
pub struct InMemoryKvsSession {
    store: Arc<Mutex<HashMap<String, Stored>>>,
}

impl InMemoryKvsSession {
    /// A fresh, empty, unshared store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Clone a handle to the same backing store as `self`; use this to hand
    /// each worker thread its own session object over shared state.
    pub fn shared(&self) -> Self {
        self.clone()
    }

    /// Seed the store with an initial value, as if written at `version` by
    /// `creator_id`.
    pub fn seed(&self, key: impl Into<String>, value: DirData, version: u64, creator_id: u64) {
        self.store.lock().insert(
            key.into(),
            Stored {
                value,
                metadata: ValueMetadata {
                    version,
                    creator_id,
                },
            },
        );
    }
}

impl Default for InMemoryKvsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl KvsSession for InMemoryKvsSession {
    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<KeyState>, KvsError> {
        let store = self.store.lock();
        Ok(keys
            .iter()
            .map(|k| match store.get(k) {
                Some(stored) => KeyState::Succeeded {
                    value: stored.value.clone(),
                    metadata: stored.metadata,
                },
                None => KeyState::Failed(FailureCause::NoSuchValue),
            })
            .collect())
    }

    fn put(&mut self, key: &str, value: DirData, metadata: ValueMetadata) -> Result<(), KvsError> {
        self.store.lock().insert(
            key.to_string(),
            Stored {
                value,
                metadata,
            },
        );
        Ok(())
    }
}

/// Wraps another [`KvsSession`] and forces specific keys to fail in a
/// specific way, for deterministic scenario testing.
pub struct FaultInjectingSession<S> {
    inner: S,
    faults: Arc<Mutex<HashMap<String, KeyState>>>,
}

impl<S: KvsSession> FaultInjectingSession<S> {
    /// Wrap `inner`, with no faults configured yet.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Force `key` to resolve to `state` on the next (and every subsequent)
    /// `multi_get` until [`Self::clear_fault`] is called.
    pub fn inject(&self, key: impl Into<String>, state: KeyState) {
        self.faults.lock().insert(key.into(), state);
    }

    /// Remove a previously injected fault for `key`.
    pub fn clear_fault(&self, key: &str) {
        self.faults.lock().remove(key);
    }
}

impl<S: KvsSession + Clone> Clone for FaultInjectingSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            faults: self.faults.clone(),
        }
    }
}

impl<S: KvsSession> KvsSession for FaultInjectingSession<S> {
    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<KeyState>, KvsError> {
        let mut results = self.inner.multi_get(keys)?;
        let faults = self.faults.lock();
        for (key, result) in keys.iter().zip(results.iter_mut()) {
            if let Some(forced) = faults.get(key) {
                *result = forced.clone();
            }
        }
        Ok(results)
    }

    fn put(&mut self, key: &str, value: DirData, metadata: ValueMetadata) -> Result<(), KvsError> {
        self.inner.put(key, value, metadata)
    }
}

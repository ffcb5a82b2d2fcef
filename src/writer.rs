//! The write-back collaborator.
//!
//! `OpenDir::add_dir_data` decides, while its lock is held, that a path's
//! locally novel content needs writing back to the key-value store; the
//! actual write is dispatched through an [`OpenDirWriter`] only after the
//! lock has been released (see the design notes in `SPEC_FULL.md` §9 on why
//! this crate does not use a reentrant mutex).

use tracing::debug;

use crate::opendir::OpenDir;

/// Requests a write-back of a directory's pending content.
///
/// Implementations are fire-and-forget: the caller does not wait for the
/// write to complete. [`crate::opendir::OpenDir::set_queued_for_write`]
/// guarantees at most one outstanding write-back per path is requested at a
/// time. `od` is passed alongside `path` so an implementation can read the
/// directory's current content directly rather than re-fetching it from the
/// cache.
pub trait OpenDirWriter: Send + Sync {
    /// Request that `path` be written back.
    fn write_dir(&self, path: &str, od: &OpenDir);
}

/// A writer that only logs the request; useful when write-back is not
/// needed (for example, read-only deployments or tests that only care about
/// the read path).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWriter;

impl OpenDirWriter for NoopWriter {
    fn write_dir(&self, path: &str, _od: &OpenDir) {
        debug!(path, "write-back requested (no-op writer)");
    }
}

/// A writer that records every request it received, for test assertions.
#[derive(Clone)]
pub struct RecordingWriter {
    sender: crossbeam_channel::Sender<String>,
    /// The receiving end; tests drain this to observe write-back requests.
    pub receiver: crossbeam_channel::Receiver<String>,
}

impl RecordingWriter {
    /// A fresh recorder with an unbounded backlog.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }
}

impl Default for RecordingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenDirWriter for RecordingWriter {
    fn write_dir(&self, path: &str, _od: &OpenDir) {
        let _ = self.sender.send(path.to_string());
    }
}

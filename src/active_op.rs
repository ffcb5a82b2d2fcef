//! A completion handle shared between one producer and any number of
//! waiters, blocking on real OS threads instead of awaiting a future.
//!
//! This is the blocking-thread translation of the `Shared<oneshot::Receiver<_>>`
//! dedup pattern `tor-chanmgr` uses for in-flight channel builds
//! (`mgr.rs`'s `Pending<C>`/`Sending<C>` and `get_or_launch_internal`'s
//! `Action::{Launch, Wait, Return}`): there, multiple callers `.await` a
//! clone of the same shared future; here, they block on the same
//! [`std::sync::Arc`]'d [`ActiveOp`] via a condition variable instead.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// What kind of fetch an [`ActiveOp`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestKind {
    /// The first fetch for a path not yet in the cache.
    Initial,
    /// A refresh of a path already in the cache.
    Update,
}

/// The request an [`ActiveOp`] was created to satisfy.
#[derive(Debug, Clone)]
pub struct Request {
    /// The path being fetched.
    pub path: String,
    /// Whether this is the path's first fetch or a refresh.
    pub kind: RequestKind,
}

struct Completion {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// A single outstanding fetch, shared by every caller currently waiting on
/// it. Reference-counted via [`Arc`]; the last dropped reference releases
/// the op entirely.
pub struct ActiveOp {
    request: Request,
    completion: Completion,
}

/// A shared handle to an [`ActiveOp`]. Cloning this is how multiple callers
/// attach to the same in-flight fetch.
pub type ActiveOpRef = Arc<ActiveOp>;

impl ActiveOp {
    /// Create a new, incomplete op for `request`.
    pub fn new(request: Request) -> ActiveOpRef {
        Arc::new(ActiveOp {
            request,
            completion: Completion {
                done: Mutex::new(false),
                condvar: Condvar::new(),
            },
        })
    }

    /// The request this op was created for.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mark this op complete and wake every thread blocked in
    /// [`Self::wait_for_completion`]. Idempotent.
    pub fn set_complete(&self) {
        let mut done = self.completion.done.lock();
        *done = true;
        self.completion.condvar.notify_all();
    }

    /// True if [`Self::set_complete`] has been called.
    pub fn is_complete(&self) -> bool {
        *self.completion.done.lock()
    }

    /// Block the calling thread until this op is marked complete. Returns
    /// immediately if it already is.
    pub fn wait_for_completion(&self) {
        let mut done = self.completion.done.lock();
        while !*done {
            self.completion.condvar.wait(&mut done);
        }
    }
}

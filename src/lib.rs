//! An in-memory directory-metadata cache and batched read pipeline over a
//! remote key-value store.
//!
//! A directory's contents live in the key-value store as an opaque
//! [`dirdata::DirData`] snapshot, keyed by path. This crate layers a mutable,
//! per-path cache ([`opendir::OpenDir`], held by [`cache::OpenDirCache`])
//! over that store, deduplicates concurrent fetches for the same path
//! ([`active_op`]), and batches the actual key-value round trips through a
//! bounded worker pool ([`batch::BatchQueueProcessor`]). [`reader::DirDataReader`]
//! is the orchestrator callers talk to.
//!
//! Concurrency here is plain OS threads blocking on condition variables, not
//! `async`/`.await`: every wait point in this crate parks the calling thread
//! rather than suspending a future.
// @@ begin lint list maintained by maint/add_warning @@
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::implicit_clone)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![deny(clippy::unchecked_duration_subtraction)]
#![deny(clippy::unwrap_used)]
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->

pub mod active_op;
pub mod batch;
pub mod cache;
pub mod config;
pub mod dirdata;
pub mod err;
pub mod kvs;
pub mod opendir;
pub mod reader;
pub mod reconcile;
pub mod stats;
pub mod update;
pub mod writer;

pub use active_op::{ActiveOp, ActiveOpRef, Request, RequestKind};
pub use cache::OpenDirCache;
pub use config::{DirCacheConfig, DirCacheConfigBuilder};
pub use dirdata::{DirData, DirEntry, MergeOutcome};
pub use err::Error;
pub use kvs::{
    FailureCause, FaultInjectingSession, InMemoryKvsSession, KeyState, KvsError, KvsSession,
    ValueMetadata,
};
pub use opendir::OpenDir;
pub use reader::{CreateMode, DirDataReader};
pub use reconcile::{InMemoryReconciliationSet, ReconciliationSet};
pub use update::{OpenDirUpdate, UpdateKind};
pub use writer::{NoopWriter, OpenDirWriter, RecordingWriter};

/// A `Result` alias using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

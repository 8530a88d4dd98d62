//! Error taxonomy shared by every layer of the storage engine.

use std::io;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced node/relationship does not exist, or its slot is
    /// unallocated for the current snapshot.
    #[error("unknown id: {0}")]
    UnknownId(String),

    /// Property-chain walk reached its end without finding the key.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// No index exists for the requested (label, property) pair.
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// The graph directory is missing on open.
    #[error("unknown database at {0}")]
    UnknownDb(String),

    /// `property_item` accessed with a type incompatible with its tag.
    #[error("invalid typecast: {0}")]
    InvalidTypecast(String),

    /// MVCC conflict: write-write lock failure, write behind read
    /// timestamp, or no valid version for the reader's snapshot.
    #[error("transaction aborted: {0}")]
    TransactionAbort(String),

    /// Storage API invoked with no active transaction bound to the
    /// calling thread.
    #[error("operation requires an active transaction")]
    OutOfTransactionScope,

    /// `begin_transaction` called while one is already active on this
    /// thread.
    #[error("a transaction is already active on this thread")]
    InvalidNested,

    /// `delete_node` attempted while an incident relationship is still
    /// visible.
    #[error("node {0} still has visible incident relationships")]
    OrphanedRelationship(u64),

    /// Chunked-vector access past the allocated capacity.
    #[error("index {0} out of range")]
    IndexOutOfRange(u64),

    /// Import-side collaborator reported a missing file.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// All buffer pool frames are pinned; no eviction is possible.
    #[error("buffer pool overrun: all frames pinned")]
    BufferPoolOverrun,
}

/// Acquires a mutex, treating poisoning as a fatal corruption condition
/// rather than propagating a panic across an unrelated call stack.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        error!("storage engine mutex poisoned - treating as fatal corruption");
        GraphError::Corruption("mutex poisoned".into())
    })
}

//! Coordinates transaction ids, the active-transaction set, and the
//! GC watermark used to reclaim dirty MVCC versions and WAL-tracked
//! undo information.
//!
//! Transaction ids are a monotonic atomic counter, not random: xid
//! order is commit/begin order, which the MVCC visibility check in
//! [`crate::storage::mvcc`] depends on directly (`bts <= xid < cts`).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{acquire_lock, Result};
use crate::txn::transaction::{self, Transaction, TxState};
use crate::txn::{XId, INF};

struct Inner {
    active: BTreeSet<XId>,
    gc_queue: Vec<XId>,
}

/// One transaction manager per open graph. `begin`/`commit`/`abort`
/// drive the thread-local [`Transaction`] handle; [`oldest_active`]
/// is the GC watermark other components use to decide which dirty
/// versions are safe to reclaim.
pub struct TransactionManager {
    next_xid: AtomicU64,
    inner: Mutex<Inner>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_xid: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                active: BTreeSet::new(),
                gc_queue: Vec::new(),
            }),
        }
    }

    /// Restores the xid counter past every id observed in the WAL during
    /// recovery, so new transactions never reuse an id a committed (or
    /// even aborted) one already used.
    pub fn fast_forward(&self, highest_seen: XId) {
        let mut cur = self.next_xid.load(Ordering::SeqCst);
        while highest_seen >= cur {
            match self
                .next_xid
                .compare_exchange(cur, highest_seen + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Starts a new transaction, binds it to the calling thread, and
    /// returns its id. Callers must not already have an active
    /// transaction on this thread (checked by [`crate::db`] before
    /// calling, which raises `InvalidNested` otherwise).
    pub fn begin(&self) -> Result<XId> {
        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst);
        acquire_lock(&self.inner)?.active.insert(xid);
        transaction::bind(Transaction::new(xid));
        debug!(xid, "transaction begin");
        Ok(xid)
    }

    /// Removes `xid` from the active set. Called by commit and abort
    /// alike; the caller is responsible for finalizing or rolling back
    /// the transaction's dirty versions first.
    pub fn end(&self, xid: XId, final_state: TxState) -> Result<()> {
        {
            let mut inner = acquire_lock(&self.inner)?;
            inner.active.remove(&xid);
            if final_state == TxState::Committed {
                inner.gc_queue.push(xid);
            }
        }
        debug!(xid, ?final_state, "transaction end");
        Ok(())
    }

    /// The oldest transaction id still active, or `INF` if none. A
    /// dirty version with `cts <= oldest_active()` cannot be visible to
    /// any live reader and is safe to reclaim.
    pub fn oldest_active(&self) -> XId {
        acquire_lock(&self.inner)
            .ok()
            .and_then(|inner| inner.active.iter().next().copied())
            .unwrap_or(INF)
    }

    pub fn active_count(&self) -> usize {
        acquire_lock(&self.inner).map(|i| i.active.len()).unwrap_or(0)
    }

    /// Drains transactions queued for vacuum since the last call,
    /// handing them to the caller (the `db` facade) which knows how to
    /// walk each one's touched records and reclaim dirty versions /
    /// splice tombstones out of chunked vectors.
    pub fn drain_gc_queue(&self) -> Vec<XId> {
        acquire_lock(&self.inner).map(|mut i| std::mem::take(&mut i.gc_queue)).unwrap_or_default()
    }

    pub fn vacuum_pass_size_hint(&self) -> usize {
        acquire_lock(&self.inner).map(|i| i.gc_queue.len()).unwrap_or(0)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

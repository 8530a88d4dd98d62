//! Multi-version read/write protocol over [`NodeRecord`]/[`RelationshipRecord`].
//!
//! The persisted record always holds the latest *committed* version.
//! While a transaction is editing a record, its in-progress copy lives
//! in an in-memory-only dirty chain keyed by the record's logical
//! offset — never written to a page, never logged as its own entity
//! (only the WAL records produced at commit describe it). A reader
//! walks the dirty chain looking for a version whose `[bts, cts)`
//! window contains its own transaction id; if none qualifies and a
//! version is locked by someone else, the reader aborts rather than
//! blocking (no-wait).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{acquire_lock, GraphError, Result};
use crate::storage::record::{MvccHeader, INF};
use crate::txn::XId;

/// One speculative version of a record, produced by transaction
/// `header.txn_id` and not yet visible outside it.
#[derive(Debug, Clone)]
pub struct DirtyVersion<T> {
    pub header: MvccHeader,
    pub value: T,
    /// True if this is an update of an existing record, false if the
    /// record was newly inserted by this transaction.
    pub updated: bool,
}

/// Per-record side table of in-progress versions, keyed by logical
/// offset. Never persisted; rebuilt empty on every open (including
/// after recovery, since only committed state survives a restart).
pub struct DirtyChains<T> {
    chains: Mutex<HashMap<u64, Vec<DirtyVersion<T>>>>,
}

impl<T: Clone> DirtyChains<T> {
    pub fn new() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Installs `version` as the dirty entry for `offset`. A
    /// transaction holds at most one draft per record: a second call
    /// for the same `(offset, txn_id)` (e.g. a relationship insert
    /// updating an endpoint node's list head right after that node's
    /// own insert, in the same transaction) replaces the prior draft
    /// rather than shadowing it behind it in the chain.
    pub fn add_version(&self, offset: u64, version: DirtyVersion<T>) -> Result<()> {
        let mut chains = acquire_lock(&self.chains)?;
        let versions = chains.entry(offset).or_default();
        if let Some(slot) = versions.iter_mut().find(|dv| dv.header.txn_id == version.header.txn_id) {
            *slot = version;
        } else {
            versions.push(version);
        }
        Ok(())
    }

    /// Finds the version valid for `xid`: either one it already holds
    /// the lock on, or an unlocked version whose timestamp window
    /// contains `xid`. Returns `Ok(None)` if nothing qualifies and no
    /// record locked by another transaction was seen (caller falls back
    /// to the persisted record); returns `Err(TransactionAbort)` if a
    /// version locked by another transaction was seen and no valid one
    /// was found. An unlocked version whose window simply doesn't cover
    /// `xid` (an archived pre-image superseded by a later commit, not
    /// yet reclaimed by `gc`) is not a conflict — it's just stale.
    pub fn find_valid_version(&self, offset: u64, xid: XId) -> Result<Option<T>> {
        let chains = acquire_lock(&self.chains)?;
        let Some(versions) = chains.get(&offset) else {
            return Ok(None);
        };
        let mut locked_by_other = false;
        for dv in versions {
            if dv.header.is_locked() && !dv.header.is_locked_by(xid) {
                locked_by_other = true;
                continue;
            }
            if dv.header.is_valid_for(xid) {
                return Ok(Some(dv.value.clone()));
            }
            if dv.header.is_locked_by(xid) && dv.header.bts == dv.header.cts {
                return Err(GraphError::UnknownId(offset.to_string()));
            }
        }
        if locked_by_other {
            Err(GraphError::TransactionAbort(format!(
                "no valid version of record {offset} visible to transaction {xid}"
            )))
        } else {
            Ok(None)
        }
    }

    /// Like [`find_valid_version`] but returns the whole entry (header
    /// included), so a caller can tell an update from a tombstone
    /// (`bts == cts`) before splicing it into committed storage.
    pub fn find_valid_entry(&self, offset: u64, xid: XId) -> Result<Option<DirtyVersion<T>>> {
        let chains = acquire_lock(&self.chains)?;
        let Some(versions) = chains.get(&offset) else {
            return Ok(None);
        };
        for dv in versions {
            if dv.header.is_locked_by(xid) {
                return Ok(Some(dv.clone()));
            }
        }
        Ok(None)
    }

    pub fn has_dirty_versions(&self, offset: u64) -> bool {
        acquire_lock(&self.chains)
            .map(|c| c.get(&offset).map(|v| !v.is_empty()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Removes every speculative version `xid` holds at `offset` (used
    /// on abort/rollback: covers both inserts/updates, which carry
    /// `cts == INF`, and delete tombstones, which carry a finite `cts`).
    pub fn remove_version(&self, offset: u64, xid: XId) -> Result<()> {
        let mut chains = acquire_lock(&self.chains)?;
        if let Some(versions) = chains.get_mut(&offset) {
            versions.retain(|dv| dv.header.txn_id != xid);
            if versions.is_empty() {
                chains.remove(&offset);
            }
        }
        Ok(())
    }

    /// Installs `version` unconditionally, without the per-`txn_id`
    /// dedup `add_version` applies. Used to archive a pre-write snapshot
    /// of a record (an unlocked, already-closed `[bts, cts)` window)
    /// alongside the writer's own locked draft for the same offset.
    pub fn archive_version(&self, offset: u64, version: DirtyVersion<T>) -> Result<()> {
        let mut chains = acquire_lock(&self.chains)?;
        chains.entry(offset).or_default().push(version);
        Ok(())
    }

    /// Reclaims every version whose `cts` is at or below `oldest_xid`:
    /// no reader whose snapshot predates `oldest_xid` can still need it.
    pub fn gc(&self, oldest_xid: XId) -> Result<usize> {
        let mut chains = acquire_lock(&self.chains)?;
        let mut reclaimed = 0;
        chains.retain(|_, versions| {
            let before = versions.len();
            versions.retain(|dv| dv.header.cts > oldest_xid);
            reclaimed += before - versions.len();
            !versions.is_empty()
        });
        Ok(reclaimed)
    }
}

impl<T: Clone> Default for DirtyChains<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the version of a persisted record valid for `xid`, checking
/// the dirty chain first and falling back to the committed record if
/// the chain has nothing relevant.
pub fn valid_version<T: Clone>(
    dirty: &DirtyChains<T>,
    offset: u64,
    committed_header: &MvccHeader,
    committed_value: &T,
    xid: XId,
) -> Result<T> {
    if let Some(v) = dirty.find_valid_version(offset, xid)? {
        return Ok(v);
    }
    if committed_header.is_valid_for(xid) {
        return Ok(committed_value.clone());
    }
    Err(GraphError::UnknownId(offset.to_string()))
}

/// Begins a speculative write: locks the committed record for `xid`
/// (no-wait — returns `TransactionAbort` immediately if already locked
/// by someone else), archives `current` (the version visible just
/// before this write) into the dirty chain with a closed `[bts, xid)`
/// window so concurrent readers whose snapshot predates `xid` still see
/// it, and installs the new dirty draft seeded from `initial`.
pub fn prepare_write<T: Clone>(
    dirty: &DirtyChains<T>,
    offset: u64,
    committed_header: &mut MvccHeader,
    xid: XId,
    current: T,
    initial: T,
    updated: bool,
) -> Result<()> {
    if committed_header.is_locked() && !committed_header.is_locked_by(xid) {
        return Err(GraphError::TransactionAbort(format!(
            "record {offset} already locked by another transaction"
        )));
    }
    if committed_header.rts > xid {
        return Err(GraphError::TransactionAbort(format!(
            "record {offset} already read by a transaction newer than {xid}"
        )));
    }
    if !committed_header.is_locked_by(xid) {
        dirty.archive_version(
            offset,
            DirtyVersion {
                header: MvccHeader {
                    txn_id: 0,
                    bts: committed_header.bts,
                    cts: xid,
                    rts: committed_header.rts,
                },
                value: current,
                updated: false,
            },
        )?;
    }
    committed_header.txn_id = xid;
    dirty.add_version(
        offset,
        DirtyVersion {
            header: MvccHeader {
                txn_id: xid,
                bts: xid,
                cts: INF,
                rts: 0,
            },
            value: initial,
            updated,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_write_conflict_aborts_without_waiting() {
        let dirty: DirtyChains<u32> = DirtyChains::new();
        let mut header = MvccHeader::default();
        prepare_write(&dirty, 1, &mut header, 10, 0, 100, false).unwrap();
        let err = prepare_write(&dirty, 1, &mut header, 20, 100, 200, false).unwrap_err();
        assert!(matches!(err, GraphError::TransactionAbort(_)));
    }

    #[test]
    fn reader_sees_own_dirty_version() {
        let dirty: DirtyChains<u32> = DirtyChains::new();
        let mut header = MvccHeader::default();
        prepare_write(&dirty, 1, &mut header, 10, 0, 100, false).unwrap();
        let v = valid_version(&dirty, 1, &header, &0, 10).unwrap();
        assert_eq!(v, 100);
    }

    #[test]
    fn prepare_write_archives_preimage_for_older_reader() {
        let dirty: DirtyChains<u32> = DirtyChains::new();
        let mut header = MvccHeader { txn_id: 0, bts: 5, cts: INF, rts: 0 };
        // xid 8 began before the write at xid 10; it must still see the
        // pre-image (0) after the write starts, not the in-progress draft.
        prepare_write(&dirty, 1, &mut header, 10, 0, 999, false).unwrap();
        let v = valid_version(&dirty, 1, &header, &0, 8).unwrap();
        assert_eq!(v, 0);
    }

    #[test]
    fn gc_reclaims_versions_below_watermark() {
        let dirty: DirtyChains<u32> = DirtyChains::new();
        dirty
            .add_version(
                1,
                DirtyVersion {
                    header: MvccHeader { txn_id: 5, bts: 5, cts: 6, rts: 0 },
                    value: 1,
                    updated: false,
                },
            )
            .unwrap();
        let reclaimed = dirty.gc(10).unwrap();
        assert_eq!(reclaimed, 1);
        assert!(!dirty.has_dirty_versions(1));
    }
}

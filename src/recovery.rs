//! Crash recovery: rebuilds volatile graph state from the last
//! checkpoint snapshot plus whatever the WAL recorded since.
//!
//! The node/relationship/property-set chunked vectors are durable only
//! as of the last checkpoint (see [`crate::db::Database::checkpoint`]);
//! everything after that exists solely as WAL records. Recovery follows
//! the classic redo-everything-then-undo-losers shape: every record
//! after the last checkpoint's LSN is redone regardless of whether its
//! transaction eventually committed, then every loser transaction's
//! effects are undone by walking its record chain backward through
//! `prev_offset`.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::Result;
use crate::graph::GraphStore;
use crate::pager::wal::{Body, LogRecord, LogType, TxCmd, Wal};
use crate::storage::record::{MvccHeader, NodeRecord, RelationshipRecord};
use crate::txn::XId;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub redone: usize,
    pub undone: usize,
    pub winners: usize,
    pub losers: usize,
    pub highest_xid: XId,
    /// Set once any redo was applied; the caller flushes the rebuilt
    /// chunked vectors and writes a fresh WAL checkpoint afterward.
    pub needs_checkpoint: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Committed,
    Unresolved,
}

/// Replays `wal` into `store`, which should already hold the last
/// checkpoint's snapshot (loaded by the caller via `ChunkedVec::load_from_file`
/// on each of the node/relationship/property files, and `Dictionary::load_from_file`
/// on the dictionary pool).
pub fn recover(wal: &mut Wal, store: &mut GraphStore) -> Result<RecoveryReport> {
    let records = wal.iter_forward()?;

    let mut verdict: HashMap<XId, Verdict> = HashMap::new();
    let mut last_offset: HashMap<XId, u64> = HashMap::new();
    let mut by_offset: HashMap<u64, &LogRecord> = HashMap::new();
    let mut stable_lsn = 0u64;
    let mut highest_xid = 0u64;

    for rec in &records {
        highest_xid = highest_xid.max(rec.xid);
        by_offset.insert(rec.offset, rec);
        match &rec.body {
            Body::Tx { cmd: TxCmd::Begin } => {
                verdict.entry(rec.xid).or_insert(Verdict::Unresolved);
            }
            Body::Tx { cmd: TxCmd::Commit } => {
                verdict.insert(rec.xid, Verdict::Committed);
            }
            Body::Tx { cmd: TxCmd::Abort } => {
                verdict.insert(rec.xid, Verdict::Unresolved);
            }
            Body::Checkpoint => {
                stable_lsn = stable_lsn.max(rec.lsn);
            }
            Body::Node { .. } | Body::Relationship { .. } | Body::Dict { .. } => {
                last_offset.insert(rec.xid, rec.offset);
            }
        }
    }

    let winners: Vec<XId> = verdict.iter().filter(|(_, v)| **v == Verdict::Committed).map(|(x, _)| *x).collect();
    let losers: Vec<XId> = verdict.iter().filter(|(_, v)| **v == Verdict::Unresolved).map(|(x, _)| *x).collect();
    info!(
        total_records = records.len(),
        stable_lsn,
        winners = winners.len(),
        losers = losers.len(),
        "WAL analysis complete"
    );

    let mut redone = 0usize;
    for rec in records.iter().filter(|r| r.lsn > stable_lsn) {
        if apply_forward(store, rec)? {
            redone += 1;
        }
    }

    let mut undone = 0usize;
    for xid in &losers {
        let mut cursor = last_offset.get(xid).copied().unwrap_or(0);
        while cursor != 0 {
            let Some(&rec) = by_offset.get(&cursor) else {
                warn!(offset = cursor, "undo chain references a missing WAL record, stopping here");
                break;
            };
            apply_inverse(store, rec)?;
            undone += 1;
            cursor = rec.prev_offset;
        }
    }

    Ok(RecoveryReport {
        redone,
        undone,
        winners: winners.len(),
        losers: losers.len(),
        highest_xid,
        needs_checkpoint: redone > 0 || undone > 0,
    })
}

/// Redone/undone records are always installed as plain committed
/// versions: no transaction's lock or read-timestamp survives a
/// restart, so the header resets to [`MvccHeader::default`] regardless
/// of which transaction originally produced the snapshot.
fn node_from_snapshot(snap: &crate::pager::wal::NodeSnapshot) -> NodeRecord {
    NodeRecord {
        header: MvccHeader::default(),
        label: snap.label,
        from_rship_list: snap.from_rship_list,
        to_rship_list: snap.to_rship_list,
        property_list: snap.property_list,
    }
}

fn rship_from_snapshot(snap: &crate::pager::wal::RshipSnapshot) -> RelationshipRecord {
    RelationshipRecord {
        header: MvccHeader::default(),
        label: snap.label,
        src_node: snap.src_node,
        dest_node: snap.dest_node,
        next_src_rship: snap.next_src_rship,
        next_dest_rship: snap.next_dest_rship,
        property_list: snap.property_list,
    }
}

/// Applies a record's after-image, regardless of which transaction
/// produced it. Returns `true` if anything was actually touched.
fn apply_forward(store: &mut GraphStore, rec: &LogRecord) -> Result<bool> {
    match &rec.body {
        Body::Node { oid, after, .. } if rec.log_type != LogType::Delete => {
            store.nodes.store_at(*oid, node_from_snapshot(after));
            Ok(true)
        }
        Body::Node { oid, .. } => {
            store.nodes.erase(*oid);
            Ok(true)
        }
        Body::Relationship { oid, after, .. } if rec.log_type != LogType::Delete => {
            store.rships.store_at(*oid, rship_from_snapshot(after));
            Ok(true)
        }
        Body::Relationship { oid, .. } => {
            store.rships.erase(*oid);
            Ok(true)
        }
        Body::Dict { code, value } => {
            let assigned = store.dict.insert(value)?;
            if assigned != *code {
                warn!(expected = code, assigned, value, "dictionary code drifted during redo");
            }
            Ok(true)
        }
        Body::Tx { .. } | Body::Checkpoint => Ok(false),
    }
}

/// Applies the inverse of one record belonging to a loser transaction:
/// insert undoes to a delete, update restores the before-image, delete
/// undoes to a re-insert.
fn apply_inverse(store: &mut GraphStore, rec: &LogRecord) -> Result<()> {
    match (&rec.body, rec.log_type) {
        (Body::Node { oid, .. }, LogType::Insert) => {
            store.nodes.erase(*oid);
        }
        (Body::Node { oid, before, .. }, LogType::Update | LogType::Delete) => {
            store.nodes.store_at(*oid, node_from_snapshot(before));
        }
        (Body::Relationship { oid, .. }, LogType::Insert) => {
            store.rships.erase(*oid);
        }
        (Body::Relationship { oid, before, .. }, LogType::Update | LogType::Delete) => {
            store.rships.store_at(*oid, rship_from_snapshot(before));
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::wal::NodeSnapshot;
    use std::path::Path;

    fn open_wal() -> Wal {
        let path = std::env::temp_dir().join(format!("poseidon-recovery-test-{}.wal", std::process::id()));
        let _ = std::fs::remove_file(&path);
        Wal::open(Path::new(&path)).unwrap()
    }

    #[test]
    fn redo_applies_committed_insert() {
        let mut wal = open_wal();
        wal.transaction_begin(1).unwrap();
        let snap = NodeSnapshot { label: 7, from_rship_list: u64::MAX, to_rship_list: u64::MAX, property_list: u64::MAX };
        wal.append_node(1, LogType::Insert, 42, NodeSnapshot::default(), snap).unwrap();
        wal.transaction_commit(1).unwrap();

        let mut store = GraphStore::new(8);
        let report = recover(&mut wal, &mut store).unwrap();
        assert_eq!(report.redone, 1);
        assert_eq!(store.nodes.at(42).unwrap().label, 7);
    }

    #[test]
    fn undo_reverses_loser_insert() {
        let mut wal = open_wal();
        wal.transaction_begin(1).unwrap();
        let snap = NodeSnapshot { label: 3, from_rship_list: u64::MAX, to_rship_list: u64::MAX, property_list: u64::MAX };
        wal.append_node(1, LogType::Insert, 5, NodeSnapshot::default(), snap).unwrap();
        // No commit: this transaction is a loser (crash mid-transaction).

        let mut store = GraphStore::new(8);
        let report = recover(&mut wal, &mut store).unwrap();
        assert_eq!(report.losers, 1);
        assert!(store.nodes.at(5).is_none());
    }

    #[test]
    fn undo_restores_preimage_of_loser_update() {
        let mut wal = open_wal();
        wal.transaction_begin(1).unwrap();
        let original = NodeSnapshot { label: 1, from_rship_list: u64::MAX, to_rship_list: u64::MAX, property_list: u64::MAX };
        wal.append_node(1, LogType::Insert, 9, NodeSnapshot::default(), original).unwrap();
        wal.transaction_commit(1).unwrap();

        wal.transaction_begin(2).unwrap();
        let updated = NodeSnapshot { label: 99, ..original };
        wal.append_node(2, LogType::Update, 9, original, updated).unwrap();
        // Crash before commit: xid 2 is a loser.

        let mut store = GraphStore::new(8);
        let report = recover(&mut wal, &mut store).unwrap();
        assert_eq!(report.losers, 1);
        assert_eq!(store.nodes.at(9).unwrap().label, 1);
    }

    #[test]
    fn dict_inserts_replay_regardless_of_transaction_outcome() {
        let mut wal = open_wal();
        wal.transaction_begin(1).unwrap();
        wal.append_dict_insert(1, 1, "Person").unwrap();
        // No commit for xid 1: the node never makes it, but the dictionary
        // entry itself does, since dictionary codes are never rolled back.

        let mut store = GraphStore::new(8);
        recover(&mut wal, &mut store).unwrap();
        assert_eq!(store.dict.lookup_string("Person").unwrap(), 1);
    }
}

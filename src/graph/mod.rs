//! Graph operations: node/relationship CRUD, label scans, and bounded
//! traversal, layered over the MVCC record store.
//!
//! `GraphStore` owns the chunked vectors of committed records, the
//! string dictionary, property chains, and the in-memory dirty-version
//! side tables. It has no WAL or transaction-manager dependency of its
//! own — [`crate::db`] sequences WAL appends and calls into here inside
//! a transaction's scope, so this module stays testable without disk
//! I/O.
//!
//! A newly created node or relationship reserves its chunked-vector slot
//! immediately (so its id is stable and can be handed back to the
//! caller) but the slot holds an invisible placeholder — `bts = INF`,
//! so [`MvccHeader::is_valid_for`] rejects every reader — until
//! [`GraphStore::finalize_commit`] overwrites it with the real record.
//!
//! Two notions of "current version" are used depending on who's asking:
//! - `effective_*`: the calling transaction's own view — its own draft
//!   if it holds one (regardless of whether that draft would be visible
//!   to anyone else yet), else the committed record as-is. Used
//!   internally by write-path operations that need to build on top of
//!   whatever this transaction itself has already staged.
//! - `valid_version`/`node_by_id`/`rship_by_id`: the strict snapshot
//!   view — errors with `UnknownId` if nothing in the dirty chain or
//!   committed storage is actually visible to `xid`.

pub mod traversal;

use std::collections::BTreeMap;
use std::collections::HashSet;

use rayon::prelude::*;

use crate::error::{GraphError, Result};
use crate::model::{NodeDescription, PropertyMap, PropertyValue, RelationshipDescription};
use crate::storage::record::{PropertyItem, PropertyTypeCode, INF as TS_INF, UNKNOWN, UNKNOWN_CODE};
use crate::storage::{
    prepare_write, valid_version, ChunkedVec, Dictionary, DirtyChains, DirtyVersion, MvccHeader, NodeRecord,
    PropertyList, RelationshipRecord,
};
use crate::txn::XId;

pub struct GraphStore {
    pub nodes: ChunkedVec<NodeRecord>,
    pub rships: ChunkedVec<RelationshipRecord>,
    pub node_props: PropertyList,
    pub rship_props: PropertyList,
    pub dict: Dictionary,
    pub dirty_nodes: DirtyChains<NodeRecord>,
    pub dirty_rships: DirtyChains<RelationshipRecord>,
}

/// A freshly reserved slot is locked by its creator and invisible to
/// every snapshot until the owning transaction commits.
fn invisible_header(xid: XId) -> MvccHeader {
    MvccHeader { txn_id: xid, bts: TS_INF, cts: TS_INF, rts: 0 }
}

/// Locks a committed record for `xid` without installing a dirty
/// version: no-wait on a conflicting writer, and aborts if a newer
/// reader already touched this record (a writer must never overtake a
/// reader it would invalidate).
fn try_lock(header: &mut MvccHeader, offset: u64, xid: XId) -> Result<()> {
    if header.is_locked() && !header.is_locked_by(xid) {
        return Err(GraphError::TransactionAbort(format!("record {offset} already locked by another transaction")));
    }
    if header.rts > xid {
        return Err(GraphError::TransactionAbort(format!(
            "record {offset} already read by a transaction newer than {xid}"
        )));
    }
    header.txn_id = xid;
    Ok(())
}

/// Walks a relationship chain looking for the entry whose `next_of`
/// pointer equals `target`, returning that predecessor's offset.
fn find_predecessor(
    rships: &ChunkedVec<RelationshipRecord>,
    head: u64,
    target: u64,
    next_of: fn(&RelationshipRecord) -> u64,
) -> Option<u64> {
    let mut cursor = head;
    while cursor != UNKNOWN {
        let r = rships.at(cursor)?;
        let next = next_of(r);
        if next == target {
            return Some(cursor);
        }
        cursor = next;
    }
    None
}

impl GraphStore {
    pub fn new(records_per_chunk: usize) -> Self {
        Self {
            nodes: ChunkedVec::new(records_per_chunk),
            rships: ChunkedVec::new(records_per_chunk),
            node_props: PropertyList::new(records_per_chunk),
            rship_props: PropertyList::new(records_per_chunk),
            dict: Dictionary::new(),
            dirty_nodes: DirtyChains::new(),
            dirty_rships: DirtyChains::new(),
        }
    }

    /// Assembles a store from pieces already loaded from their
    /// respective checkpoint files (see [`crate::db::Database::open_with_config`]).
    /// The dirty chains always start empty: no in-progress transaction
    /// survives a restart.
    pub fn from_parts(
        nodes: ChunkedVec<NodeRecord>,
        rships: ChunkedVec<RelationshipRecord>,
        node_props: PropertyList,
        rship_props: PropertyList,
        dict: Dictionary,
    ) -> Self {
        Self {
            nodes,
            rships,
            node_props,
            rship_props,
            dict,
            dirty_nodes: DirtyChains::new(),
            dirty_rships: DirtyChains::new(),
        }
    }

    fn encode_one(&self, key_code: u32, value: &PropertyValue) -> Result<PropertyItem> {
        Ok(match value {
            PropertyValue::Int32(i) => PropertyItem::int32(key_code, *i),
            PropertyValue::Float64(f) => PropertyItem::float64(key_code, *f),
            PropertyValue::UInt64(u) => PropertyItem::uint64(key_code, *u),
            PropertyValue::String(s) => PropertyItem::dict_code(key_code, self.dict.insert(s)?),
            PropertyValue::DateTime(dt) => PropertyItem::datetime(key_code, dt.unix_timestamp_nanos() as i64),
        })
    }

    fn encode_properties(&self, props: &PropertyMap) -> Result<Vec<PropertyItem>> {
        props
            .iter()
            .map(|(k, v)| {
                let key = self.dict.insert(k)?;
                self.encode_one(key, v)
            })
            .collect()
    }

    fn decode_item(&self, item: &PropertyItem) -> Result<PropertyValue> {
        Ok(match item.typecode {
            PropertyTypeCode::Int32 => PropertyValue::Int32(item.as_int32().unwrap()),
            PropertyTypeCode::Float64 => PropertyValue::Float64(item.as_float64().unwrap()),
            PropertyTypeCode::UInt64 => PropertyValue::UInt64(item.as_uint64().unwrap()),
            PropertyTypeCode::DictCode => {
                let code = item.as_dict_code().unwrap();
                let s = self
                    .dict
                    .lookup_code(code)?
                    .ok_or_else(|| GraphError::Corruption(format!("dangling string code {code}")))?;
                PropertyValue::String(s)
            }
            PropertyTypeCode::DateTime => {
                let nanos = item.as_datetime_raw().unwrap();
                let dt = time::OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
                    .map_err(|e| GraphError::Corruption(format!("bad datetime property: {e}")))?;
                PropertyValue::DateTime(dt)
            }
            PropertyTypeCode::Unused => unreachable!("filtered out by PropertyList::all_properties"),
        })
    }

    /// Merges `overrides` onto the property map currently chained at
    /// `head`, keeping untouched keys and replacing or adding the rest.
    fn merged_items(&self, list: &PropertyList, head: u64, overrides: &PropertyMap) -> Result<Vec<PropertyItem>> {
        let existing = list.all_properties(head, &self.dict)?;
        let mut by_key: BTreeMap<String, PropertyItem> = existing.into_iter().map(|n| (n.key, n.item)).collect();
        for (k, v) in overrides {
            let key_code = self.dict.insert(k)?;
            by_key.insert(k.clone(), self.encode_one(key_code, v)?);
        }
        Ok(by_key.into_values().collect())
    }

    fn effective_node(&self, id: u64, xid: XId) -> Result<NodeRecord> {
        let committed = self.nodes.at(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?;
        if let Some(dv) = self.dirty_nodes.find_valid_entry(id, xid)? {
            return Ok(dv.value);
        }
        Ok(committed.clone())
    }

    fn effective_rship(&self, id: u64, xid: XId) -> Result<RelationshipRecord> {
        let committed = self.rships.at(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?;
        if let Some(dv) = self.dirty_rships.find_valid_entry(id, xid)? {
            return Ok(dv.value);
        }
        Ok(committed.clone())
    }

    fn rship_visible_to(&self, offset: u64, xid: XId) -> bool {
        if let Ok(Some(dv)) = self.dirty_rships.find_valid_entry(offset, xid) {
            return dv.header.is_valid_for(xid);
        }
        self.rships.at(offset).map(|r| r.header.is_valid_for(xid)).unwrap_or(false)
    }

    /// Reserves a node slot, builds its property chain against the
    /// reserved id, and stashes the finished record in `xid`'s dirty
    /// chain. Invisible to every other transaction until commit.
    ///
    /// `append_only` selects the reservation strategy: `false` reuses a
    /// freed slot when one is available, `true` always appends past the
    /// high-water mark (bulk load, where reuse doesn't matter and the
    /// free-list scan is wasted work).
    pub fn add_node(&mut self, xid: XId, label: &str, props: &PropertyMap, append_only: bool) -> Result<u64> {
        let label_code = self.dict.insert(label)?;
        let items = self.encode_properties(props)?;

        let mut placeholder = NodeRecord::new(label_code);
        placeholder.header = invisible_header(xid);
        let offset = if append_only { self.nodes.append(placeholder) } else { self.nodes.store(placeholder) };

        let head = self.node_props.append_properties(offset, &items);
        let record = NodeRecord {
            header: MvccHeader { txn_id: xid, bts: xid, cts: TS_INF, rts: 0 },
            label: label_code,
            from_rship_list: UNKNOWN,
            to_rship_list: UNKNOWN,
            property_list: head,
        };
        self.dirty_nodes.add_version(offset, DirtyVersion { header: record.header, value: record, updated: false })?;
        Ok(offset)
    }

    /// Prepends `rship_offset` onto `node`'s `from_rship_list` (or
    /// `to_rship_list` when `incoming`), returning the prior head so the
    /// new relationship record can chain to it. The update is staged as
    /// a dirty node version under write-intent, never written straight
    /// into committed storage.
    fn link_relationship_into_node(&mut self, xid: XId, node: u64, rship_offset: u64, incoming: bool) -> Result<u64> {
        let current = self.effective_node(node, xid)?;
        let mut snapshot = current.clone();
        let old_head = if incoming { snapshot.to_rship_list } else { snapshot.from_rship_list };
        if incoming {
            snapshot.to_rship_list = rship_offset;
        } else {
            snapshot.from_rship_list = rship_offset;
        }
        snapshot.header = MvccHeader { txn_id: xid, bts: xid, cts: TS_INF, rts: 0 };
        let header = &mut self.nodes.at_mut(node).ok_or_else(|| GraphError::UnknownId(node.to_string()))?.header;
        prepare_write(&self.dirty_nodes, node, header, xid, current, snapshot, true)?;
        Ok(old_head)
    }

    /// `append_only` selects the reservation strategy for the
    /// relationship slot, same as in [`Self::add_node`].
    pub fn add_relationship(
        &mut self,
        xid: XId,
        label: &str,
        from: u64,
        to: u64,
        props: &PropertyMap,
        append_only: bool,
    ) -> Result<u64> {
        self.effective_node(from, xid)?;
        self.effective_node(to, xid)?;

        let label_code = self.dict.insert(label)?;
        let items = self.encode_properties(props)?;

        let mut placeholder = RelationshipRecord::new(label_code, from, to);
        placeholder.header = invisible_header(xid);
        let offset = if append_only { self.rships.append(placeholder) } else { self.rships.store(placeholder) };

        let head = self.rship_props.append_properties(offset, &items);

        let old_from_head = self.link_relationship_into_node(xid, from, offset, false)?;
        let old_to_head = self.link_relationship_into_node(xid, to, offset, true)?;

        let record = RelationshipRecord {
            header: MvccHeader { txn_id: xid, bts: xid, cts: TS_INF, rts: 0 },
            label: label_code,
            src_node: from,
            dest_node: to,
            next_src_rship: old_from_head,
            next_dest_rship: old_to_head,
            property_list: head,
        };
        self.dirty_rships
            .add_version(offset, DirtyVersion { header: record.header, value: record, updated: false })?;
        Ok(offset)
    }

    /// Merges `props` onto a fresh copy of the current property chain
    /// (never reusing the old chain's storage, so a version archived for
    /// an older concurrent reader stays intact) and stamps the new
    /// record version with `xid` as its own creator.
    pub fn update_node(&mut self, xid: XId, id: u64, props: &PropertyMap, label: Option<&str>) -> Result<()> {
        let current = self.effective_node(id, xid)?;
        let merged = self.merged_items(&self.node_props, current.property_list, props)?;
        let new_head = self.node_props.append_properties(id, &merged);
        let new_label = match label {
            Some(l) => self.dict.insert(l)?,
            None => current.label,
        };
        let updated = NodeRecord {
            header: MvccHeader { txn_id: xid, bts: xid, cts: TS_INF, rts: 0 },
            label: new_label,
            from_rship_list: current.from_rship_list,
            to_rship_list: current.to_rship_list,
            property_list: new_head,
        };
        let header = &mut self.nodes.at_mut(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?.header;
        prepare_write(&self.dirty_nodes, id, header, xid, current, updated, true)
    }

    pub fn update_relationship(&mut self, xid: XId, id: u64, props: &PropertyMap, label: Option<&str>) -> Result<()> {
        let current = self.effective_rship(id, xid)?;
        let merged = self.merged_items(&self.rship_props, current.property_list, props)?;
        let new_head = self.rship_props.append_properties(id, &merged);
        let new_label = match label {
            Some(l) => self.dict.insert(l)?,
            None => current.label,
        };
        let updated = RelationshipRecord {
            header: MvccHeader { txn_id: xid, bts: xid, cts: TS_INF, rts: 0 },
            label: new_label,
            src_node: current.src_node,
            dest_node: current.dest_node,
            next_src_rship: current.next_src_rship,
            next_dest_rship: current.next_dest_rship,
            property_list: new_head,
        };
        let header = &mut self.rships.at_mut(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?.header;
        prepare_write(&self.dirty_rships, id, header, xid, current, updated, true)
    }

    pub fn delete_node(&mut self, xid: XId, id: u64) -> Result<()> {
        let current = self.effective_node(id, xid)?;
        if self.has_visible_incident_relationship(&current, xid) {
            return Err(GraphError::OrphanedRelationship(id));
        }
        let mut tombstone = current;
        tombstone.header = MvccHeader { txn_id: xid, bts: xid, cts: xid, rts: 0 };
        let header = &mut self.nodes.at_mut(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?.header;
        try_lock(header, id, xid)?;
        self.dirty_nodes.add_version(id, DirtyVersion { header: tombstone.header, value: tombstone, updated: true })
    }

    fn has_visible_incident_relationship(&self, node: &NodeRecord, xid: XId) -> bool {
        [(node.from_rship_list, true), (node.to_rship_list, false)].into_iter().any(|(head, outgoing)| {
            let mut cursor = head;
            while cursor != UNKNOWN {
                let Some(r) = self.rships.at(cursor) else { break };
                if self.rship_visible_to(cursor, xid) {
                    return true;
                }
                cursor = if outgoing { r.next_src_rship } else { r.next_dest_rship };
            }
            false
        })
    }

    /// Deletes every relationship visible to `xid` incident on `id`
    /// (from both chains), then deletes `id` itself.
    pub fn detach_delete_node(&mut self, xid: XId, id: u64) -> Result<()> {
        let current = self.effective_node(id, xid)?;
        let mut incident = HashSet::new();
        for (head, outgoing) in [(current.from_rship_list, true), (current.to_rship_list, false)] {
            let mut cursor = head;
            while cursor != UNKNOWN {
                let Some(r) = self.rships.at(cursor).cloned() else { break };
                if self.rship_visible_to(cursor, xid) {
                    incident.insert(cursor);
                }
                cursor = if outgoing { r.next_src_rship } else { r.next_dest_rship };
            }
        }
        for rship_id in incident {
            self.delete_relationship(xid, rship_id)?;
        }
        let mut tombstone = self.effective_node(id, xid)?;
        tombstone.header = MvccHeader { txn_id: xid, bts: xid, cts: xid, rts: 0 };
        let header = &mut self.nodes.at_mut(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?.header;
        try_lock(header, id, xid)?;
        self.dirty_nodes.add_version(id, DirtyVersion { header: tombstone.header, value: tombstone, updated: true })
    }

    pub fn delete_relationship(&mut self, xid: XId, id: u64) -> Result<()> {
        let mut tombstone = self.effective_rship(id, xid)?;
        tombstone.header = MvccHeader { txn_id: xid, bts: xid, cts: xid, rts: 0 };
        let header = &mut self.rships.at_mut(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?.header;
        try_lock(header, id, xid)?;
        self.dirty_rships.add_version(id, DirtyVersion { header: tombstone.header, value: tombstone, updated: true })
    }

    /// Splices every dirty version `xid` produced into committed
    /// storage: tombstones (`bts == cts`) unlink themselves from their
    /// endpoints' chains, free their property chain, and erase the
    /// slot; everything else overwrites the reserved slot with its
    /// finished record. Called by `db` after the WAL commit record is
    /// forced to disk.
    ///
    /// Unlinking a tombstoned relationship from its neighbor chains
    /// happens here, at commit, rather than being deferred to a later
    /// vacuum pass.
    pub fn finalize_commit(&mut self, xid: XId, node_ids: &[u64], rship_ids: &[u64]) -> Result<()> {
        for &id in node_ids {
            let Some(entry) = self.dirty_nodes.find_valid_entry(id, xid)? else { continue };
            if entry.header.bts == entry.header.cts {
                self.node_props.remove_properties(entry.value.property_list);
                self.nodes.erase(id);
            } else {
                let mut value = entry.value;
                value.header.txn_id = 0;
                self.nodes.store_at(id, value);
            }
            // The draft this transaction held is now reflected in (or
            // erased from) committed storage; drop it so it stops
            // shadowing the committed record as "still locked" for
            // future readers. Pre-image versions archived for older
            // concurrent readers carry `txn_id == 0` and are untouched.
            self.dirty_nodes.remove_version(id, xid)?;
        }
        for &id in rship_ids {
            let Some(entry) = self.dirty_rships.find_valid_entry(id, xid)? else { continue };
            if entry.header.bts == entry.header.cts {
                self.unlink_relationship(id, &entry.value);
                self.rship_props.remove_properties(entry.value.property_list);
                self.rships.erase(id);
            } else {
                let mut value = entry.value;
                value.header.txn_id = 0;
                self.rships.store_at(id, value);
            }
            self.dirty_rships.remove_version(id, xid)?;
        }
        Ok(())
    }

    /// Removes `offset` from its source node's `from_rship_list` chain
    /// and its destination node's `to_rship_list` chain. Tolerates an
    /// endpoint that was deleted in the same transaction (already
    /// erased by the node loop above).
    fn unlink_relationship(&mut self, offset: u64, r: &RelationshipRecord) {
        if let Some(src) = self.nodes.at(r.src_node) {
            if src.from_rship_list == offset {
                if let Some(src_mut) = self.nodes.at_mut(r.src_node) {
                    src_mut.from_rship_list = r.next_src_rship;
                }
            } else if let Some(pred) = find_predecessor(&self.rships, src.from_rship_list, offset, |x| x.next_src_rship) {
                if let Some(pred_r) = self.rships.at_mut(pred) {
                    pred_r.next_src_rship = r.next_src_rship;
                }
            }
        }
        if let Some(dest) = self.nodes.at(r.dest_node) {
            if dest.to_rship_list == offset {
                if let Some(dest_mut) = self.nodes.at_mut(r.dest_node) {
                    dest_mut.to_rship_list = r.next_dest_rship;
                }
            } else if let Some(pred) = find_predecessor(&self.rships, dest.to_rship_list, offset, |x| x.next_dest_rship)
            {
                if let Some(pred_r) = self.rships.at_mut(pred) {
                    pred_r.next_dest_rship = r.next_dest_rship;
                }
            }
        }
    }

    /// Drops `xid`'s speculative versions without touching committed
    /// storage; reserved-but-never-finalized node/relationship slots
    /// stay behind as permanently invisible dead slots, reclaimed on the
    /// next vacuum pass.
    pub fn rollback(&mut self, xid: XId, node_ids: &[u64], rship_ids: &[u64]) -> Result<()> {
        for &id in node_ids {
            self.dirty_nodes.remove_version(id, xid)?;
            if let Some(rec) = self.nodes.at_mut(id) {
                if rec.header.is_locked_by(xid) {
                    rec.header.txn_id = 0;
                }
            }
        }
        for &id in rship_ids {
            self.dirty_rships.remove_version(id, xid)?;
            if let Some(rec) = self.rships.at_mut(id) {
                if rec.header.is_locked_by(xid) {
                    rec.header.txn_id = 0;
                }
            }
        }
        Ok(())
    }

    /// Returns the version visible to `xid`, marking the committed
    /// record as read by `xid` so a writer with an older xid knows to
    /// abort rather than overtake this reader.
    pub fn node_by_id(&mut self, id: u64, xid: XId) -> Result<NodeRecord> {
        let committed = self.nodes.at(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?;
        let record = valid_version(&self.dirty_nodes, id, &committed.header, committed, xid)?;
        if let Some(rec) = self.nodes.at_mut(id) {
            rec.header.observe_read(xid);
        }
        Ok(record)
    }

    pub fn rship_by_id(&mut self, id: u64, xid: XId) -> Result<RelationshipRecord> {
        let committed = self.rships.at(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?;
        let record = valid_version(&self.dirty_rships, id, &committed.header, committed, xid)?;
        if let Some(rec) = self.rships.at_mut(id) {
            rec.header.observe_read(xid);
        }
        Ok(record)
    }

    pub fn get_node_description(&mut self, id: u64, xid: XId) -> Result<NodeDescription> {
        let record = self.node_by_id(id, xid)?;
        let label = self
            .dict
            .lookup_code(record.label)?
            .ok_or_else(|| GraphError::Corruption("dangling node label code".into()))?;
        let mut properties = PropertyMap::new();
        for named in self.node_props.all_properties(record.property_list, &self.dict)? {
            properties.insert(named.key, self.decode_item(&named.item)?);
        }
        Ok(NodeDescription { id, label, properties })
    }

    pub fn get_rship_description(&mut self, id: u64, xid: XId) -> Result<RelationshipDescription> {
        let record = self.rship_by_id(id, xid)?;
        let label = self
            .dict
            .lookup_code(record.label)?
            .ok_or_else(|| GraphError::Corruption("dangling relationship label code".into()))?;
        let mut properties = PropertyMap::new();
        for named in self.rship_props.all_properties(record.property_list, &self.dict)? {
            properties.insert(named.key, self.decode_item(&named.item)?);
        }
        Ok(RelationshipDescription { id, from_id: record.src_node, to_id: record.dest_node, label, properties })
    }

    /// Scans every committed node with the given label visible to `xid`,
    /// partitioning the underlying chunked vector across chunks and
    /// scanning chunk ranges in parallel. Does not consult the dirty
    /// chain, so a transaction's own uncommitted inserts are not yet
    /// visible to its own label scans.
    pub fn scan_by_label(&self, label: &str, xid: XId) -> Result<Vec<u64>> {
        let label_code = self.dict.lookup_string(label)?;
        if label_code == UNKNOWN_CODE || label_code == 0 {
            return Ok(Vec::new());
        }
        let chunks = self.nodes.num_chunks();
        let found: Vec<u64> = (0..chunks)
            .into_par_iter()
            .flat_map(|chunk_idx| {
                self.nodes
                    .range(chunk_idx, chunk_idx + 1)
                    .filter(|(_, rec)| rec.label == label_code && rec.header.is_valid_for(xid))
                    .map(|(off, _)| off)
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(found)
    }

    pub fn label_of_node(&self, id: u64) -> Result<String> {
        let rec = self.nodes.at(id).ok_or_else(|| GraphError::UnknownId(id.to_string()))?;
        self.dict
            .lookup_code(rec.label)?
            .ok_or_else(|| GraphError::Corruption("dangling node label code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn insert_is_invisible_until_finalized() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &props(&[("name", PropertyValue::String("Ann".into()))]), false).unwrap();
        assert!(matches!(g.get_node_description(id, 1), Err(GraphError::UnknownId(_))));
        g.finalize_commit(1, &[id], &[]).unwrap();
        let desc = g.get_node_description(id, 2).unwrap();
        assert_eq!(desc.label, "Person");
        assert_eq!(desc.properties.get("name").unwrap().as_str(), Some("Ann"));
    }

    #[test]
    fn update_then_abort_restores_preimage() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &props(&[("age", PropertyValue::Int32(48))]), false).unwrap();
        g.finalize_commit(1, &[id], &[]).unwrap();

        g.update_node(2, id, &props(&[("age", PropertyValue::Int32(52))]), Some("Updated Actor")).unwrap();
        g.rollback(2, &[id], &[]).unwrap();

        let desc = g.get_node_description(id, 3).unwrap();
        assert_eq!(desc.label, "Person");
        assert_eq!(desc.properties.get("age").unwrap().as_int32(), Some(48));
    }

    #[test]
    fn double_update_merges_and_commits() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        g.finalize_commit(1, &[id], &[]).unwrap();

        g.update_node(2, id, &props(&[("age", PropertyValue::Int32(43)), ("city", PropertyValue::String("Munich".into()))]), None).unwrap();
        g.update_node(2, id, &props(&[("age", PropertyValue::Int32(46)), ("zipcode", PropertyValue::UInt64(12346))]), Some("Actor")).unwrap();
        g.finalize_commit(2, &[id], &[]).unwrap();

        let desc = g.get_node_description(id, 3).unwrap();
        assert_eq!(desc.label, "Actor");
        assert_eq!(desc.properties.get("age").unwrap().as_int32(), Some(46));
        assert_eq!(desc.properties.get("city").unwrap().as_str(), Some("Munich"));
        assert_eq!(desc.properties.get("zipcode").unwrap().as_uint64(), Some(12346));
    }

    #[test]
    fn delete_requires_no_visible_relationships_and_detach_removes_both() {
        let mut g = GraphStore::new(16);
        let p1 = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        let p2 = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        let p3 = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        g.finalize_commit(1, &[p1, p2, p3], &[]).unwrap();

        let r1 = g.add_relationship(2, "knows", p1, p2, &PropertyMap::new(), false).unwrap();
        let r2 = g.add_relationship(2, "knows", p1, p3, &PropertyMap::new(), false).unwrap();
        g.finalize_commit(2, &[p1, p2, p3], &[r1, r2]).unwrap();

        assert!(matches!(g.delete_node(3, p1), Err(GraphError::OrphanedRelationship(_))));
        g.rollback(3, &[p1], &[]).unwrap();

        g.detach_delete_node(4, p1).unwrap();
        g.finalize_commit(4, &[p1, p2, p3], &[r1, r2]).unwrap();

        assert!(matches!(g.node_by_id(p1, 5), Err(GraphError::UnknownId(_))));
        assert!(matches!(g.rship_by_id(r1, 5), Err(GraphError::UnknownId(_))));
        assert!(matches!(g.rship_by_id(r2, 5), Err(GraphError::UnknownId(_))));
        let p2_after = g.node_by_id(p2, 5).unwrap();
        assert_eq!(p2_after.from_rship_list, UNKNOWN);
        assert_eq!(p2_after.to_rship_list, UNKNOWN);
    }

    #[test]
    fn writer_overtaking_a_reader_aborts() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        g.finalize_commit(1, &[id], &[]).unwrap();

        let _ = g.node_by_id(id, 10).unwrap();
        let err = g.update_node(5, id, &PropertyMap::new(), None).unwrap_err();
        assert!(matches!(err, GraphError::TransactionAbort(_)));
    }

    #[test]
    fn label_scan_finds_committed_nodes() {
        let mut g = GraphStore::new(4);
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(g.add_node(1, "Person", &props(&[("n", PropertyValue::Int32(i))]), false).unwrap());
        }
        g.finalize_commit(1, &ids, &[]).unwrap();
        let mut found = g.scan_by_label("Person", 2).unwrap();
        found.sort_unstable();
        assert_eq!(found, ids);
        assert!(g.scan_by_label("Company", 2).unwrap().is_empty());
    }

    #[test]
    fn committed_update_does_not_block_the_next_transaction() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &PropertyMap::new(), false).unwrap();
        g.finalize_commit(1, &[id], &[]).unwrap();

        g.update_node(2, id, &props(&[("age", PropertyValue::Int32(48))]), None).unwrap();
        g.finalize_commit(2, &[id], &[]).unwrap();

        // Without releasing the lock on commit, this second update would
        // abort with TransactionAbort instead of succeeding.
        g.update_node(3, id, &props(&[("age", PropertyValue::Int32(52))]), None).unwrap();
        g.finalize_commit(3, &[id], &[]).unwrap();

        let desc = g.get_node_description(id, 4).unwrap();
        assert_eq!(desc.properties.get("age").unwrap().as_int32(), Some(52));
    }

    #[test]
    fn older_reader_does_not_see_a_concurrent_committed_update() {
        let mut g = GraphStore::new(16);
        let id = g.add_node(1, "Person", &props(&[("age", PropertyValue::Int32(48))]), false).unwrap();
        g.finalize_commit(1, &[id], &[]).unwrap();

        // Transaction A begins (conceptually) at xid 2: it will read after
        // B updates and commits, but its snapshot predates B's write.
        g.update_node(3, id, &props(&[("age", PropertyValue::Int32(52))]), None).unwrap();
        g.finalize_commit(3, &[id], &[]).unwrap();

        let seen_by_a = g.get_node_description(id, 2).unwrap();
        assert_eq!(seen_by_a.properties.get("age").unwrap().as_int32(), Some(48));

        let seen_by_later = g.get_node_description(id, 4).unwrap();
        assert_eq!(seen_by_later.properties.get("age").unwrap().as_int32(), Some(52));
    }
}

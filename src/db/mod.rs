//! Top-level facade wiring the buffer pool, write-ahead log, graph
//! store, transaction manager, and secondary indexes into a single
//! durable graph handle.
//!
//! `Database::open` loads (or creates) the on-disk file set under a
//! graph directory, replays the write-ahead log via
//! [`crate::recovery::recover`], and returns a handle ready to accept
//! transactions. Every mutation flows through a [`DbTransaction`],
//! mirroring the borrow-scoped transaction handle pattern: a
//! transaction borrows the database mutably for its lifetime, and a
//! drop without `commit`/`rollback` is a programming error.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::graph::traversal::Direction;
use crate::graph::GraphStore;
use crate::index::{IndexKey, SecondaryIndex};
use crate::model::{NodeDescription, PropertyMap, PropertyValue, RelationshipDescription};
use crate::pager::buffer_pool::{BufferPool, FileId, DICT_FILE, INDEX_FILE, NODE_FILE, NODE_PROPS_FILE, RSHIP_FILE, RSHIP_PROPS_FILE};
use crate::pager::wal::{NodeSnapshot, RshipSnapshot, Wal};
use crate::pager::PagedFile;
use crate::storage::record::{PropertyItem, PropertyTypeCode};
use crate::storage::{Dictionary, PropertyList};
use crate::txn::transaction;
use crate::txn::{TransactionManager, TxState, XId};

const FT_DICT: u32 = 1;
const FT_NODE: u32 = 2;
const FT_RSHIP: u32 = 3;
const FT_NODE_PROPS: u32 = 4;
const FT_RSHIP_PROPS: u32 = 5;
const FT_INDEX: u32 = 6;

fn node_file_name() -> &'static str {
    "nodes.db"
}

fn graph_files(dir: &Path) -> (PathBuf, PathBuf, PathBuf, PathBuf, PathBuf, PathBuf) {
    (
        dir.join("dict.db"),
        dir.join(node_file_name()),
        dir.join("rships.db"),
        dir.join("nprops.db"),
        dir.join("rprops.db"),
        dir.join("poseidon.wal"),
    )
}

fn index_file_name(label: &str, prop: &str) -> String {
    format!("idx_{label}${prop}.db")
}

fn records_per_chunk(config: &Config, record_len: usize) -> usize {
    if config.chunk_records_per_chunk > 0 {
        config.chunk_records_per_chunk
    } else {
        (config.page_size / record_len).max(1)
    }
}

/// Converts a resolved property value into the signed 64-bit key an
/// index orders by. Floats and unsigned values are bit-cast, which
/// preserves ordering for non-negative floats and Unix-epoch
/// timestamps (see [`crate::index::btree`]).
fn item_to_index_key(item: &PropertyItem) -> Option<IndexKey> {
    match item.typecode {
        PropertyTypeCode::Int32 => item.as_int32().map(|v| v as IndexKey),
        PropertyTypeCode::Float64 => item.as_float64().map(|v| v.to_bits() as IndexKey),
        PropertyTypeCode::DictCode => item.as_dict_code().map(|v| v as IndexKey),
        PropertyTypeCode::UInt64 => item.as_uint64().map(|v| v as IndexKey),
        PropertyTypeCode::DateTime => item.as_datetime_raw(),
        PropertyTypeCode::Unused => None,
    }
}

/// Reads a single property's value out of an already-materialized
/// property map. This is the generic accessor behind both node and
/// relationship descriptions.
pub fn get_property_value<'a>(properties: &'a PropertyMap, key: &str) -> Result<&'a PropertyValue> {
    properties.get(key).ok_or_else(|| GraphError::UnknownProperty(key.to_string()))
}

struct IndexEntry {
    index: SecondaryIndex,
    label: String,
    prop: String,
}

/// Durable graph handle: owns every paged file, the WAL, the in-memory
/// graph store, and the transaction manager for one graph directory.
pub struct Database {
    dir: PathBuf,
    config: Config,
    pool: BufferPool,
    wal: Wal,
    store: GraphStore,
    txn_mgr: TransactionManager,
    indexes: HashMap<(String, String), IndexEntry>,
    next_index_file: FileId,
    dirty_since_checkpoint: bool,
}

impl Database {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(dir, Config::default())
    }

    pub fn open_with_config(dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        info!(dir = ?dir, "opening graph");

        let (dict_path, node_path, rship_path, nprops_path, rprops_path, wal_path) = graph_files(&dir);
        let page_size = config.page_size;

        let mut dict_file = PagedFile::open(&dict_path, FT_DICT, page_size, 8)?;
        let mut node_file = PagedFile::open(&node_path, FT_NODE, page_size, 8)?;
        let mut rship_file = PagedFile::open(&rship_path, FT_RSHIP, page_size, 8)?;
        let mut nprops_file = PagedFile::open(&nprops_path, FT_NODE_PROPS, page_size, 8)?;
        let mut rprops_file = PagedFile::open(&rprops_path, FT_RSHIP_PROPS, page_size, 8)?;

        let dict = Dictionary::load_from_file(&mut dict_file)?;

        let node_rpc = records_per_chunk(&config, 44);
        let rship_rpc = records_per_chunk(&config, 60);
        let prop_rpc = records_per_chunk(&config, 55);

        let nodes = crate::storage::ChunkedVec::load_from_file(&mut node_file, node_rpc)?;
        let rships = crate::storage::ChunkedVec::load_from_file(&mut rship_file, rship_rpc)?;
        let node_props = PropertyList::load_from_file(&mut nprops_file, prop_rpc)?;
        let rship_props = PropertyList::load_from_file(&mut rprops_file, prop_rpc)?;

        let mut store = GraphStore::from_parts(nodes, rships, node_props, rship_props, dict);

        let mut wal = Wal::open(&wal_path)?;
        let report = crate::recovery::recover(&mut wal, &mut store)?;
        if report.redone > 0 || report.undone > 0 {
            info!(
                redone = report.redone,
                undone = report.undone,
                winners = report.winners,
                losers = report.losers,
                "replayed write-ahead log on open"
            );
        }

        let pool = BufferPool::new(config.buffer_pool_frames);
        pool.register_file(DICT_FILE, dict_file)?;
        pool.register_file(NODE_FILE, node_file)?;
        pool.register_file(RSHIP_FILE, rship_file)?;
        pool.register_file(NODE_PROPS_FILE, nprops_file)?;
        pool.register_file(RSHIP_PROPS_FILE, rprops_file)?;

        let txn_mgr = TransactionManager::new();
        txn_mgr.fast_forward(report.highest_xid);

        let mut db = Self {
            dir,
            config,
            pool,
            wal,
            store,
            txn_mgr,
            indexes: HashMap::new(),
            next_index_file: INDEX_FILE,
            dirty_since_checkpoint: report.needs_checkpoint,
        };

        if db.dirty_since_checkpoint {
            db.checkpoint()?;
        }

        info!("graph opened successfully");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a new transaction bound to the calling thread. Fails with
    /// [`GraphError::InvalidNested`] if one is already active here.
    pub fn begin_transaction(&mut self) -> Result<DbTransaction<'_>> {
        if transaction::has_active() {
            return Err(GraphError::InvalidNested);
        }
        let xid = self.txn_mgr.begin()?;
        self.wal.transaction_begin(xid)?;
        Ok(DbTransaction { db: self, xid, state: TxState::Active })
    }

    /// Runs `body` inside a fresh transaction, committing on success and
    /// rolling back on error, with the error propagated to the caller.
    pub fn run_transaction<R>(&mut self, body: impl FnOnce(&mut DbTransaction) -> Result<R>) -> Result<R> {
        let mut tx = self.begin_transaction()?;
        match body(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    pub fn create_index(&mut self, label: &str, prop: &str) -> Result<()> {
        let key = (label.to_string(), prop.to_string());
        if self.indexes.contains_key(&key) {
            return Ok(());
        }
        let name = format!("{label}.{prop}");
        let file_id = self.next_index_file;
        self.next_index_file += 1;
        let path = self.dir.join(index_file_name(label, prop));
        let file = PagedFile::open(&path, FT_INDEX, self.config.page_size, 8)?;
        let index = SecondaryIndex::paged(name, file_id, self.config.page_size);
        index.register_paged_file(&self.pool, file)?;
        self.backfill_index(&index, label, prop)?;
        self.indexes.insert(key, IndexEntry { index, label: label.to_string(), prop: prop.to_string() });
        info!(label, prop, "secondary index created");
        Ok(())
    }

    fn backfill_index(&mut self, index: &SecondaryIndex, label: &str, prop: &str) -> Result<()> {
        let label_code = self.store.dict.lookup_string(label)?;
        if label_code == 0 {
            return Ok(());
        }
        let prop_code = self.store.dict.lookup_string(prop)?;
        if prop_code == 0 {
            return Ok(());
        }
        for (offset, rec) in self.store.nodes.iter() {
            if rec.label != label_code || !rec.header.is_valid() {
                continue;
            }
            if let Some(item) = self.store.node_props.property_value(rec.property_list, prop_code) {
                if let Some(k) = item_to_index_key(&item) {
                    index.insert(&self.pool, k, offset)?;
                }
            }
        }
        Ok(())
    }

    pub fn drop_index(&mut self, label: &str, prop: &str) -> Result<()> {
        self.indexes
            .remove(&(label.to_string(), prop.to_string()))
            .map(|_| ())
            .ok_or_else(|| GraphError::UnknownIndex(format!("{label}.{prop}")))
    }

    pub fn has_index(&self, label: &str, prop: &str) -> bool {
        self.indexes.contains_key(&(label.to_string(), prop.to_string()))
    }

    pub fn index_lookup(&self, label: &str, prop: &str, key: IndexKey, mut cb: impl FnMut(u64)) -> Result<()> {
        let entry = self
            .indexes
            .get(&(label.to_string(), prop.to_string()))
            .ok_or_else(|| GraphError::UnknownIndex(format!("{label}.{prop}")))?;
        for id in entry.index.lookup(&self.pool, key)? {
            cb(id);
        }
        Ok(())
    }

    /// Walks every committed, visible node and invokes `cb`.
    pub fn nodes(&mut self, xid: XId, mut cb: impl FnMut(NodeDescription)) -> Result<()> {
        let ids: Vec<u64> = self.store.nodes.iter().filter(|(_, r)| r.header.is_valid_for(xid)).map(|(o, _)| o).collect();
        for id in ids {
            cb(self.store.get_node_description(id, xid)?);
        }
        Ok(())
    }

    pub fn nodes_by_label(&mut self, label: &str, xid: XId, mut cb: impl FnMut(NodeDescription)) -> Result<()> {
        for id in self.store.scan_by_label(label, xid)? {
            cb(self.store.get_node_description(id, xid)?);
        }
        Ok(())
    }

    pub fn relationships_by_label(&mut self, label: &str, xid: XId, mut cb: impl FnMut(RelationshipDescription)) -> Result<()> {
        let label_code = self.store.dict.lookup_string(label)?;
        if label_code == 0 {
            return Ok(());
        }
        let ids: Vec<u64> = self
            .store
            .rships
            .iter()
            .filter(|(_, r)| r.label == label_code && r.header.is_valid_for(xid))
            .map(|(o, _)| o)
            .collect();
        for id in ids {
            cb(self.store.get_rship_description(id, xid)?);
        }
        Ok(())
    }

    pub fn foreach_from_relationship_of_node(
        &mut self,
        node_id: u64,
        label: Option<&str>,
        xid: XId,
        mut cb: impl FnMut(RelationshipDescription),
    ) -> Result<()> {
        let hops = self.store.traverse(node_id, Direction::Outgoing, label, 1, xid)?;
        for hop in hops {
            cb(self.store.get_rship_description(hop.relationship, xid)?);
        }
        Ok(())
    }

    pub fn is_node_property(&mut self, id: u64, xid: XId, key: &str, pred: impl Fn(&PropertyValue) -> bool) -> Result<bool> {
        let desc = self.store.get_node_description(id, xid)?;
        Ok(desc.properties.get(key).map(pred).unwrap_or(false))
    }

    /// Flushes dirty buffer pool frames and fsyncs every registered
    /// file, without taking a WAL checkpoint.
    pub fn flush(&mut self) -> Result<()> {
        self.pool.flush_all()
    }

    /// Writes the current in-memory chunked vectors back to their
    /// paged files, then records a WAL checkpoint. After this point the
    /// WAL before the checkpoint record is no longer needed for redo.
    pub fn checkpoint(&mut self) -> Result<()> {
        info!("starting checkpoint");
        self.pool.with_file(DICT_FILE, |f| self.store.dict.flush_to_file(f))?;
        self.pool.with_file(NODE_FILE, |f| self.store.nodes.flush_to_file(f))?;
        self.pool.with_file(RSHIP_FILE, |f| self.store.rships.flush_to_file(f))?;
        self.pool.with_file(NODE_PROPS_FILE, |f| self.store.node_props.flush_to_file(f))?;
        self.pool.with_file(RSHIP_PROPS_FILE, |f| self.store.rship_props.flush_to_file(f))?;
        self.pool.flush_all()?;
        self.wal.checkpoint()?;
        self.dirty_since_checkpoint = false;
        info!("checkpoint complete");
        Ok(())
    }

    pub fn close_files(mut self) -> Result<()> {
        self.checkpoint()
    }

    /// Gathers pager, storage, and WAL statistics for this graph. See
    /// [`crate::admin::stats`].
    pub fn print_stats(&self) -> Result<crate::admin::StatsReport> {
        crate::admin::stats(self)
    }

    /// Writes a Graphviz rendering of every node and relationship
    /// currently visible to `xid`. See [`crate::admin::dump_dot`].
    pub fn dump_dot(&mut self, path: impl AsRef<Path>, xid: XId) -> Result<()> {
        crate::admin::dump_dot(self, path.as_ref(), xid)
    }

    /// Walks every chunked vector checking structural invariants. See
    /// [`crate::admin::verify`].
    pub fn verify(&self, opts: crate::admin::IntegrityOptions) -> crate::admin::IntegrityReport {
        crate::admin::verify(self, opts)
    }

    /// Forces a synchronous garbage-collection pass over tombstoned and
    /// abandoned slots. See [`crate::admin::vacuum_now`].
    pub fn vacuum_now(&mut self) -> Result<crate::admin::VacuumReport> {
        crate::admin::vacuum_now(self)
    }

    pub(crate) fn store(&self) -> &GraphStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    pub(crate) fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(crate) fn wal(&self) -> &Wal {
        &self.wal
    }

    pub(crate) fn dirty_since_checkpoint(&self) -> bool {
        self.dirty_since_checkpoint
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.indexes.values().map(|e| (e.label.as_str(), e.prop.as_str()))
    }

    /// Captures, for every index whose label matches `id`'s current
    /// committed label, the indexed property's key. Called both before
    /// and after [`crate::graph::GraphStore::finalize_commit`] splices a
    /// transaction's dirty versions in, so commit can diff the two and
    /// keep secondary indexes in step with the record that actually
    /// landed (not the draft that led up to it).
    fn snapshot_indexed(&self, id: u64) -> Vec<((String, String), IndexKey)> {
        if self.indexes.is_empty() {
            return Vec::new();
        }
        let Some(rec) = self.store.nodes.at(id) else { return Vec::new() };
        let Ok(Some(label)) = self.store.dict.lookup_code(rec.label) else { return Vec::new() };
        let mut out = Vec::new();
        for entry in self.indexes.values() {
            if entry.label != label {
                continue;
            }
            let Ok(prop_code) = self.store.dict.lookup_string(&entry.prop) else { continue };
            if prop_code == 0 {
                continue;
            }
            if let Some(item) = self.store.node_props.property_value(rec.property_list, prop_code) {
                if let Some(k) = item_to_index_key(&item) {
                    out.push(((entry.label.clone(), entry.prop.clone()), k));
                }
            }
        }
        out
    }
}

/// A single active transaction borrowing the database mutably. Every
/// write method both mutates the in-memory graph store and appends the
/// matching WAL record; `commit` finalizes the dirty versions and
/// forces the WAL commit record to disk, `rollback` undoes them.
pub struct DbTransaction<'db> {
    db: &'db mut Database,
    xid: XId,
    state: TxState,
}

impl<'db> DbTransaction<'db> {
    pub fn xid(&self) -> XId {
        self.xid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(GraphError::OutOfTransactionScope);
        }
        Ok(())
    }

    fn track_node(&self, id: u64) {
        transaction::with_current(|t| t.add_dirty_node(id));
    }

    fn track_rship(&self, id: u64) {
        transaction::with_current(|t| t.add_dirty_relationship(id));
    }

    pub fn add_node(&mut self, label: &str, props: &PropertyMap) -> Result<u64> {
        self.add_node_with(label, props, false)
    }

    /// Like [`Self::add_node`], but with `append_only` set, reserves the
    /// slot by appending past the high-water mark rather than reusing a
    /// freed one — for bulk loads where slot reuse doesn't matter.
    pub fn add_node_with(&mut self, label: &str, props: &PropertyMap, append_only: bool) -> Result<u64> {
        self.ensure_active()?;
        let id = self.db.store.add_node(self.xid, label, props, append_only)?;
        self.track_node(id);
        self.append_node_wal(id)?;
        Ok(id)
    }

    pub fn add_relationship(&mut self, label: &str, from: u64, to: u64, props: &PropertyMap) -> Result<u64> {
        self.add_relationship_with(label, from, to, props, false)
    }

    /// See [`Self::add_node_with`].
    pub fn add_relationship_with(
        &mut self,
        label: &str,
        from: u64,
        to: u64,
        props: &PropertyMap,
        append_only: bool,
    ) -> Result<u64> {
        self.ensure_active()?;
        let id = self.db.store.add_relationship(self.xid, label, from, to, props, append_only)?;
        self.track_rship(id);
        self.track_node(from);
        self.track_node(to);
        self.append_rship_wal(id)?;
        Ok(id)
    }

    pub fn update_node(&mut self, id: u64, props: &PropertyMap, label: Option<&str>) -> Result<()> {
        self.ensure_active()?;
        self.db.store.update_node(self.xid, id, props, label)?;
        self.track_node(id);
        self.append_node_wal(id)?;
        Ok(())
    }

    pub fn update_relationship(&mut self, id: u64, props: &PropertyMap, label: Option<&str>) -> Result<()> {
        self.ensure_active()?;
        self.db.store.update_relationship(self.xid, id, props, label)?;
        self.track_rship(id);
        self.append_rship_wal(id)?;
        Ok(())
    }

    pub fn delete_node(&mut self, id: u64) -> Result<()> {
        self.ensure_active()?;
        self.db.store.delete_node(self.xid, id)?;
        self.track_node(id);
        self.append_node_wal(id)?;
        Ok(())
    }

    pub fn detach_delete_node(&mut self, id: u64) -> Result<()> {
        self.ensure_active()?;
        self.db.store.detach_delete_node(self.xid, id)?;
        self.track_node(id);
        self.append_node_wal(id)?;
        Ok(())
    }

    pub fn delete_relationship(&mut self, id: u64) -> Result<()> {
        self.ensure_active()?;
        self.db.store.delete_relationship(self.xid, id)?;
        self.track_rship(id);
        self.append_rship_wal(id)?;
        Ok(())
    }

    pub fn node_by_id(&mut self, id: u64) -> Result<crate::storage::record::NodeRecord> {
        self.db.store.node_by_id(id, self.xid)
    }

    pub fn rship_by_id(&mut self, id: u64) -> Result<crate::storage::record::RelationshipRecord> {
        self.db.store.rship_by_id(id, self.xid)
    }

    pub fn get_node_description(&mut self, id: u64) -> Result<NodeDescription> {
        self.db.store.get_node_description(id, self.xid)
    }

    pub fn get_rship_description(&mut self, id: u64) -> Result<RelationshipDescription> {
        self.db.store.get_rship_description(id, self.xid)
    }

    /// Appends a node WAL record by snapshotting the relevant structural
    /// fields before and after. The transaction's own draft (the
    /// "after" image) lives in the dirty chain; since neither insert nor
    /// update touch the committed slot before commit, the committed
    /// record read here is still the genuine pre-image (or nothing, for
    /// a fresh insert).
    fn append_node_wal(&mut self, id: u64) -> Result<()> {
        let Some(entry) = self.db.store.dirty_nodes.find_valid_entry(id, self.xid)? else {
            return Ok(());
        };
        let log_type = if entry.header.bts == entry.header.cts {
            crate::pager::wal::LogType::Delete
        } else if !entry.updated {
            crate::pager::wal::LogType::Insert
        } else {
            crate::pager::wal::LogType::Update
        };
        let after = snapshot_node(&entry.value);
        let before = if log_type == crate::pager::wal::LogType::Insert {
            NodeSnapshot::default()
        } else {
            self.db.store.nodes.at(id).map(snapshot_node).unwrap_or_default()
        };
        self.db.wal.append_node(self.xid, log_type, id, before, after)?;
        Ok(())
    }

    fn append_rship_wal(&mut self, id: u64) -> Result<()> {
        let Some(entry) = self.db.store.dirty_rships.find_valid_entry(id, self.xid)? else {
            return Ok(());
        };
        let log_type = if entry.header.bts == entry.header.cts {
            crate::pager::wal::LogType::Delete
        } else if !entry.updated {
            crate::pager::wal::LogType::Insert
        } else {
            crate::pager::wal::LogType::Update
        };
        let after = snapshot_rship(&entry.value);
        let before = if log_type == crate::pager::wal::LogType::Insert {
            RshipSnapshot::default()
        } else {
            self.db.store.rships.at(id).map(snapshot_rship).unwrap_or_default()
        };
        self.db.wal.append_relationship(self.xid, log_type, id, before, after)?;
        Ok(())
    }

    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        let (nodes, rships) = transaction::with_current(|t| (t.dirty_nodes().to_vec(), t.dirty_relationships().to_vec()))
            .unwrap_or_default();
        let before: Vec<_> = nodes.iter().map(|&id| (id, self.db.snapshot_indexed(id))).collect();
        self.db.store.finalize_commit(self.xid, &nodes, &rships)?;
        self.db.wal.transaction_commit(self.xid)?;
        self.db.txn_mgr.end(self.xid, TxState::Committed)?;
        for (id, old_entries) in before {
            for (key, old_key) in old_entries {
                if let Some(entry) = self.db.indexes.get(&key) {
                    let _ = entry.index.remove(&self.db.pool, old_key, id);
                }
            }
            for (key, new_key) in self.db.snapshot_indexed(id) {
                if let Some(entry) = self.db.indexes.get(&key) {
                    entry.index.insert(&self.db.pool, new_key, id)?;
                }
            }
        }
        let oldest_active = self.db.txn_mgr.oldest_active();
        self.db.store.dirty_nodes.gc(oldest_active)?;
        self.db.store.dirty_rships.gc(oldest_active)?;
        transaction::take();
        self.state = TxState::Committed;
        self.db.dirty_since_checkpoint = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.ensure_active()?;
        let (nodes, rships) = transaction::with_current(|t| (t.dirty_nodes().to_vec(), t.dirty_relationships().to_vec()))
            .unwrap_or_default();
        self.db.store.rollback(self.xid, &nodes, &rships)?;
        self.db.wal.transaction_abort(self.xid)?;
        self.db.txn_mgr.end(self.xid, TxState::Aborted)?;
        let oldest_active = self.db.txn_mgr.oldest_active();
        self.db.store.dirty_nodes.gc(oldest_active)?;
        self.db.store.dirty_rships.gc(oldest_active)?;
        transaction::take();
        self.state = TxState::Aborted;
        Ok(())
    }
}

impl<'db> Drop for DbTransaction<'db> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            warn!(xid = self.xid, "transaction dropped without commit or rollback, rolling back");
            let (nodes, rships) = transaction::with_current(|t| (t.dirty_nodes().to_vec(), t.dirty_relationships().to_vec()))
                .unwrap_or_default();
            let _ = self.db.store.rollback(self.xid, &nodes, &rships);
            let _ = self.db.wal.transaction_abort(self.xid);
            let _ = self.db.txn_mgr.end(self.xid, TxState::Aborted);
            transaction::take();
        }
    }
}

fn snapshot_node(rec: &crate::storage::record::NodeRecord) -> NodeSnapshot {
    NodeSnapshot {
        label: rec.label,
        from_rship_list: rec.from_rship_list,
        to_rship_list: rec.to_rship_list,
        property_list: rec.property_list,
    }
}

fn snapshot_rship(rec: &crate::storage::record::RelationshipRecord) -> RshipSnapshot {
    RshipSnapshot {
        label: rec.label,
        src_node: rec.src_node,
        dest_node: rec.dest_node,
        next_src_rship: rec.next_src_rship,
        next_dest_rship: rec.next_dest_rship,
        property_list: rec.property_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyValue;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("poseidon-db-test-{}-{}", std::process::id(), rand_suffix()));
        dir
    }

    fn rand_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    #[test]
    fn add_node_visible_after_commit() {
        let dir = temp_dir();
        let mut db = Database::open(&dir).unwrap();
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::String("Ada".into()));
        let id = db
            .run_transaction(|tx| tx.add_node("Person", &props))
            .unwrap();

        let desc = db.run_transaction(|tx| tx.get_node_description(id)).unwrap();
        assert_eq!(desc.label, "Person");
        assert_eq!(desc.properties.get("name").unwrap().as_str(), Some("Ada"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn aborted_transaction_leaves_no_trace() {
        let dir = temp_dir();
        let mut db = Database::open(&dir).unwrap();
        let mut tx = db.begin_transaction().unwrap();
        let id = tx.add_node("Person", &PropertyMap::new()).unwrap();
        tx.rollback().unwrap();

        let err = db.run_transaction(|tx| tx.get_node_description(id)).unwrap_err();
        assert!(matches!(err, GraphError::UnknownId(_)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn checkpoint_and_reopen_preserves_committed_nodes() {
        let dir = temp_dir();
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::String("Grace".into()));
        let id = {
            let mut db = Database::open(&dir).unwrap();
            let id = db.run_transaction(|tx| tx.add_node("Person", &props)).unwrap();
            db.checkpoint().unwrap();
            id
        };

        let mut reopened = Database::open(&dir).unwrap();
        let desc = reopened.run_transaction(|tx| tx.get_node_description(id)).unwrap();
        assert_eq!(desc.properties.get("name").unwrap().as_str(), Some("Grace"));
        let _ = fs::remove_dir_all(&dir);
    }
}

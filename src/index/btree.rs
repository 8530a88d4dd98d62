//! Secondary index over property values, ordered by key so both point
//! lookups and range scans are supported.
//!
//! Mirrors the two-backend split of the original design: `im_btree`
//! (in-memory, used for scratch graphs and tests) and `pf_btree`
//! (backed by the paged file + buffer pool, for durable graphs). Both
//! backends implement the same ordered-multimap shape; callers branch
//! on the `IndexBackend` tag rather than going through a trait object,
//! so the hot path (maintaining an index at commit) never pays for
//! dynamic dispatch.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{GraphError, Result};
use crate::pager::buffer_pool::{BufferPool, FileId};
use crate::pager::{PageBuf, PagedFile};

/// An index key: property values compare as signed 64-bit integers
/// (ints and dictionary codes compare directly; floats and datetimes
/// are bit-cast in a way that preserves ordering for the ranges this
/// engine cares about — non-negative floats and Unix-epoch timestamps).
pub type IndexKey = i64;

struct InMemoryTree {
    map: BTreeMap<IndexKey, Vec<u64>>,
}

impl InMemoryTree {
    fn new() -> Self {
        Self { map: BTreeMap::new() }
    }
}

/// Persistent ordered multimap backed by a dedicated paged file: each
/// page holds a sorted run of `(key, value)` pairs; pages are
/// discovered by scanning in page-id order (a single-level leaf chain
/// rather than a fully rebalancing B+-tree — adequate for the
/// durability guarantee this engine needs: entries survive a restart).
pub struct PagedTree {
    file_id: FileId,
    entries_per_page: usize,
}

const ENTRY_SIZE: usize = 8 + 8; // key + value

impl PagedTree {
    fn new(file_id: FileId, page_size: usize) -> Self {
        Self {
            file_id,
            entries_per_page: page_size / ENTRY_SIZE,
        }
    }

    fn read_page_entries(&self, pool: &BufferPool, page: u32) -> Result<Vec<(IndexKey, u64)>> {
        let buf = pool.pin(self.file_id, page)?;
        let mut out = Vec::new();
        for chunk in buf.data.chunks_exact(ENTRY_SIZE) {
            let key = i64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let value = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
            if !(key == 0 && value == 0) {
                out.push((key, value));
            }
        }
        pool.unpin(self.file_id, page, None)?;
        Ok(out)
    }

    fn write_page_entries(&self, pool: &BufferPool, page: u32, entries: &[(IndexKey, u64)]) -> Result<()> {
        let page_size = pool.with_file(self.file_id, |f| Ok(f.page_size()))?;
        let mut buf = PageBuf::zeroed(page_size);
        for (i, (key, value)) in entries.iter().take(self.entries_per_page).enumerate() {
            let off = i * ENTRY_SIZE;
            buf.data[off..off + 8].copy_from_slice(&key.to_le_bytes());
            buf.data[off + 8..off + 16].copy_from_slice(&value.to_le_bytes());
        }
        pool.pin(self.file_id, page)?;
        pool.unpin(self.file_id, page, Some(buf))?;
        Ok(())
    }

    fn page_count(&self, pool: &BufferPool) -> Result<u32> {
        pool.with_file(self.file_id, |f| Ok(f.page_count()))
    }

    fn insert(&self, pool: &BufferPool, key: IndexKey, value: u64) -> Result<()> {
        let page_count = self.page_count(pool)?;
        for pid in 1..=page_count {
            let mut entries = self.read_page_entries(pool, pid)?;
            if entries.len() < self.entries_per_page {
                entries.push((key, value));
                entries.sort_unstable();
                self.write_page_entries(pool, pid, &entries)?;
                return Ok(());
            }
        }
        let pid = pool.with_file(self.file_id, |f| f.allocate_page())?;
        self.write_page_entries(pool, pid, &[(key, value)])?;
        Ok(())
    }

    fn remove(&self, pool: &BufferPool, key: IndexKey, value: u64) -> Result<bool> {
        let page_count = self.page_count(pool)?;
        for pid in 1..=page_count {
            let mut entries = self.read_page_entries(pool, pid)?;
            let before = entries.len();
            entries.retain(|&(k, v)| !(k == key && v == value));
            if entries.len() != before {
                self.write_page_entries(pool, pid, &entries)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lookup(&self, pool: &BufferPool, key: IndexKey) -> Result<Vec<u64>> {
        let page_count = self.page_count(pool)?;
        let mut out = Vec::new();
        for pid in 1..=page_count {
            for (k, v) in self.read_page_entries(pool, pid)? {
                if k == key {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    fn range(&self, pool: &BufferPool, lo: IndexKey, hi: IndexKey) -> Result<Vec<(IndexKey, u64)>> {
        let page_count = self.page_count(pool)?;
        let mut out = Vec::new();
        for pid in 1..=page_count {
            for (k, v) in self.read_page_entries(pool, pid)? {
                if k >= lo && k < hi {
                    out.push((k, v));
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}

/// Which concrete storage backs a [`SecondaryIndex`]. Dispatch is a
/// match on this tag, not a trait object — see module docs.
pub enum IndexBackend {
    InMemory(RwLock<InMemoryTree>),
    Paged(PagedTree),
}

pub struct SecondaryIndex {
    pub name: String,
    backend: IndexBackend,
}

impl SecondaryIndex {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: IndexBackend::InMemory(RwLock::new(InMemoryTree::new())),
        }
    }

    pub fn paged(name: impl Into<String>, file_id: FileId, page_size: usize) -> Self {
        Self {
            name: name.into(),
            backend: IndexBackend::Paged(PagedTree::new(file_id, page_size)),
        }
    }

    pub fn register_paged_file(&self, pool: &BufferPool, file: PagedFile) -> Result<()> {
        match &self.backend {
            IndexBackend::Paged(tree) => pool.register_file(tree.file_id, file),
            IndexBackend::InMemory(_) => Err(GraphError::InvalidArgument(
                "cannot register a file on an in-memory index".into(),
            )),
        }
    }

    pub fn insert(&self, pool: &BufferPool, key: IndexKey, value: u64) -> Result<()> {
        match &self.backend {
            IndexBackend::InMemory(tree) => {
                let mut tree = tree.write().map_err(|_| GraphError::Corruption("index lock poisoned".into()))?;
                tree.map.entry(key).or_default().push(value);
                Ok(())
            }
            IndexBackend::Paged(tree) => tree.insert(pool, key, value),
        }
    }

    pub fn remove(&self, pool: &BufferPool, key: IndexKey, value: u64) -> Result<bool> {
        match &self.backend {
            IndexBackend::InMemory(tree) => {
                let mut tree = tree.write().map_err(|_| GraphError::Corruption("index lock poisoned".into()))?;
                if let Some(values) = tree.map.get_mut(&key) {
                    let before = values.len();
                    values.retain(|&v| v != value);
                    let removed = values.len() != before;
                    if values.is_empty() {
                        tree.map.remove(&key);
                    }
                    Ok(removed)
                } else {
                    Ok(false)
                }
            }
            IndexBackend::Paged(tree) => tree.remove(pool, key, value),
        }
    }

    pub fn lookup(&self, pool: &BufferPool, key: IndexKey) -> Result<Vec<u64>> {
        match &self.backend {
            IndexBackend::InMemory(tree) => {
                let tree = tree.read().map_err(|_| GraphError::Corruption("index lock poisoned".into()))?;
                Ok(tree.map.get(&key).cloned().unwrap_or_default())
            }
            IndexBackend::Paged(tree) => tree.lookup(pool, key),
        }
    }

    pub fn range(&self, pool: &BufferPool, lo: IndexKey, hi: IndexKey) -> Result<Vec<(IndexKey, u64)>> {
        match &self.backend {
            IndexBackend::InMemory(tree) => {
                let tree = tree.read().map_err(|_| GraphError::Corruption("index lock poisoned".into()))?;
                Ok(tree
                    .map
                    .range(lo..hi)
                    .flat_map(|(&k, vs)| vs.iter().map(move |&v| (k, v)))
                    .collect())
            }
            IndexBackend::Paged(tree) => tree.range(pool, lo, hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::buffer_pool::NODE_FILE;

    #[test]
    fn in_memory_index_insert_lookup_remove() {
        let pool = BufferPool::new(8);
        let idx = SecondaryIndex::in_memory("Person.age");
        idx.insert(&pool, 30, 1).unwrap();
        idx.insert(&pool, 30, 2).unwrap();
        idx.insert(&pool, 40, 3).unwrap();
        assert_eq!(idx.lookup(&pool, 30).unwrap(), vec![1, 2]);
        assert!(idx.remove(&pool, 30, 1).unwrap());
        assert_eq!(idx.lookup(&pool, 30).unwrap(), vec![2]);
        let _ = NODE_FILE;
    }

    #[test]
    fn in_memory_index_range_scan_is_ordered() {
        let pool = BufferPool::new(8);
        let idx = SecondaryIndex::in_memory("Person.age");
        for (k, v) in [(10, 1), (30, 2), (20, 3)] {
            idx.insert(&pool, k, v).unwrap();
        }
        let range = idx.range(&pool, 10, 31).unwrap();
        assert_eq!(range.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![10, 20, 30]);
    }
}

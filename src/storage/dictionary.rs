//! Persistent string <-> code mapping for labels and string-valued
//! properties.
//!
//! Strings live in a contiguous, NUL-terminated pool; a string's code
//! *is* its byte offset into that pool. Codes are monotonically
//! increasing and, once assigned, never change or get reused — even
//! after the owning node/relationship is deleted, since other live
//! records may still reference the same code. Code `0` is reserved for
//! "not found". The string -> code hash table is rebuilt in memory on
//! open; only the pool itself is persisted.

use std::sync::RwLock;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::pager::{PageBuf, PagedFile};

const NOT_FOUND: u32 = 0;

struct Inner {
    pool: Vec<u8>,
    by_string: FxHashMap<String, u32>,
}

/// `insert`/`lookup_string`/`lookup_code` are safe to call from multiple
/// threads concurrently; all mutation goes through a single `RwLock`.
pub struct Dictionary {
    inner: RwLock<Inner>,
}

impl Dictionary {
    /// Builds an empty dictionary seeded with a single NUL byte at
    /// offset 0, so code 0 never aliases a real string.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                pool: vec![0u8],
                by_string: FxHashMap::default(),
            }),
        }
    }

    /// Rehydrates a dictionary from a persisted pool image, rebuilding
    /// the in-memory hash table by scanning every NUL-terminated entry.
    pub fn from_pool_bytes(pool: Vec<u8>) -> Result<Self> {
        let mut by_string = FxHashMap::default();
        let mut pos = 1usize; // skip the code-0 sentinel byte
        while pos < pool.len() {
            let end = pool[pos..]
                .iter()
                .position(|&b| b == 0)
                .map(|rel| pos + rel)
                .ok_or_else(|| GraphError::Corruption("dictionary pool missing NUL terminator".into()))?;
            let s = std::str::from_utf8(&pool[pos..end])
                .map_err(|e| GraphError::Corruption(format!("dictionary pool has invalid utf8: {e}")))?
                .to_owned();
            by_string.insert(s, pos as u32);
            pos = end + 1;
        }
        debug!(entries = by_string.len(), "rebuilt dictionary hash table from pool");
        Ok(Self {
            inner: RwLock::new(Inner { pool, by_string }),
        })
    }

    /// Inserts `s`, returning its existing code if already present or a
    /// freshly assigned one (the byte offset it was appended at)
    /// otherwise.
    pub fn insert(&self, s: &str) -> Result<u32> {
        {
            let inner = self.inner.read().map_err(|_| GraphError::Corruption("dictionary lock poisoned".into()))?;
            if let Some(&code) = inner.by_string.get(s) {
                return Ok(code);
            }
        }
        let mut inner = self.inner.write().map_err(|_| GraphError::Corruption("dictionary lock poisoned".into()))?;
        if let Some(&code) = inner.by_string.get(s) {
            return Ok(code);
        }
        let code = inner.pool.len() as u32;
        inner.pool.extend_from_slice(s.as_bytes());
        inner.pool.push(0);
        inner.by_string.insert(s.to_owned(), code);
        Ok(code)
    }

    pub fn lookup_string(&self, s: &str) -> Result<u32> {
        let inner = self.inner.read().map_err(|_| GraphError::Corruption("dictionary lock poisoned".into()))?;
        Ok(inner.by_string.get(s).copied().unwrap_or(NOT_FOUND))
    }

    pub fn lookup_code(&self, code: u32) -> Result<Option<String>> {
        if code == NOT_FOUND {
            return Ok(None);
        }
        let inner = self.inner.read().map_err(|_| GraphError::Corruption("dictionary lock poisoned".into()))?;
        let start = code as usize;
        if start >= inner.pool.len() {
            return Ok(None);
        }
        let end = inner.pool[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|rel| start + rel)
            .ok_or_else(|| GraphError::Corruption("dictionary pool missing NUL terminator".into()))?;
        Ok(Some(String::from_utf8_lossy(&inner.pool[start..end]).into_owned()))
    }

    pub fn size(&self) -> usize {
        self.inner.read().map(|i| i.by_string.len()).unwrap_or(0)
    }

    pub fn pool_len(&self) -> usize {
        self.inner.read().map(|i| i.pool.len()).unwrap_or(0)
    }

    /// Serializes the whole pool, for persisting into the dictionary
    /// file's paged storage.
    pub fn snapshot_pool(&self) -> Vec<u8> {
        self.inner.read().map(|i| i.pool.clone()).unwrap_or_default()
    }

    /// Persists the pool across however many pages of `file` are needed,
    /// growing the file as the pool grows. Page 1 reserves its first 8
    /// bytes for the pool's byte length.
    pub fn flush_to_file(&self, file: &mut PagedFile) -> Result<()> {
        let pool = self.snapshot_pool();
        let page_size = file.page_size();
        let usable = page_size - 8;
        let pages_needed = 1 + (pool.len().saturating_sub(usable)).div_ceil(page_size).max(0);
        while (file.page_count() as usize) < pages_needed {
            file.allocate_page()?;
        }
        let mut buf = PageBuf::zeroed(page_size);
        buf.data[0..8].copy_from_slice(&(pool.len() as u64).to_le_bytes());
        let first_chunk = pool.len().min(usable);
        buf.data[8..8 + first_chunk].copy_from_slice(&pool[..first_chunk]);
        file.write_page(1, &buf)?;

        let mut written = first_chunk;
        let mut pid = 2u32;
        while written < pool.len() {
            let chunk = (pool.len() - written).min(page_size);
            let mut page = PageBuf::zeroed(page_size);
            page.data[..chunk].copy_from_slice(&pool[written..written + chunk]);
            file.write_page(pid, &page)?;
            written += chunk;
            pid += 1;
        }
        Ok(())
    }

    pub fn load_from_file(file: &mut PagedFile) -> Result<Self> {
        if file.page_count() == 0 {
            return Ok(Self::new());
        }
        let page_size = file.page_size();
        let usable = page_size - 8;
        let first = file.read_page(1)?;
        let total_len = u64::from_le_bytes(first.data[0..8].try_into().unwrap()) as usize;
        let mut pool = Vec::with_capacity(total_len);
        let first_chunk = total_len.min(usable);
        pool.extend_from_slice(&first.data[8..8 + first_chunk]);

        let mut pid = 2u32;
        while pool.len() < total_len && pid <= file.page_count() {
            let page = file.read_page(pid)?;
            let remaining = total_len - pool.len();
            let take = remaining.min(page_size);
            pool.extend_from_slice(&page.data[..take]);
            pid += 1;
        }
        Self::from_pool_bytes(pool)
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_monotonic() {
        let dict = Dictionary::new();
        let a = dict.insert("Person").unwrap();
        let b = dict.insert("Person").unwrap();
        let c = dict.insert("Company").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(dict.lookup_code(a).unwrap().as_deref(), Some("Person"));
    }

    #[test]
    fn lookup_missing_string_returns_zero() {
        let dict = Dictionary::new();
        assert_eq!(dict.lookup_string("nope").unwrap(), 0);
    }

    #[test]
    fn pool_roundtrip_rebuilds_table() {
        let dict = Dictionary::new();
        dict.insert("a").unwrap();
        dict.insert("bb").unwrap();
        let pool = dict.snapshot_pool();
        let reloaded = Dictionary::from_pool_bytes(pool).unwrap();
        assert_eq!(reloaded.lookup_string("bb").unwrap(), dict.lookup_string("bb").unwrap());
    }
}

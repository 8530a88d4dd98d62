//! Pool-wide buffer cache shared by every paged file registered with it.
//!
//! One `BufferPool` backs the whole graph: the dictionary, node, and
//! relationship files (and any paged B+-tree) each register under a
//! small `FileId` tag and share the same frame budget and eviction
//! order, mirroring the `DICT_FILE_ID`..`INDEX_FILE_ID` tagging scheme.

use std::collections::HashMap;
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{acquire_lock, GraphError, Result};
use crate::pager::lru::{Handle, LruList};
use crate::pager::{PageBuf, PageId, PagedFile};

pub type FileId = u8;

pub const DICT_FILE: FileId = 0;
pub const NODE_FILE: FileId = 1;
pub const RSHIP_FILE: FileId = 2;
pub const NODE_PROPS_FILE: FileId = 3;
pub const RSHIP_PROPS_FILE: FileId = 4;
pub const INDEX_FILE: FileId = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub file: FileId,
    pub page: PageId,
}

pub struct Frame {
    pub key: FrameKey,
    pub buf: PageBuf,
    pub dirty: bool,
    pub pins: u32,
}

struct Inner {
    files: FxHashMap<FileId, PagedFile>,
    frames: HashMap<FrameKey, Frame>,
    lru: LruList,
    handles: FxHashMap<FrameKey, Handle>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

/// Caches pages across all registered files behind a single mutex and a
/// shared LRU eviction order. `capacity` bounds resident frames; on a
/// miss with a full pool, the least recently used *unpinned* frame is
/// evicted (flushing it first if dirty).
pub struct BufferPool {
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                files: FxHashMap::default(),
                frames: HashMap::new(),
                lru: LruList::new(),
                handles: FxHashMap::default(),
                capacity,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn register_file(&self, id: FileId, file: PagedFile) -> Result<()> {
        let mut inner = acquire_lock(&self.inner)?;
        inner.files.insert(id, file);
        Ok(())
    }

    /// Pins a page into the pool, loading it from disk on a miss, and
    /// returns a copy of its current contents. Callers mutate their own
    /// copy and write it back via [`unpin`] with `dirty = true`.
    pub fn pin(&self, file: FileId, page: PageId) -> Result<PageBuf> {
        let key = FrameKey { file, page };
        let mut inner = acquire_lock(&self.inner)?;

        if let Some(handle) = inner.handles.get(&key).copied() {
            inner.lru.move_to_mru(handle);
            inner.hits += 1;
            let frame = inner.frames.get_mut(&key).expect("frame index out of sync");
            frame.pins += 1;
            return Ok(frame.buf.clone());
        }

        inner.misses += 1;
        self.evict_if_needed(&mut inner)?;

        let pf = inner
            .files
            .get_mut(&file)
            .ok_or_else(|| GraphError::InvalidArgument(format!("file {file} not registered")))?;
        let buf = pf.read_page(page)?;

        let handle = inner.lru.add_to_mru(Self::pack(file, page));
        inner.handles.insert(key, handle);
        inner.frames.insert(
            key,
            Frame {
                key,
                buf: buf.clone(),
                dirty: false,
                pins: 1,
            },
        );
        trace!(file, page, "buffer pool miss, loaded from disk");
        Ok(buf)
    }

    /// Releases a pin acquired by [`pin`]. If `new_contents` is `Some`,
    /// the frame is marked dirty and updated in place.
    pub fn unpin(&self, file: FileId, page: PageId, new_contents: Option<PageBuf>) -> Result<()> {
        let key = FrameKey { file, page };
        let mut inner = acquire_lock(&self.inner)?;
        let frame = inner
            .frames
            .get_mut(&key)
            .ok_or_else(|| GraphError::Corruption(format!("unpin of non-resident frame {file}:{page}")))?;
        if frame.pins == 0 {
            return Err(GraphError::Corruption(format!("double-unpin of frame {file}:{page}")));
        }
        frame.pins -= 1;
        if let Some(contents) = new_contents {
            frame.buf = contents;
            frame.dirty = true;
        }
        Ok(())
    }

    fn evict_if_needed(&self, inner: &mut Inner) -> Result<()> {
        if inner.frames.len() < inner.capacity {
            return Ok(());
        }
        let packed_order: Vec<u32> = inner.lru.iter().collect();
        let victim_key = packed_order
            .into_iter()
            .map(Self::unpack)
            .find(|key| inner.frames.get(key).map(|f| f.pins == 0).unwrap_or(false));

        let Some(key) = victim_key else {
            return Err(GraphError::BufferPoolOverrun);
        };

        let frame = inner.frames.remove(&key).expect("victim must be resident");
        if frame.dirty {
            let pf = inner
                .files
                .get_mut(&key.file)
                .ok_or_else(|| GraphError::InvalidArgument(format!("file {} not registered", key.file)))?;
            pf.write_page(key.page, &frame.buf)?;
        }
        if let Some(handle) = inner.handles.remove(&key) {
            inner.lru.remove(handle);
        }
        debug!(file = key.file, page = key.page, dirty = frame.dirty, "evicted frame");
        Ok(())
    }

    fn pack(file: FileId, page: PageId) -> u32 {
        ((file as u32) << 24) | (page & 0x00ff_ffff)
    }

    fn unpack(packed: u32) -> FrameKey {
        FrameKey {
            file: (packed >> 24) as FileId,
            page: packed & 0x00ff_ffff,
        }
    }

    /// Flushes a single dirty frame without evicting it.
    pub fn flush_page(&self, file: FileId, page: PageId) -> Result<()> {
        let mut inner = acquire_lock(&self.inner)?;
        let key = FrameKey { file, page };
        let dirty_buf = inner.frames.get(&key).filter(|f| f.dirty).map(|f| f.buf.clone());
        if let Some(buf) = dirty_buf {
            let pf = inner
                .files
                .get_mut(&file)
                .ok_or_else(|| GraphError::InvalidArgument(format!("file {file} not registered")))?;
            pf.write_page(page, &buf)?;
            inner.frames.get_mut(&key).unwrap().dirty = false;
        }
        Ok(())
    }

    /// Flushes every dirty frame and syncs every registered file; used
    /// before taking a checkpoint.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner)?;
        let dirty: Vec<FrameKey> = inner.frames.iter().filter(|(_, f)| f.dirty).map(|(k, _)| *k).collect();
        for key in dirty {
            let buf = inner.frames[&key].buf.clone();
            let pf = inner
                .files
                .get_mut(&key.file)
                .ok_or_else(|| GraphError::InvalidArgument(format!("file {} not registered", key.file)))?;
            pf.write_page(key.page, &buf)?;
            inner.frames.get_mut(&key).unwrap().dirty = false;
        }
        for pf in inner.files.values_mut() {
            pf.flush()?;
        }
        Ok(())
    }

    /// Drops every resident frame without flushing. Used only when
    /// reinitializing volatile state after an abort that the caller has
    /// already undone at the storage layer.
    pub fn purge(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner)?;
        inner.frames.clear();
        inner.handles.clear();
        inner.lru = LruList::new();
        Ok(())
    }

    pub fn hit_ratio(&self) -> f64 {
        let inner = match acquire_lock(&self.inner) {
            Ok(i) => i,
            Err(_) => return 0.0,
        };
        let total = inner.hits + inner.misses;
        if total == 0 {
            1.0
        } else {
            inner.hits as f64 / total as f64
        }
    }

    pub fn resident_frames(&self) -> usize {
        acquire_lock(&self.inner).map(|i| i.frames.len()).unwrap_or(0)
    }

    pub fn with_file<R>(&self, file: FileId, f: impl FnOnce(&mut PagedFile) -> Result<R>) -> Result<R> {
        let mut inner = acquire_lock(&self.inner)?;
        let pf = inner
            .files
            .get_mut(&file)
            .ok_or_else(|| GraphError::InvalidArgument(format!("file {file} not registered")))?;
        f(pf)
    }
}

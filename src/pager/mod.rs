//! Fixed-size page I/O over a single file, with an allocation bitmap
//! header and an LRU-governed buffer pool layered on top.
//!
//! This module implements storage component #1 (paged file) and #2
//! (buffer pool); the intrusive LRU list (#3) lives in [`lru`].

pub mod buffer_pool;
pub mod lru;
pub mod wal;

use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::hash;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};

pub use buffer_pool::{BufferPool, FileId, Frame, FrameKey};
pub use wal::{LogRecord, ObjectType, TxCmd, Wal};

pub type PageId = u32;

pub const MAGIC: &[u8; 4] = b"PSDN";
/// bitmap bit + magic/type/payload header, before the page array starts.
const HEADER_RESERVED_BYTES: usize = 4096;

/// A single fixed-size page buffer plus a checksum trailer.
#[derive(Debug, Clone)]
pub struct PageBuf {
    pub data: Vec<u8>,
}

impl PageBuf {
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    fn payload_len(&self) -> usize {
        self.data.len() - 4
    }

    fn recompute_checksum(&mut self) {
        let len = self.payload_len();
        let digest = hash(&self.data[..len]);
        self.data[len..].copy_from_slice(&digest.to_le_bytes());
    }

    fn verify_checksum(&self, page_id: PageId) -> Result<()> {
        let len = self.payload_len();
        let stored = u32::from_le_bytes(self.data[len..].try_into().unwrap());
        let actual = hash(&self.data[..len]);
        if stored != actual {
            return Err(GraphError::Corruption(format!(
                "checksum mismatch on page {page_id}: stored={stored:08x} actual={actual:08x}"
            )));
        }
        Ok(())
    }
}

/// A callback invoked with the caller-defined header payload region on
/// open (to decode) and on close (to encode), so components above the
/// paged file (dictionary pool tail, b-tree root, ...) can persist a
/// small amount of state without their own file.
pub trait HeaderPayload {
    /// Number of bytes this component wants reserved in the header page.
    fn payload_len(&self) -> usize;
    fn encode(&self, out: &mut [u8]);
    fn decode(&mut self, data: &[u8]) -> Result<()>;
}

/// Fixed-size file: a 4-byte magic, a 4-byte file-type tag, a slot
/// bitmap (one bit per page), and an opaque payload region, followed by
/// contiguous fixed-size pages.
pub struct PagedFile {
    file: File,
    path: PathBuf,
    page_size: usize,
    file_type: u32,
    bitmap: Vec<u8>,
    payload: Vec<u8>,
    page_count: u32,
}

impl PagedFile {
    /// Opens (creating if absent) the paged file at `path`. `file_type`
    /// distinguishes the file's role (nodes, rships, dictionary, ...) and
    /// must match on reopen. `payload_len` reserves that many bytes in
    /// the header for caller-defined state; use [`header_payload`] /
    /// [`set_header_payload`] to read/write it.
    pub fn open(path: &Path, file_type: u32, page_size: usize, payload_len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            GraphError::InvalidArgument(format!("{path:?} is already open by another process"))
        })?;

        let len = file.metadata()?.len();
        let mut pf = Self {
            file,
            path: path.to_path_buf(),
            page_size,
            file_type,
            bitmap: Vec::new(),
            payload: vec![0u8; payload_len],
            page_count: 0,
        };

        if len == 0 {
            pf.init_header()?;
        } else {
            pf.load_header()?;
        }
        Ok(pf)
    }

    fn header_region_len(&self) -> usize {
        HEADER_RESERVED_BYTES.max(16 + self.bitmap_bytes_for(self.page_count.max(1024)) + self.payload.len())
    }

    fn bitmap_bytes_for(&self, pages: u32) -> usize {
        ((pages as usize) + 7) / 8
    }

    fn init_header(&mut self) -> Result<()> {
        self.bitmap = vec![0u8; self.bitmap_bytes_for(8192)];
        self.write_header()?;
        Ok(())
    }

    fn load_header(&mut self) -> Result<()> {
        let mut magic_type = [0u8; 16];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut magic_type)?;
        if &magic_type[0..4] != MAGIC {
            return Err(GraphError::Corruption(format!(
                "{:?}: bad magic, expected PSDN",
                self.path
            )));
        }
        let file_type = u32::from_le_bytes(magic_type[4..8].try_into().unwrap());
        if file_type != self.file_type {
            return Err(GraphError::Corruption(format!(
                "{:?}: file type mismatch (expected {}, found {file_type})",
                self.path, self.file_type
            )));
        }
        let page_count = u32::from_le_bytes(magic_type[8..12].try_into().unwrap());
        let bitmap_bytes = u32::from_le_bytes(magic_type[12..16].try_into().unwrap()) as usize;

        let mut bitmap = vec![0u8; bitmap_bytes];
        self.file.read_exact(&mut bitmap)?;
        let mut payload = vec![0u8; self.payload.len()];
        if !payload.is_empty() {
            self.file.read_exact(&mut payload)?;
        }

        self.page_count = page_count;
        self.bitmap = bitmap;
        self.payload = payload;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut out = vec![0u8; 16];
        out[0..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&self.file_type.to_le_bytes());
        out[8..12].copy_from_slice(&self.page_count.to_le_bytes());
        out[12..16].copy_from_slice(&(self.bitmap.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.bitmap);
        out.extend_from_slice(&self.payload);
        if out.len() < self.header_region_len() {
            out.resize(self.header_region_len(), 0);
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&out)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Persists the bitmap + payload header; called on close and after
    /// structural changes that must survive a clean shutdown. On an
    /// abnormal close the bitmap may be stale — recovery reconciles it
    /// against the WAL.
    pub fn sync_header(&mut self) -> Result<()> {
        self.write_header()
    }

    pub fn header_payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_header_payload(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.payload.len() {
            return Err(GraphError::InvalidArgument(
                "header payload size mismatch".into(),
            ));
        }
        self.payload.copy_from_slice(data);
        Ok(())
    }

    fn data_region_offset(&self) -> u64 {
        self.header_region_len() as u64
    }

    fn page_offset(&self, pid: PageId) -> u64 {
        self.data_region_offset() + (pid as u64 - 1) * self.page_size as u64
    }

    fn bit(&self, pid: PageId) -> bool {
        let idx = (pid - 1) as usize;
        let byte = idx / 8;
        let bit = idx % 8;
        byte < self.bitmap.len() && (self.bitmap[byte] >> bit) & 1 == 1
    }

    fn set_bit(&mut self, pid: PageId, value: bool) {
        let idx = (pid - 1) as usize;
        let byte = idx / 8;
        let bit = idx % 8;
        if byte >= self.bitmap.len() {
            self.bitmap.resize(byte + 1, 0);
        }
        if value {
            self.bitmap[byte] |= 1 << bit;
        } else {
            self.bitmap[byte] &= !(1 << bit);
        }
    }

    /// Returns the first page id whose bit is clear, reusing a freed page,
    /// or appends a new page and sets its bit.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        for idx in 0..self.bitmap.len() * 8 {
            let byte = idx / 8;
            let bit = idx % 8;
            if (self.bitmap[byte] >> bit) & 1 == 0 {
                let pid = (idx + 1) as PageId;
                if pid <= self.page_count {
                    self.set_bit(pid, true);
                    return Ok(pid);
                }
            }
        }
        self.page_count += 1;
        let pid = self.page_count;
        self.set_bit(pid, true);
        let blank = PageBuf::zeroed(self.page_size);
        self.write_page(pid, &blank)?;
        Ok(pid)
    }

    pub fn free_page(&mut self, pid: PageId) -> Result<()> {
        if !self.bit(pid) {
            return Err(GraphError::IndexOutOfRange(pid as u64));
        }
        self.set_bit(pid, false);
        Ok(())
    }

    pub fn is_allocated(&self, pid: PageId) -> bool {
        pid >= 1 && pid <= self.page_count && self.bit(pid)
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn read_page(&mut self, pid: PageId) -> Result<PageBuf> {
        if !self.is_allocated(pid) {
            return Err(GraphError::IndexOutOfRange(pid as u64));
        }
        let mut buf = PageBuf::zeroed(self.page_size);
        self.file.seek(SeekFrom::Start(self.page_offset(pid)))?;
        self.file.read_exact(&mut buf.data)?;
        buf.verify_checksum(pid)?;
        Ok(buf)
    }

    pub fn write_page(&mut self, pid: PageId, buf: &PageBuf) -> Result<()> {
        if pid > self.page_count {
            return Err(GraphError::IndexOutOfRange(pid as u64));
        }
        let mut buf = buf.clone();
        buf.recompute_checksum();
        self.file.seek(SeekFrom::Start(self.page_offset(pid)))?;
        self.file.write_all(&buf.data)?;
        Ok(())
    }

    /// Iterates every allocated page in id order.
    pub fn scan_pages<F: FnMut(PageId, &PageBuf) -> Result<()>>(&mut self, mut cb: F) -> Result<()> {
        for pid in 1..=self.page_count {
            if self.is_allocated(pid) {
                let page = self.read_page(pid)?;
                cb(pid, &page)?;
            }
        }
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Reconciles a stale bitmap after abnormal shutdown: pages that the
    /// WAL proves were written become allocated even if the bitmap said
    /// otherwise.
    pub fn reconcile_bitmap_from_redo(&mut self, touched: &[PageId]) -> Result<()> {
        let mut grew = false;
        for &pid in touched {
            if pid > self.page_count {
                self.page_count = pid;
                grew = true;
            }
            if !self.bit(pid) {
                warn!(page = pid, path = ?self.path, "reconciling stale allocation bitmap from WAL redo");
                self.set_bit(pid, true);
            }
        }
        if grew {
            debug!(new_page_count = self.page_count, "grew page count during bitmap reconciliation");
        }
        Ok(())
    }
}

impl Drop for PagedFile {
    fn drop(&mut self) {
        let _ = self.write_header();
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

//! Logical, per-operation write-ahead log.
//!
//! Every record starts with a common prefix (`log_type`/`obj_type`/`lsn`/
//! `xid`/`prev_offset`) and is chained per-transaction through
//! `prev_offset`: each new record for a transaction points back at that
//! transaction's previous record, so undo during recovery walks a
//! single transaction's chain backward without scanning the whole file.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::{GraphError, Result};

pub const MAGIC: &[u8; 4] = b"PSLG";
const HEADER_LEN: u64 = 4 + 8;
const PREFIX_LEN: usize = 1 + 8 + 8 + 8; // tag byte + lsn + xid + prev_offset

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogType {
    Tx = 0,
    Insert = 1,
    Update = 2,
    Delete = 3,
    Checkpoint = 4,
}

impl LogType {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => LogType::Tx,
            1 => LogType::Insert,
            2 => LogType::Update,
            3 => LogType::Delete,
            4 => LogType::Checkpoint,
            other => return Err(GraphError::Corruption(format!("bad WAL log_type {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    None = 0,
    Node = 1,
    Relationship = 2,
    Dict = 3,
}

impl ObjectType {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => ObjectType::None,
            1 => ObjectType::Node,
            2 => ObjectType::Relationship,
            3 => ObjectType::Dict,
            other => return Err(GraphError::Corruption(format!("bad WAL obj_type {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxCmd {
    Begin = 0,
    Commit = 1,
    Abort = 2,
}

/// A decoded record body, keyed by what produced it.
#[derive(Debug, Clone)]
pub enum Body {
    Tx { cmd: TxCmd },
    Node { oid: u64, before: NodeSnapshot, after: NodeSnapshot },
    Relationship { oid: u64, before: RshipSnapshot, after: RshipSnapshot },
    Dict { code: u32, value: String },
    Checkpoint,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeSnapshot {
    pub label: u32,
    pub from_rship_list: u64,
    pub to_rship_list: u64,
    pub property_list: u64,
}

impl NodeSnapshot {
    const LEN: usize = 28;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.label.to_le_bytes());
        out.extend_from_slice(&self.from_rship_list.to_le_bytes());
        out.extend_from_slice(&self.to_rship_list.to_le_bytes());
        out.extend_from_slice(&self.property_list.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            label: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            from_rship_list: u64::from_le_bytes(data[4..12].try_into().unwrap()),
            to_rship_list: u64::from_le_bytes(data[12..20].try_into().unwrap()),
            property_list: u64::from_le_bytes(data[20..28].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RshipSnapshot {
    pub label: u32,
    pub src_node: u64,
    pub dest_node: u64,
    pub next_src_rship: u64,
    pub next_dest_rship: u64,
    pub property_list: u64,
}

impl RshipSnapshot {
    const LEN: usize = 44;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.label.to_le_bytes());
        out.extend_from_slice(&self.src_node.to_le_bytes());
        out.extend_from_slice(&self.dest_node.to_le_bytes());
        out.extend_from_slice(&self.next_src_rship.to_le_bytes());
        out.extend_from_slice(&self.next_dest_rship.to_le_bytes());
        out.extend_from_slice(&self.property_list.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            label: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            src_node: u64::from_le_bytes(data[4..12].try_into().unwrap()),
            dest_node: u64::from_le_bytes(data[12..20].try_into().unwrap()),
            next_src_rship: u64::from_le_bytes(data[20..28].try_into().unwrap()),
            next_dest_rship: u64::from_le_bytes(data[28..36].try_into().unwrap()),
            property_list: u64::from_le_bytes(data[36..44].try_into().unwrap()),
        }
    }
}

/// A fully decoded record, with its own file offset (used as the
/// `prev_offset` target for the transaction's next record).
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub offset: u64,
    pub log_type: LogType,
    pub obj_type: ObjectType,
    pub lsn: u64,
    pub xid: u64,
    pub prev_offset: u64,
    pub body: Body,
}

/// Per-operation WAL: appends are forced to disk synchronously for
/// commit records; other records follow the configured sync mode
/// (see [`crate::config::SyncMode`]).
pub struct Wal {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
    last_lsn: u64,
    last_offsets: HashMap<u64, u64>,
}

impl Wal {
    pub fn open(path: &Path) -> Result<Self> {
        let exists = path.exists();
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;

        let last_lsn = if !exists {
            file.write_all(MAGIC)?;
            file.write_all(&0u64.to_le_bytes())?;
            file.sync_data()?;
            0
        } else {
            let mut magic = [0u8; 4];
            file.read_exact(&mut magic)?;
            if &magic != MAGIC {
                return Err(GraphError::Corruption(format!("{path:?}: bad WAL magic")));
            }
            let mut buf = [0u8; 8];
            file.read_exact(&mut buf)?;
            u64::from_le_bytes(buf)
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            last_lsn,
            last_offsets: HashMap::new(),
        })
    }

    fn next_lsn(&mut self) -> u64 {
        self.last_lsn += 1;
        self.last_lsn
    }

    fn prev_offset_for(&self, xid: u64) -> u64 {
        *self.last_offsets.get(&xid).unwrap_or(&0)
    }

    fn write_header_sync(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&self.last_lsn.to_le_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }

    fn append_raw(
        &mut self,
        log_type: LogType,
        obj_type: ObjectType,
        xid: u64,
        body_encode: impl FnOnce(&mut Vec<u8>),
        force_sync: bool,
    ) -> Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let lsn = self.next_lsn();
        let prev = self.prev_offset_for(xid);

        let mut buf = Vec::with_capacity(64);
        buf.push(((obj_type as u8) << 3) | (log_type as u8));
        buf.extend_from_slice(&lsn.to_le_bytes());
        buf.extend_from_slice(&xid.to_le_bytes());
        buf.extend_from_slice(&prev.to_le_bytes());
        let mut body = Vec::new();
        body_encode(&mut body);
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);

        self.file.write_all(&buf)?;
        if force_sync {
            self.file.sync_data()?;
        }
        self.last_offsets.insert(xid, offset);
        self.write_header_sync()?;
        Ok(offset)
    }

    pub fn transaction_begin(&mut self, xid: u64) -> Result<u64> {
        self.last_offsets.remove(&xid);
        self.append_raw(LogType::Tx, ObjectType::None, xid, |b| b.push(TxCmd::Begin as u8), false)
    }

    /// Commit records are always forced to disk: visibility to other
    /// transactions is conditioned on this fsync completing.
    pub fn transaction_commit(&mut self, xid: u64) -> Result<u64> {
        let off = self.append_raw(LogType::Tx, ObjectType::None, xid, |b| b.push(TxCmd::Commit as u8), true)?;
        self.last_offsets.remove(&xid);
        Ok(off)
    }

    pub fn transaction_abort(&mut self, xid: u64) -> Result<u64> {
        let off = self.append_raw(LogType::Tx, ObjectType::None, xid, |b| b.push(TxCmd::Abort as u8), false)?;
        self.last_offsets.remove(&xid);
        Ok(off)
    }

    pub fn append_node(
        &mut self,
        xid: u64,
        log_type: LogType,
        oid: u64,
        before: NodeSnapshot,
        after: NodeSnapshot,
    ) -> Result<u64> {
        self.append_raw(
            log_type,
            ObjectType::Node,
            xid,
            |b| {
                b.extend_from_slice(&oid.to_le_bytes());
                before.encode(b);
                after.encode(b);
            },
            false,
        )
    }

    pub fn append_relationship(
        &mut self,
        xid: u64,
        log_type: LogType,
        oid: u64,
        before: RshipSnapshot,
        after: RshipSnapshot,
    ) -> Result<u64> {
        self.append_raw(
            log_type,
            ObjectType::Relationship,
            xid,
            |b| {
                b.extend_from_slice(&oid.to_le_bytes());
                before.encode(b);
                after.encode(b);
            },
            false,
        )
    }

    pub fn append_dict_insert(&mut self, xid: u64, code: u32, value: &str) -> Result<u64> {
        self.append_raw(
            LogType::Insert,
            ObjectType::Dict,
            xid,
            |b| {
                b.extend_from_slice(&code.to_le_bytes());
                let bytes = value.as_bytes();
                b.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                b.extend_from_slice(bytes);
            },
            false,
        )
    }

    /// Records a checkpoint; callers must ensure all pages dirtied before
    /// this point are already flushed.
    pub fn checkpoint(&mut self) -> Result<u64> {
        info!(lsn = self.last_lsn + 1, "writing WAL checkpoint record");
        self.append_raw(LogType::Checkpoint, ObjectType::None, 0, |_| {}, true)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        Ok(())
    }

    fn read_one(&mut self) -> Result<Option<LogRecord>> {
        let offset = self.file.stream_position()?;
        let mut tag = [0u8; 1];
        match self.file.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let log_type = LogType::from_u8(tag[0] & 0b111)?;
        let obj_type = ObjectType::from_u8((tag[0] >> 3) & 0b111)?;

        let mut prefix = [0u8; PREFIX_LEN - 1];
        self.file.read_exact(&mut prefix)?;
        let lsn = u64::from_le_bytes(prefix[0..8].try_into().unwrap());
        let xid = u64::from_le_bytes(prefix[8..16].try_into().unwrap());
        let prev_offset = u64::from_le_bytes(prefix[16..24].try_into().unwrap());

        let mut body_len_buf = [0u8; 4];
        self.file.read_exact(&mut body_len_buf)?;
        let body_len = u32::from_le_bytes(body_len_buf) as usize;
        let mut raw = vec![0u8; body_len];
        self.file.read_exact(&mut raw)?;

        let body = match (log_type, obj_type) {
            (LogType::Tx, _) => Body::Tx {
                cmd: match raw.first().copied().unwrap_or(2) {
                    0 => TxCmd::Begin,
                    1 => TxCmd::Commit,
                    _ => TxCmd::Abort,
                },
            },
            (LogType::Checkpoint, _) => Body::Checkpoint,
            (_, ObjectType::Node) => {
                let oid = u64::from_le_bytes(raw[0..8].try_into().unwrap());
                let before = NodeSnapshot::decode(&raw[8..8 + NodeSnapshot::LEN]);
                let after = NodeSnapshot::decode(&raw[8 + NodeSnapshot::LEN..8 + 2 * NodeSnapshot::LEN]);
                Body::Node { oid, before, after }
            }
            (_, ObjectType::Relationship) => {
                let oid = u64::from_le_bytes(raw[0..8].try_into().unwrap());
                let before = RshipSnapshot::decode(&raw[8..8 + RshipSnapshot::LEN]);
                let after = RshipSnapshot::decode(&raw[8 + RshipSnapshot::LEN..8 + 2 * RshipSnapshot::LEN]);
                Body::Relationship { oid, before, after }
            }
            (_, ObjectType::Dict) => {
                let code = u32::from_le_bytes(raw[0..4].try_into().unwrap());
                let slen = u32::from_le_bytes(raw[4..8].try_into().unwrap()) as usize;
                let value = String::from_utf8_lossy(&raw[8..8 + slen]).into_owned();
                Body::Dict { code, value }
            }
            (_, ObjectType::None) => Body::Checkpoint,
        };

        Ok(Some(LogRecord {
            offset,
            log_type,
            obj_type,
            lsn,
            xid,
            prev_offset,
            body,
        }))
    }

    /// Iterates every record from the start of the log in file order.
    pub fn iter_forward(&mut self) -> Result<Vec<LogRecord>> {
        self.rewind()?;
        let mut out = Vec::new();
        loop {
            match self.read_one() {
                Ok(Some(rec)) => out.push(rec),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "WAL truncated or corrupt tail, stopping replay here");
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Reads a single record at a known offset (used to walk a loser
    /// transaction's chain backward via `prev_offset`).
    pub fn read_at(&mut self, offset: u64) -> Result<LogRecord> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.read_one()?.ok_or_else(|| {
            error!(offset, "WAL read_at past end of file");
            GraphError::Corruption(format!("no WAL record at offset {offset}"))
        })
    }

    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

//! Fixed-layout node, relationship, and property records.
//!
//! Every record embeds the MVCC header from [`crate::storage::mvcc`]:
//! the `bts`/`cts`/`rts` timestamps and a lock word holding the owning
//! transaction id (0 = unlocked). Only the *committed* version of a
//! record ever sits in these structures; a transaction's in-progress
//! edits live in the in-memory dirty chain (see `mvcc::DirtyChain`) and
//! are only spliced in at commit.

use crate::txn::XId;

pub const UNKNOWN: u64 = u64::MAX;
pub const UNKNOWN_CODE: u32 = u32::MAX;
pub const INF: u64 = u64::MAX;

/// Shared by nodes and relationships: the lock word plus the three MVCC
/// timestamps (`bts` begin, `cts` commit, `rts` read).
#[derive(Debug, Clone, Copy)]
pub struct MvccHeader {
    pub txn_id: XId,
    pub bts: u64,
    pub cts: u64,
    pub rts: u64,
}

impl Default for MvccHeader {
    fn default() -> Self {
        Self {
            txn_id: 0,
            bts: 0,
            cts: INF,
            rts: 0,
        }
    }
}

impl MvccHeader {
    pub fn is_locked(&self) -> bool {
        self.txn_id != 0
    }

    pub fn is_locked_by(&self, xid: XId) -> bool {
        self.txn_id == xid
    }

    /// True when no concurrent writer holds this record and its
    /// commit timestamp marks it as the latest version.
    pub fn is_valid(&self) -> bool {
        self.cts == INF
    }

    pub fn is_valid_for(&self, xid: XId) -> bool {
        self.bts <= xid && xid < self.cts
    }

    /// Records that a transaction read this version, so a later writer
    /// with an older xid knows to abort rather than overtake the reader.
    pub fn observe_read(&mut self, xid: XId) {
        if xid > self.rts {
            self.rts = xid;
        }
    }
}

/// A record whose checkpointed image has a fixed byte width, so a whole
/// [`crate::storage::chunk::ChunkedVec`] can be dumped to and reloaded
/// from a paged file slot-for-slot. The lock word and read timestamp
/// are never part of the encoding — no transaction survives a restart,
/// so they always decode back to their unlocked defaults.
pub trait FixedRecord: Sized {
    const ENCODED_LEN: usize;
    fn encode(&self, out: &mut [u8]);
    fn decode(data: &[u8]) -> Self;
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub header: MvccHeader,
    pub label: u32,
    pub from_rship_list: u64,
    pub to_rship_list: u64,
    pub property_list: u64,
}

impl NodeRecord {
    pub fn new(label: u32) -> Self {
        Self {
            header: MvccHeader::default(),
            label,
            from_rship_list: UNKNOWN,
            to_rship_list: UNKNOWN,
            property_list: UNKNOWN,
        }
    }
}

impl FixedRecord for NodeRecord {
    const ENCODED_LEN: usize = 8 + 8 + 4 + 8 + 8 + 8; // bts, cts, label, from, to, property_list

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.header.bts.to_le_bytes());
        out[8..16].copy_from_slice(&self.header.cts.to_le_bytes());
        out[16..20].copy_from_slice(&self.label.to_le_bytes());
        out[20..28].copy_from_slice(&self.from_rship_list.to_le_bytes());
        out[28..36].copy_from_slice(&self.to_rship_list.to_le_bytes());
        out[36..44].copy_from_slice(&self.property_list.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            header: MvccHeader {
                txn_id: 0,
                bts: u64::from_le_bytes(data[0..8].try_into().unwrap()),
                cts: u64::from_le_bytes(data[8..16].try_into().unwrap()),
                rts: 0,
            },
            label: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            from_rship_list: u64::from_le_bytes(data[20..28].try_into().unwrap()),
            to_rship_list: u64::from_le_bytes(data[28..36].try_into().unwrap()),
            property_list: u64::from_le_bytes(data[36..44].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipRecord {
    pub header: MvccHeader,
    pub label: u32,
    pub src_node: u64,
    pub dest_node: u64,
    pub next_src_rship: u64,
    pub next_dest_rship: u64,
    pub property_list: u64,
}

impl RelationshipRecord {
    pub fn new(label: u32, src: u64, dest: u64) -> Self {
        Self {
            header: MvccHeader::default(),
            label,
            src_node: src,
            dest_node: dest,
            next_src_rship: UNKNOWN,
            next_dest_rship: UNKNOWN,
            property_list: UNKNOWN,
        }
    }
}

impl FixedRecord for RelationshipRecord {
    const ENCODED_LEN: usize = 8 + 8 + 4 + 8 + 8 + 8 + 8 + 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.header.bts.to_le_bytes());
        out[8..16].copy_from_slice(&self.header.cts.to_le_bytes());
        out[16..20].copy_from_slice(&self.label.to_le_bytes());
        out[20..28].copy_from_slice(&self.src_node.to_le_bytes());
        out[28..36].copy_from_slice(&self.dest_node.to_le_bytes());
        out[36..44].copy_from_slice(&self.next_src_rship.to_le_bytes());
        out[44..52].copy_from_slice(&self.next_dest_rship.to_le_bytes());
        out[52..60].copy_from_slice(&self.property_list.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            header: MvccHeader {
                txn_id: 0,
                bts: u64::from_le_bytes(data[0..8].try_into().unwrap()),
                cts: u64::from_le_bytes(data[8..16].try_into().unwrap()),
                rts: 0,
            },
            label: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            src_node: u64::from_le_bytes(data[20..28].try_into().unwrap()),
            dest_node: u64::from_le_bytes(data[28..36].try_into().unwrap()),
            next_src_rship: u64::from_le_bytes(data[36..44].try_into().unwrap()),
            next_dest_rship: u64::from_le_bytes(data[44..52].try_into().unwrap()),
            property_list: u64::from_le_bytes(data[52..60].try_into().unwrap()),
        }
    }
}

/// Typecode occupying the top 3 bits of a `PropertyItem`'s flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTypeCode {
    Unused,
    Int32,
    Float64,
    DictCode,
    UInt64,
    DateTime,
}

/// A single inline key/value slot inside a [`PropertySet`]: an 8-byte
/// value union tagged by [`PropertyTypeCode`], plus the dictionary code
/// for the property's name.
#[derive(Debug, Clone, Copy)]
pub struct PropertyItem {
    pub key: u32,
    pub typecode: PropertyTypeCode,
    raw: [u8; 8],
}

impl PropertyItem {
    pub fn unused() -> Self {
        Self {
            key: 0,
            typecode: PropertyTypeCode::Unused,
            raw: [0; 8],
        }
    }

    pub fn is_unused(&self) -> bool {
        self.typecode == PropertyTypeCode::Unused
    }

    pub fn int32(key: u32, v: i32) -> Self {
        let mut raw = [0u8; 8];
        raw[0..4].copy_from_slice(&v.to_le_bytes());
        Self { key, typecode: PropertyTypeCode::Int32, raw }
    }

    pub fn float64(key: u32, v: f64) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&v.to_le_bytes());
        Self { key, typecode: PropertyTypeCode::Float64, raw }
    }

    pub fn dict_code(key: u32, v: u32) -> Self {
        let mut raw = [0u8; 8];
        raw[0..4].copy_from_slice(&v.to_le_bytes());
        Self { key, typecode: PropertyTypeCode::DictCode, raw }
    }

    pub fn uint64(key: u32, v: u64) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&v.to_le_bytes());
        Self { key, typecode: PropertyTypeCode::UInt64, raw }
    }

    pub fn datetime(key: u32, v: i64) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&v.to_le_bytes());
        Self { key, typecode: PropertyTypeCode::DateTime, raw }
    }

    pub fn as_int32(&self) -> Option<i32> {
        (self.typecode == PropertyTypeCode::Int32).then(|| i32::from_le_bytes(self.raw[0..4].try_into().unwrap()))
    }

    pub fn as_float64(&self) -> Option<f64> {
        (self.typecode == PropertyTypeCode::Float64).then(|| f64::from_le_bytes(self.raw))
    }

    pub fn as_dict_code(&self) -> Option<u32> {
        (self.typecode == PropertyTypeCode::DictCode).then(|| u32::from_le_bytes(self.raw[0..4].try_into().unwrap()))
    }

    pub fn as_uint64(&self) -> Option<u64> {
        (self.typecode == PropertyTypeCode::UInt64).then(|| u64::from_le_bytes(self.raw))
    }

    pub fn as_datetime_raw(&self) -> Option<i64> {
        (self.typecode == PropertyTypeCode::DateTime).then(|| i64::from_le_bytes(self.raw))
    }
}

pub const PROPERTY_ITEMS_PER_SET: usize = 3;

/// One node in a property chain: up to three inline items plus `next`,
/// the logical offset of the next set in the chain (`UNKNOWN` if this
/// is the tail), and `owner`, the node or relationship id this chain
/// belongs to.
#[derive(Debug, Clone)]
pub struct PropertySet {
    pub owner: u64,
    pub items: [PropertyItem; PROPERTY_ITEMS_PER_SET],
    pub next: u64,
}

impl PropertySet {
    pub fn empty(owner: u64, next: u64) -> Self {
        Self {
            owner,
            items: [PropertyItem::unused(); PROPERTY_ITEMS_PER_SET],
            next,
        }
    }
}

const PROPERTY_ITEM_LEN: usize = 4 + 1 + 8; // key, typecode, raw

fn encode_item(item: &PropertyItem, out: &mut [u8]) {
    out[0..4].copy_from_slice(&item.key.to_le_bytes());
    out[4] = item.typecode as u8;
    out[5..13].copy_from_slice(&item.raw);
}

fn decode_item(data: &[u8]) -> PropertyItem {
    let typecode = match data[4] {
        1 => PropertyTypeCode::Int32,
        2 => PropertyTypeCode::Float64,
        3 => PropertyTypeCode::DictCode,
        4 => PropertyTypeCode::UInt64,
        5 => PropertyTypeCode::DateTime,
        _ => PropertyTypeCode::Unused,
    };
    PropertyItem {
        key: u32::from_le_bytes(data[0..4].try_into().unwrap()),
        typecode,
        raw: data[5..13].try_into().unwrap(),
    }
}

impl FixedRecord for PropertySet {
    const ENCODED_LEN: usize = 8 + 8 + PROPERTY_ITEM_LEN * PROPERTY_ITEMS_PER_SET;

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.owner.to_le_bytes());
        out[8..16].copy_from_slice(&self.next.to_le_bytes());
        for (i, item) in self.items.iter().enumerate() {
            let start = 16 + i * PROPERTY_ITEM_LEN;
            encode_item(item, &mut out[start..start + PROPERTY_ITEM_LEN]);
        }
    }

    fn decode(data: &[u8]) -> Self {
        let owner = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let next = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let mut items = [PropertyItem::unused(); PROPERTY_ITEMS_PER_SET];
        for (i, slot) in items.iter_mut().enumerate() {
            let start = 16 + i * PROPERTY_ITEM_LEN;
            *slot = decode_item(&data[start..start + PROPERTY_ITEM_LEN]);
        }
        Self { owner, items, next }
    }
}

use crate::db::Database;
use crate::error::Result;
use crate::pager::buffer_pool::{DICT_FILE, NODE_FILE, NODE_PROPS_FILE, RSHIP_FILE, RSHIP_PROPS_FILE};

/// Page-level counters for one registered file.
#[derive(Debug, Clone, Copy)]
pub struct PagerStatsSection {
    pub dict_pages: u32,
    pub node_pages: u32,
    pub rship_pages: u32,
    pub node_props_pages: u32,
    pub rship_props_pages: u32,
    pub resident_frames: usize,
    pub hit_ratio: f64,
}

/// In-memory record counts, independent of how many pages they occupy
/// on disk.
#[derive(Debug, Clone, Copy)]
pub struct StorageStatsSection {
    pub node_count: usize,
    pub relationship_count: usize,
    pub node_chunks: usize,
    pub rship_chunks: usize,
    pub dictionary_entries: usize,
    pub index_count: usize,
}

/// Write-ahead log position and checkpoint freshness.
#[derive(Debug, Clone, Copy)]
pub struct WalStatsSection {
    pub last_lsn: u64,
    pub dirty_since_checkpoint: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsReport {
    pub pager: PagerStatsSection,
    pub storage: StorageStatsSection,
    pub wal: WalStatsSection,
}

/// Gathers pager, storage, and WAL statistics without mutating
/// anything. Safe to call on a live database.
pub fn stats(db: &Database) -> Result<StatsReport> {
    let pool = db.pool();
    let pager = PagerStatsSection {
        dict_pages: pool.with_file(DICT_FILE, |f| Ok(f.page_count()))?,
        node_pages: pool.with_file(NODE_FILE, |f| Ok(f.page_count()))?,
        rship_pages: pool.with_file(RSHIP_FILE, |f| Ok(f.page_count()))?,
        node_props_pages: pool.with_file(NODE_PROPS_FILE, |f| Ok(f.page_count()))?,
        rship_props_pages: pool.with_file(RSHIP_PROPS_FILE, |f| Ok(f.page_count()))?,
        resident_frames: pool.resident_frames(),
        hit_ratio: pool.hit_ratio(),
    };

    let store = db.store();
    let storage = StorageStatsSection {
        node_count: store.nodes.iter().filter(|(_, r)| r.header.is_valid()).count(),
        relationship_count: store.rships.iter().filter(|(_, r)| r.header.is_valid()).count(),
        node_chunks: store.nodes.num_chunks(),
        rship_chunks: store.rships.num_chunks(),
        dictionary_entries: store.dict.size(),
        index_count: db.indexes().count(),
    };

    let wal = WalStatsSection {
        last_lsn: db.wal().last_lsn(),
        dirty_since_checkpoint: db.dirty_since_checkpoint(),
    };

    Ok(StatsReport { pager, storage, wal })
}

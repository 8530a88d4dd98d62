use crate::db::Database;
use crate::error::Result;
use crate::storage::record::INF;

/// Counts of slots reclaimed by a [`vacuum_now`] pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct VacuumReport {
    pub nodes_reclaimed: usize,
    pub relationships_reclaimed: usize,
}

/// Reclaims committed slots left behind by a transaction that reserved
/// a node or relationship and then rolled back before `finalize_commit`
/// ever ran: their header is stuck at `bts == INF`, permanently invalid
/// for every reader, and [`crate::graph::GraphStore::rollback`] only
/// ever drops the dirty-chain entry, not the slot itself.
///
/// Slots that were tombstoned by a committed delete are already erased
/// at commit time (see `finalize_commit`), so this pass only ever finds
/// abandoned reservations, never live tombstones.
pub fn vacuum_now(db: &mut Database) -> Result<VacuumReport> {
    let store = db.store_mut();

    let dead_nodes: Vec<u64> = store.nodes.iter().filter(|(_, r)| r.header.bts == INF).map(|(o, _)| o).collect();
    for offset in &dead_nodes {
        let property_list = store.nodes.at(*offset).map(|r| r.property_list).unwrap_or(crate::storage::UNKNOWN);
        store.node_props.remove_properties(property_list);
        store.nodes.erase(*offset);
    }

    let dead_rships: Vec<u64> = store.rships.iter().filter(|(_, r)| r.header.bts == INF).map(|(o, _)| o).collect();
    for offset in &dead_rships {
        let property_list = store.rships.at(*offset).map(|r| r.property_list).unwrap_or(crate::storage::UNKNOWN);
        store.rship_props.remove_properties(property_list);
        store.rships.erase(*offset);
    }

    Ok(VacuumReport { nodes_reclaimed: dead_nodes.len(), relationships_reclaimed: dead_rships.len() })
}

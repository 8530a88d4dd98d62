//! Bounded breadth-first traversal over committed, visible relationships.
//!
//! A traversal never inspects the dirty chain: it walks the same
//! `next_src_rship`/`next_dest_rship` chains [`super::GraphStore`] builds
//! at insert time, skipping any relationship whose header isn't valid
//! for the calling transaction's snapshot.

use std::collections::{HashSet, VecDeque};

use crate::graph::GraphStore;
use crate::storage::record::UNKNOWN;
use crate::txn::XId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// One step discovered during a traversal: the relationship taken and
/// the node it leads to.
#[derive(Debug, Clone, Copy)]
pub struct Hop {
    pub relationship: u64,
    pub node: u64,
    pub depth: u32,
}

impl GraphStore {
    fn neighbors(&self, node: u64, direction: Direction, label: Option<u32>, xid: XId) -> Vec<(u64, u64)> {
        let Some(rec) = self.nodes.at(node) else { return Vec::new() };
        let mut out = Vec::new();
        let heads: &[(u64, bool)] = match direction {
            Direction::Outgoing => &[(rec.from_rship_list, true)],
            Direction::Incoming => &[(rec.to_rship_list, false)],
            Direction::Both => &[(rec.from_rship_list, true), (rec.to_rship_list, false)],
        };
        for &(mut cursor, outgoing) in heads {
            while cursor != UNKNOWN {
                let Some(r) = self.rships.at(cursor) else { break };
                let wants_next = if r.src_node == node { r.next_src_rship } else { r.next_dest_rship };
                if r.header.is_valid_for(xid) && label.map_or(true, |l| l == r.label) {
                    let other = if outgoing { r.dest_node } else { r.src_node };
                    out.push((cursor, other));
                }
                cursor = wants_next;
            }
        }
        out
    }

    /// Breadth-first expansion from `start` up to `max_hops`, optionally
    /// restricted to a single relationship label. Each node is visited
    /// at most once, at the depth it was first reached.
    pub fn traverse(
        &self,
        start: u64,
        direction: Direction,
        label: Option<&str>,
        max_hops: u32,
        xid: XId,
    ) -> crate::error::Result<Vec<Hop>> {
        let label_code = match label {
            Some(l) => {
                let code = self.dict.lookup_string(l)?;
                if code == 0 {
                    return Ok(Vec::new());
                }
                Some(code)
            }
            None => None,
        };

        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier = VecDeque::new();
        frontier.push_back((start, 0u32));
        let mut out = Vec::new();

        while let Some((node, depth)) = frontier.pop_front() {
            if depth == max_hops {
                continue;
            }
            for (rship, neighbor) in self.neighbors(node, direction, label_code, xid) {
                if visited.insert(neighbor) {
                    out.push(Hop { relationship: rship, node: neighbor, depth: depth + 1 });
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyMap;

    fn chain(len: usize) -> (GraphStore, Vec<u64>) {
        let mut g = GraphStore::new(8);
        let mut ids = Vec::new();
        for _ in 0..len {
            ids.push(g.add_node(1, "Station", &PropertyMap::new(), false).unwrap());
        }
        g.finalize_commit(1, &ids, &[]).unwrap();
        let mut rships = Vec::new();
        for w in ids.windows(2) {
            rships.push(g.add_relationship(2, "NEXT", w[0], w[1], &PropertyMap::new(), false).unwrap());
        }
        g.finalize_commit(2, &[], &rships).unwrap();
        (g, ids)
    }

    #[test]
    fn traversal_respects_hop_bound() {
        let (g, ids) = chain(5);
        let hops = g.traverse(ids[0], Direction::Outgoing, None, 2, 3).unwrap();
        let reached: HashSet<u64> = hops.iter().map(|h| h.node).collect();
        assert!(reached.contains(&ids[1]));
        assert!(reached.contains(&ids[2]));
        assert!(!reached.contains(&ids[3]));
    }

    #[test]
    fn traversal_filters_by_label() {
        let (mut g, ids) = chain(3);
        let r = g.add_relationship(3, "SHORTCUT", ids[0], ids[2], &PropertyMap::new(), false).unwrap();
        g.finalize_commit(3, &[], &[r]).unwrap();
        let hops = g.traverse(ids[0], Direction::Outgoing, Some("SHORTCUT"), 5, 4).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].node, ids[2]);
    }

    #[test]
    fn uncommitted_relationship_is_not_traversed() {
        let (mut g, ids) = chain(2);
        let r = g.add_relationship(9, "NEXT", ids[1], ids[0], &PropertyMap::new(), false).unwrap();
        let hops = g.traverse(ids[1], Direction::Outgoing, None, 1, 10).unwrap();
        assert!(hops.is_empty());
        let _ = r;
    }
}

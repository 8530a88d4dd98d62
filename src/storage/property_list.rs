//! Chain of [`PropertySet`] records implementing a node's or
//! relationship's property map.
//!
//! Each set holds up to [`PROPERTY_ITEMS_PER_SET`] inline items and a
//! `next` pointer; a property map with more keys than fit in one set
//! spills into additional sets threaded through `next`. Keys are
//! dictionary codes, resolved against the shared [`Dictionary`].

use crate::error::{GraphError, Result};
use crate::pager::PagedFile;
use crate::storage::chunk::{ChunkedVec, LogicalOffset};
use crate::storage::dictionary::Dictionary;
use crate::storage::record::{PropertyItem, PropertySet, PROPERTY_ITEMS_PER_SET, UNKNOWN};

/// A single decoded key/value pair, with the key already resolved to a
/// string via the dictionary.
#[derive(Debug, Clone)]
pub struct NamedItem {
    pub key: String,
    pub item: PropertyItem,
}

pub struct PropertyList {
    sets: ChunkedVec<PropertySet>,
}

impl PropertyList {
    pub fn new(records_per_chunk: usize) -> Self {
        Self {
            sets: ChunkedVec::new(records_per_chunk),
        }
    }

    /// Writes `items` as a fresh chain for `owner`, returning the head
    /// offset (or `UNKNOWN` if `items` is empty).
    pub fn append_properties(&mut self, owner: u64, items: &[PropertyItem]) -> LogicalOffset {
        let mut next = UNKNOWN;
        for chunk in items.chunks(PROPERTY_ITEMS_PER_SET).rev() {
            let mut set = PropertySet::empty(owner, next);
            for (slot, item) in set.items.iter_mut().zip(chunk) {
                *slot = *item;
            }
            next = self.sets.store(set);
        }
        next
    }

    /// Appends one more set of items to the head of an existing chain,
    /// splicing the new head in front (used when an update grows past
    /// the originally allocated sets).
    pub fn add_pitems(&mut self, owner: u64, head: LogicalOffset, items: &[PropertyItem]) -> LogicalOffset {
        let mut next = head;
        for chunk in items.chunks(PROPERTY_ITEMS_PER_SET).rev() {
            let mut set = PropertySet::empty(owner, next);
            for (slot, item) in set.items.iter_mut().zip(chunk) {
                *slot = *item;
            }
            next = self.sets.store(set);
        }
        next
    }

    /// Replaces the entire chain at `head` with `items`, reusing
    /// existing sets where possible and erasing any that are no longer
    /// needed, then allocating new sets for any items left over.
    pub fn update_pitems(&mut self, owner: u64, head: LogicalOffset, items: &[PropertyItem]) -> Result<LogicalOffset> {
        let mut existing = Vec::new();
        let mut cursor = head;
        while cursor != UNKNOWN {
            existing.push(cursor);
            cursor = self
                .sets
                .at(cursor)
                .ok_or_else(|| GraphError::Corruption(format!("broken property chain at {cursor}")))?
                .next;
        }

        let mut chunks: Vec<&[PropertyItem]> = items.chunks(PROPERTY_ITEMS_PER_SET).collect();
        chunks.reverse();
        let mut existing_rev = existing.clone();
        existing_rev.reverse();

        let mut next = UNKNOWN;
        let mut reused = 0;
        for chunk in &chunks {
            let offset = if reused < existing_rev.len() {
                let off = existing_rev[reused];
                reused += 1;
                let mut items_arr = [PropertyItem::unused(); PROPERTY_ITEMS_PER_SET];
                for (slot, item) in items_arr.iter_mut().zip(*chunk) {
                    *slot = *item;
                }
                self.sets.store_at(off, PropertySet { owner, items: items_arr, next });
                off
            } else {
                let mut items_arr = [PropertyItem::unused(); PROPERTY_ITEMS_PER_SET];
                for (slot, item) in items_arr.iter_mut().zip(*chunk) {
                    *slot = *item;
                }
                self.sets.store(PropertySet { owner, items: items_arr, next })
            };
            next = offset;
        }

        for leftover in &existing_rev[reused..] {
            self.sets.erase(*leftover);
        }

        Ok(next)
    }

    /// Drops every set in the chain starting at `head`.
    pub fn remove_properties(&mut self, head: LogicalOffset) {
        let mut cursor = head;
        while cursor != UNKNOWN {
            let next = self.sets.at(cursor).map(|s| s.next).unwrap_or(UNKNOWN);
            self.sets.erase(cursor);
            cursor = next;
        }
    }

    /// Looks up a single property by dictionary key code, walking the
    /// chain and returning the first matching item.
    pub fn property_value(&self, head: LogicalOffset, key: u32) -> Option<PropertyItem> {
        let mut cursor = head;
        while cursor != UNKNOWN {
            let set = self.sets.at(cursor)?;
            if let Some(item) = set.items.iter().find(|it| !it.is_unused() && it.key == key) {
                return Some(*item);
            }
            cursor = set.next;
        }
        None
    }

    /// Materializes every item in the chain, resolving each key through
    /// `dict`.
    pub fn all_properties(&self, head: LogicalOffset, dict: &Dictionary) -> Result<Vec<NamedItem>> {
        let mut out = Vec::new();
        let mut cursor = head;
        while cursor != UNKNOWN {
            let set = self
                .sets
                .at(cursor)
                .ok_or_else(|| GraphError::Corruption(format!("broken property chain at {cursor}")))?;
            for item in set.items.iter().filter(|it| !it.is_unused()) {
                let key = dict
                    .lookup_code(item.key)?
                    .ok_or_else(|| GraphError::Corruption(format!("dangling property key code {}", item.key)))?;
                out.push(NamedItem { key, item: *item });
            }
            cursor = set.next;
        }
        Ok(out)
    }

    /// Checkpoints every property set to `file`, the snapshot recovery
    /// loads before replaying WAL records after the last checkpoint.
    pub fn flush_to_file(&self, file: &mut PagedFile) -> Result<()> {
        self.sets.flush_to_file(file)
    }

    pub fn load_from_file(file: &mut PagedFile, records_per_chunk: usize) -> Result<Self> {
        Ok(Self {
            sets: ChunkedVec::load_from_file(file, records_per_chunk)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back_across_sets() {
        let mut list = PropertyList::new(8);
        let items: Vec<PropertyItem> = (0..7).map(|i| PropertyItem::int32(i, i as i32 * 10)).collect();
        let head = list.append_properties(1, &items);
        assert_eq!(list.property_value(head, 3).unwrap().as_int32(), Some(30));
        assert_eq!(list.property_value(head, 6).unwrap().as_int32(), Some(60));
        assert!(list.property_value(head, 99).is_none());
    }

    #[test]
    fn update_shrinks_and_frees_sets() {
        let mut list = PropertyList::new(8);
        let items: Vec<PropertyItem> = (0..5).map(|i| PropertyItem::int32(i, i as i32)).collect();
        let head = list.append_properties(1, &items);
        let shrunk = list.update_pitems(1, head, &items[0..2]).unwrap();
        assert_eq!(list.property_value(shrunk, 0).unwrap().as_int32(), Some(0));
        assert!(list.property_value(shrunk, 4).is_none());
    }
}

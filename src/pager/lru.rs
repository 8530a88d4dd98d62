//! Intrusive doubly-linked LRU list, one node per resident page.
//!
//! Mirrors the classic sentinel-node design (a `head`/`tail` pair with
//! the true list spliced between them): `head.next` is the least
//! recently used entry, `tail.prev` is the most recently used. All
//! operations below are O(1). Rust doesn't let us hold raw `node*`
//! handles safely, so the list is backed by an arena (`Vec<Slot>`)
//! addressed by a small `Handle` index instead of a pointer.

use rustc_hash::FxHashMap;

use crate::pager::PageId;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

struct Slot {
    page_id: PageId,
    prev: usize,
    next: usize,
    live: bool,
}

/// Doubly-linked list ordered from least- to most-recently-used, plus a
/// page-id -> handle index so callers can splice an arbitrary entry to
/// the MRU end in O(1) on a cache hit.
pub struct LruList {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
    free: Vec<usize>,
    index: FxHashMap<PageId, Handle>,
    len: usize,
}

impl LruList {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(2);
        slots.push(Slot {
            page_id: 0,
            prev: NIL,
            next: 1,
            live: false,
        });
        slots.push(Slot {
            page_id: 0,
            prev: 0,
            next: NIL,
            live: false,
        });
        Self {
            slots,
            head: 0,
            tail: 1,
            free: Vec::new(),
            index: FxHashMap::default(),
            len: 0,
        }
    }

    fn alloc(&mut self, page_id: PageId) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Slot {
                page_id,
                prev: NIL,
                next: NIL,
                live: true,
            };
            idx
        } else {
            self.slots.push(Slot {
                page_id,
                prev: NIL,
                next: NIL,
                live: true,
            });
            self.slots.len() - 1
        }
    }

    fn link_before_tail(&mut self, idx: usize) {
        let prev = self.slots[self.tail].prev;
        self.slots[idx].prev = prev;
        self.slots[idx].next = self.tail;
        self.slots[prev].next = idx;
        self.slots[self.tail].prev = idx;
    }

    fn link_after_head(&mut self, idx: usize) {
        let next = self.slots[self.head].next;
        self.slots[idx].prev = self.head;
        self.slots[idx].next = next;
        self.slots[next].prev = idx;
        self.slots[self.head].next = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    /// Inserts as the most recently used entry (freshly pinned pages).
    pub fn add_to_mru(&mut self, page_id: PageId) -> Handle {
        let idx = self.alloc(page_id);
        self.link_before_tail(idx);
        self.index.insert(page_id, Handle(idx));
        self.len += 1;
        Handle(idx)
    }

    /// Inserts as the least recently used entry (bulk-loaded / scan pages
    /// that shouldn't crowd out hot pages).
    pub fn add_to_lru(&mut self, page_id: PageId) -> Handle {
        let idx = self.alloc(page_id);
        self.link_after_head(idx);
        self.index.insert(page_id, Handle(idx));
        self.len += 1;
        Handle(idx)
    }

    /// Splices an existing entry to the MRU end; used on a buffer pool hit.
    pub fn move_to_mru(&mut self, handle: Handle) {
        self.unlink(handle.0);
        self.link_before_tail(handle.0);
    }

    /// Page id currently at the LRU end, if any.
    pub fn lru_page(&self) -> Option<PageId> {
        let idx = self.slots[self.head].next;
        (idx != self.tail).then(|| self.slots[idx].page_id)
    }

    /// Removes and returns the LRU end, freeing its slot for reuse.
    pub fn remove_lru(&mut self) -> Option<PageId> {
        let idx = self.slots[self.head].next;
        if idx == self.tail {
            return None;
        }
        let page_id = self.slots[idx].page_id;
        self.unlink(idx);
        self.slots[idx].live = false;
        self.free.push(idx);
        self.index.remove(&page_id);
        self.len -= 1;
        Some(page_id)
    }

    pub fn remove(&mut self, handle: Handle) {
        if !self.slots[handle.0].live {
            return;
        }
        let page_id = self.slots[handle.0].page_id;
        self.unlink(handle.0);
        self.slots[handle.0].live = false;
        self.free.push(handle.0);
        self.index.remove(&page_id);
        self.len -= 1;
    }

    pub fn handle_for(&self, page_id: PageId) -> Option<Handle> {
        self.index.get(&page_id).copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        let mut cur = self.slots[self.head].next;
        std::iter::from_fn(move || {
            if cur == self.tail {
                None
            } else {
                let pid = self.slots[cur].page_id;
                cur = self.slots[cur].next;
                Some(pid)
            }
        })
    }
}

impl Default for LruList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mru_order_after_hits() {
        let mut l = LruList::new();
        let h1 = l.add_to_mru(1);
        l.add_to_mru(2);
        l.add_to_mru(3);
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        l.move_to_mru(h1);
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(l.remove_lru(), Some(2));
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn add_to_lru_end_is_evicted_first() {
        let mut l = LruList::new();
        l.add_to_mru(1);
        l.add_to_lru(2);
        assert_eq!(l.lru_page(), Some(2));
    }

    #[test]
    fn remove_arbitrary_entry() {
        let mut l = LruList::new();
        l.add_to_mru(1);
        let h2 = l.add_to_mru(2);
        l.add_to_mru(3);
        l.remove(h2);
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(l.handle_for(2), None);
    }
}

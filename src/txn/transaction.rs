//! The handle bound to the calling thread for the lifetime of a
//! transaction, tracking which nodes/relationships it has dirtied so
//! commit and abort know what to finalize or roll back.

use std::cell::RefCell;

use crate::txn::XId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug)]
pub struct Transaction {
    xid: XId,
    state: TxState,
    dirty_nodes: Vec<u64>,
    dirty_rships: Vec<u64>,
}

impl Transaction {
    pub fn new(xid: XId) -> Self {
        Self {
            xid,
            state: TxState::Active,
            dirty_nodes: Vec::new(),
            dirty_rships: Vec::new(),
        }
    }

    pub fn xid(&self) -> XId {
        self.xid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn set_state(&mut self, state: TxState) {
        self.state = state;
    }

    pub fn add_dirty_node(&mut self, id: u64) {
        self.dirty_nodes.push(id);
    }

    pub fn add_dirty_relationship(&mut self, id: u64) {
        self.dirty_rships.push(id);
    }

    pub fn dirty_nodes(&self) -> &[u64] {
        &self.dirty_nodes
    }

    pub fn dirty_relationships(&self) -> &[u64] {
        &self.dirty_rships
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

/// Binds `tx` as the active transaction for the calling thread. Panics
/// (via `InvalidNested`, raised by the caller before this is invoked) is
/// avoided by requiring callers to check [`has_active`] first.
pub fn bind(tx: Transaction) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(tx));
}

pub fn has_active() -> bool {
    CURRENT.with(|cell| cell.borrow().is_some())
}

/// Runs `f` with mutable access to the thread's active transaction, if any.
pub fn with_current<R>(f: impl FnOnce(&mut Transaction) -> R) -> Option<R> {
    CURRENT.with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Removes and returns the thread's active transaction, ending its scope.
pub fn take() -> Option<Transaction> {
    CURRENT.with(|cell| cell.borrow_mut().take())
}

//! Transaction identity, the thread-bound active transaction handle,
//! and the transaction manager coordinating begin/commit/abort/vacuum.

pub mod manager;
pub mod transaction;

pub use manager::TransactionManager;
pub use transaction::{Transaction, TxState};

/// Transaction id, doubling as the begin timestamp (MVTO — the
/// timestamp order *is* the commit order).
pub type XId = u64;

pub const INF: u64 = u64::MAX;

//! # Poseidon - Embedded Property Graph Database
//!
//! Poseidon is an embedded property graph database with MVCC snapshot
//! isolation, WAL-based durability, and B-tree secondary indexes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use poseidon::db::Database;
//! use poseidon::model::PropertyMap;
//!
//! # fn main() -> poseidon::error::Result<()> {
//! let mut db = Database::open("my_graph")?;
//!
//! db.run_transaction(|tx| {
//!     let alice = tx.add_node("Person", &PropertyMap::new())?;
//!     let bob = tx.add_node("Person", &PropertyMap::new())?;
//!     tx.add_relationship("KNOWS", alice, bob, &PropertyMap::new())?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **ACID transactions** with no-wait MVCC snapshot isolation
//! - **WAL-based durability** and crash recovery (redo winners, undo losers)
//! - **B-tree secondary indexes** over node properties
//! - **Bounded graph traversal** and label-scoped scans
//! - **Configurable sync modes** trading durability for throughput
//!
//! ## Architecture
//!
//! - [`pager`] — paged files, the buffer pool, and the write-ahead log
//! - [`storage`] — chunked record vectors, the string dictionary, and MVCC headers
//! - [`graph`] — node/relationship CRUD and traversal over the MVCC store
//! - [`index`] — B-tree secondary indexes
//! - [`txn`] — transaction id allocation and the active-transaction handle
//! - [`recovery`] — WAL replay on open
//! - [`admin`] — statistics, Graphviz export, integrity verification, vacuum
//! - [`db`] — the [`db::Database`]/[`db::DbTransaction`] facade tying the above together

pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod index;
pub mod logging;
pub mod model;
pub mod pager;
pub mod recovery;
pub mod storage;
pub mod txn;

pub use crate::config::{Config, SyncMode};
pub use crate::db::{Database, DbTransaction};
pub use crate::error::{GraphError, Result};
pub use crate::model::{NodeDescription, PropertyMap, PropertyValue, RelationshipDescription};
pub use crate::txn::{TxState, XId};

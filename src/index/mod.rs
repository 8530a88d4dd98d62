//! Secondary indexes over (label, property) pairs, with two backends
//! dispatched by tag rather than through a vtable: small or scratch
//! indexes stay in memory, persistent graphs use the paged backend.

pub mod btree;

pub use btree::{IndexBackend, IndexKey, SecondaryIndex};

//! Storage layer for the durable tkn lattice.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for graph nodes, edges, and trie records
//! - Zero-padded numeric keys so id order matches byte order
//! - Atomic multi-record writes via [`Batch`]
//! - Id sequences recovered from the highest stored key at open
//! - An in-memory environment for `:memory:` locations

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Batch, Storage, StorageStats};
pub use error::StorageError;
pub use keys::{decode_u64, encode_u64, ChildKey, EdgeKey, NodeKey, TokenKey, TrieKey};

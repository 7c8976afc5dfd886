//! Column family definitions for RocksDB.
//!
//! Each column family isolates one record type of the lattice:
//! - graph_nodes: pattern nodes with their hub score, keyed by id
//! - graph_tokens: token -> node id index
//! - graph_edges: transition weights, keyed by (from, to)
//! - trie_nodes: trie records, keyed by id
//! - trie_children: (parent, symbol) -> child id index

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for graph nodes
pub const CF_GRAPH_NODES: &str = "graph_nodes";

/// Column family name for the token -> node id index
pub const CF_GRAPH_TOKENS: &str = "graph_tokens";

/// Column family name for weighted edges
pub const CF_GRAPH_EDGES: &str = "graph_edges";

/// Column family name for trie nodes
pub const CF_TRIE_NODES: &str = "trie_nodes";

/// Column family name for trie child links
pub const CF_TRIE_CHILDREN: &str = "trie_children";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_GRAPH_NODES,
    CF_GRAPH_TOKENS,
    CF_GRAPH_EDGES,
    CF_TRIE_NODES,
    CF_TRIE_CHILDREN,
];

/// Create column family options for JSON records (compressed)
fn record_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_GRAPH_NODES, record_options()),
        ColumnFamilyDescriptor::new(CF_GRAPH_TOKENS, Options::default()),
        ColumnFamilyDescriptor::new(CF_GRAPH_EDGES, Options::default()),
        ColumnFamilyDescriptor::new(CF_TRIE_NODES, record_options()),
        ColumnFamilyDescriptor::new(CF_TRIE_CHILDREN, Options::default()),
    ]
}

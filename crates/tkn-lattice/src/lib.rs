//! # tkn-lattice
//!
//! Index of discovered patterns: a character trie for prefix completion
//! and a weighted transition graph for "what follows" queries, kept in
//! step so that every pattern has the same id in both.
//!
//! ## Components
//! - [`trie`]: the [`Trie`] interface and the in-memory [`MemoryTrie`]
//! - [`graph`]: the [`Graph`] interface and the in-memory [`MemoryGraph`]
//! - [`scorer`]: hub scoring ([`DegreeScorer`], [`PageRankScorer`])
//! - [`rocks_graph`] / [`rocks_trie`]: RocksDB-backed variants
//! - [`lattice`]: the [`Lattice`] facade that pipes segment streams in
//!
//! ## Usage
//!
//! ```rust
//! use tkn_lattice::{DegreeScorer, Lattice};
//!
//! let mut lattice = Lattice::in_memory(Box::new(DegreeScorer));
//! lattice
//!     .merge(&[("the".to_string(), "tok".to_string())])
//!     .unwrap();
//! assert_eq!(lattice.get_next("the").unwrap()[0].weight, 1);
//! assert_eq!(lattice.next_characters("t").unwrap(), vec!['h', 'o']);
//! ```

pub mod context;
pub mod error;
pub mod graph;
pub mod lattice;
pub mod rocks_graph;
pub mod rocks_trie;
pub mod scorer;
pub mod trie;

pub use context::{GraphContext, GraphNode};
pub use error::LatticeError;
pub use graph::{EdgeIds, Graph, MemoryGraph};
pub use lattice::{
    open_lattice, DurableLattice, DynLattice, Lattice, LatticeStats, MemoryLattice, PipeSummary,
    DEFAULT_BATCH_SIZE,
};
pub use rocks_graph::RocksGraph;
pub use rocks_trie::RocksTrie;
pub use scorer::{DegreeScorer, HubScorer, PageRankScorer};
pub use trie::{MemoryTrie, Trie, TrieEntry};

//! Error types for lattice operations.

use thiserror::Error;

use tkn_storage::StorageError;
use tkn_types::TknError;

/// Errors that can occur in the trie, graph, or lattice.
#[derive(Debug, Error)]
pub enum LatticeError {
    /// Durable backend failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration or input rejected by the shared types
    #[error(transparent)]
    Types(#[from] TknError),

    /// Record encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Index contradicts itself (a node that must exist is missing)
    #[error("Lattice invariant violated: {0}")]
    Invariant(String),

    /// Caller passed an argument the lattice cannot index
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for LatticeError {
    fn from(err: serde_json::Error) -> Self {
        LatticeError::Serialization(err.to_string())
    }
}

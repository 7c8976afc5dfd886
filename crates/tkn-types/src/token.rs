//! Query results read back from a lattice.

use serde::{Deserialize, Serialize};

/// A discovered pattern with its hub score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedToken {
    /// The pattern key
    pub pattern: String,
    /// Hub score computed by the configured scorer
    pub confidence: f64,
}

/// One outgoing transition of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Destination pattern key
    pub to: String,
    /// Number of times the transition was observed
    pub weight: u64,
}

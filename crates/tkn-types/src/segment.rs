//! Symbols, keys and segments.
//!
//! A symbol is one normalized character or one sentinel such as `<0>`.
//! Sentinel-ness is a producer convention; the core treats every symbol
//! as an opaque string.

use serde::{Deserialize, Serialize};

/// One literal character or one sentinel marker.
pub type Symbol = String;

/// Concatenation of the symbols of a candidate or a finished pattern.
pub type Key = String;

/// Build the sentinel symbol for a numbered boundary, e.g. `<3>`.
pub fn sentinel(n: usize) -> Symbol {
    format!("<{}>", n)
}

/// A finished pattern emitted by a sequencer.
///
/// `key` is always the concatenation of `sequence`, and is never empty
/// once the segment has been placed on a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// The raw symbols absorbed into this pattern, in input order
    pub sequence: Vec<Symbol>,
    /// The pattern key
    pub key: Key,
}

impl Segment {
    /// Create a segment from its symbols, deriving the key.
    pub fn new(sequence: Vec<Symbol>) -> Self {
        let key = sequence.concat();
        Self { sequence, key }
    }

    /// Create a segment from symbols and an already-built key.
    pub fn with_key(sequence: Vec<Symbol>, key: Key) -> Self {
        Self { sequence, key }
    }

    /// Number of symbols in the pattern.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// True when the segment holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

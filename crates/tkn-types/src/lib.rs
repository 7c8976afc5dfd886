//! # tkn-types
//!
//! Shared domain types for the tkn token-discovery engine.
//!
//! This crate defines the data that flows between the other crates:
//! - Symbols and keys: the atomic inputs fed to a sequencer
//! - Segments: finished patterns emitted by a sequencer
//! - Ranked tokens and transitions: query results read back from a lattice
//! - Settings: layered configuration for a discovery session
//!
//! ## Usage
//!
//! ```rust
//! use tkn_types::Segment;
//!
//! let segment = Segment::new(vec!["t".into(), "h".into(), "e".into()]);
//! assert_eq!(segment.key, "the");
//! ```

pub mod config;
pub mod error;
pub mod segment;
pub mod token;

pub use config::{
    BackendKind, CacheStrategy, HistoryStrategy, ScorerStrategy, Settings, DEFAULT_ALPHA,
    DEFAULT_ITERATIONS, MEMORY_LOCATION,
};
pub use error::TknError;
pub use segment::{sentinel, Key, Segment, Symbol};
pub use token::{RankedToken, Transition};

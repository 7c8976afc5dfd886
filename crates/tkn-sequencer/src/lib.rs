//! # tkn-sequencer
//!
//! Online segmentation of a symbol stream into recurring patterns.
//!
//! A [`Sequencer`] consumes one symbol at a time and asks its [`Gate`]s
//! whether the growing candidate should keep extending. The first gate
//! to refuse marks a pattern boundary: the accumulated candidate is
//! emitted as a [`Segment`](tkn_types::Segment) onto a [`Queue`], which
//! consumers drain through an async stream.
//!
//! ## Components
//! - [`dictionary`]: novelty caches (unbounded set, bounded FIFO)
//! - [`gate`]: the gate interface and the LZ novelty gate
//! - [`history`]: optional replay history for the queue
//! - [`queue`]: order-preserving output channel with pull-based reads
//! - [`sequencer`]: the segmentation state machine
//! - [`reader`]: NFC-normalized symbol extraction from text and files
//!
//! ## Usage
//!
//! ```rust
//! use tkn_sequencer::{create_lz_sequencer, SequencerOptions};
//!
//! let mut sequencer = create_lz_sequencer(&SequencerOptions::default()).unwrap();
//! for symbol in ["a", "b", "a", "b"] {
//!     sequencer.push(symbol);
//! }
//! sequencer.flush();
//! assert_eq!(sequencer.queue().len(), 3);
//! ```

pub mod dictionary;
pub mod gate;
pub mod history;
pub mod lz;
pub mod queue;
pub mod reader;
pub mod sequencer;

pub use dictionary::{Bounded, Dictionary, Unbounded};
pub use gate::{Gate, GateSnapshot, LzGate};
pub use history::{BoundedHistory, QueueHistory, UnboundedHistory};
pub use lz::{create_lz_sequencer, SequencerOptions};
pub use queue::Queue;
pub use sequencer::{Sequencer, SequencerSnapshot};

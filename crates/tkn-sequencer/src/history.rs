//! Replay history for the output queue.
//!
//! History is observational only: it records segments as they are handed
//! to readers and never influences delivery.

use std::collections::VecDeque;

use tkn_types::{HistoryStrategy, Segment, TknError};

/// Record of delivered segments.
pub trait QueueHistory: Send {
    /// Record a delivered segment.
    fn push(&mut self, segment: Segment);

    /// Retained segments, oldest first.
    fn get(&self) -> Vec<Segment>;

    /// Drop every retained segment.
    fn clear(&mut self);

    /// Number of retained segments.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the history selected by a strategy, or `None` when disabled.
pub fn from_strategy(
    strategy: HistoryStrategy,
) -> Result<Option<Box<dyn QueueHistory>>, TknError> {
    match strategy {
        HistoryStrategy::None => Ok(None),
        HistoryStrategy::Unbounded => Ok(Some(Box::new(UnboundedHistory::default()))),
        HistoryStrategy::Bounded { max_length } => {
            Ok(Some(Box::new(BoundedHistory::new(max_length)?)))
        }
    }
}

/// Keeps every delivered segment.
#[derive(Debug, Default)]
pub struct UnboundedHistory {
    entries: Vec<Segment>,
}

impl QueueHistory for UnboundedHistory {
    fn push(&mut self, segment: Segment) {
        self.entries.push(segment);
    }

    fn get(&self) -> Vec<Segment> {
        self.entries.clone()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Ring buffer that overwrites the oldest entry once full.
#[derive(Debug)]
pub struct BoundedHistory {
    entries: VecDeque<Segment>,
    max: usize,
}

impl BoundedHistory {
    /// # Errors
    ///
    /// Returns `TknError::Config` when `max` is zero.
    pub fn new(max: usize) -> Result<Self, TknError> {
        if max == 0 {
            return Err(TknError::Config(
                "History max must be a positive integer; got 0".to_string(),
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(max),
            max,
        })
    }
}

impl QueueHistory for BoundedHistory {
    fn push(&mut self, segment: Segment) {
        if self.entries.len() == self.max {
            self.entries.pop_front();
        }
        self.entries.push_back(segment);
    }

    fn get(&self) -> Vec<Segment> {
        self.entries.iter().cloned().collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

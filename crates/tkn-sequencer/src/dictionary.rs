//! Novelty caches backing the LZ gate.
//!
//! A dictionary only answers "has this key been seen before?" and records
//! the key as a side effect. `Unbounded` grows forever; `Bounded` keeps at
//! most `max` keys and evicts the oldest insertion first.

use std::collections::{HashSet, VecDeque};

use tkn_types::{CacheStrategy, TknError};

/// Membership cache over previously seen keys.
pub trait Dictionary: Send {
    /// Upsert a key.
    ///
    /// Returns true if the key was already present.
    fn merge(&mut self, key: &str) -> bool;

    /// Forget every key.
    fn clear(&mut self);

    /// Number of keys currently retained.
    fn len(&self) -> usize;

    /// True when no key is retained.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the dictionary selected by a cache strategy.
pub fn from_strategy(strategy: CacheStrategy) -> Result<Box<dyn Dictionary>, TknError> {
    match strategy {
        CacheStrategy::Unbounded => Ok(Box::new(Unbounded::new())),
        CacheStrategy::Bounded { max } => Ok(Box::new(Bounded::new(max)?)),
    }
}

/// Dictionary that never evicts.
#[derive(Debug, Default)]
pub struct Unbounded {
    keys: HashSet<String>,
}

impl Unbounded {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dictionary for Unbounded {
    fn merge(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return true;
        }
        self.keys.insert(key.to_string());
        false
    }

    fn clear(&mut self) {
        self.keys.clear();
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Fixed-capacity dictionary with FIFO eviction.
///
/// The ring holds insertion order; the shadow set gives O(1) membership.
/// Both always hold the same keys.
#[derive(Debug)]
pub struct Bounded {
    keys: HashSet<String>,
    ring: VecDeque<String>,
    max: usize,
}

impl Bounded {
    /// Create a bounded dictionary.
    ///
    /// # Errors
    ///
    /// Returns `TknError::Config` when `max` is zero.
    pub fn new(max: usize) -> Result<Self, TknError> {
        if max == 0 {
            return Err(TknError::Config(
                "Bounded max must be a positive integer; got 0".to_string(),
            ));
        }
        Ok(Self {
            keys: HashSet::with_capacity(max),
            ring: VecDeque::with_capacity(max),
            max,
        })
    }

    /// Configured capacity.
    pub fn max(&self) -> usize {
        self.max
    }
}

impl Dictionary for Bounded {
    fn merge(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return true;
        }

        if self.ring.len() == self.max {
            if let Some(oldest) = self.ring.pop_front() {
                self.keys.remove(&oldest);
            }
        }

        self.ring.push_back(key.to_string());
        self.keys.insert(key.to_string());
        false
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.ring.clear();
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}

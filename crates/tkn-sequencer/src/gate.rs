//! Gates decide whether a candidate keeps extending.
//!
//! A gate returns true to continue and false to segment. The LZ gate
//! continues exactly when the extended key is already in its dictionary,
//! and records every key it sees, so known substrings keep growing and
//! the first unseen extension marks a new pattern.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dictionary::Dictionary;

/// Point-in-time metrics of one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    /// Gate name
    pub name: String,
    /// Number of keys evaluated
    pub ingested: u64,
    /// Fraction of evaluations that passed (0.0 before any input)
    pub pass_rate: f64,
    /// Gate-specific metrics
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
}

/// Pluggable continue-or-segment predicate.
pub trait Gate: Send {
    /// Evaluate an extension of the candidate.
    ///
    /// `current` is the candidate key with the new symbol appended,
    /// `previous` the key before it. Returns true to keep extending.
    fn evaluate(&mut self, current: &str, previous: &str) -> bool;

    /// Clear all learned state.
    fn reset(&mut self);

    /// Current metrics.
    fn snapshot(&self) -> GateSnapshot;
}

/// LZ-style novelty gate over a dictionary.
pub struct LzGate {
    name: String,
    cache: Box<dyn Dictionary>,
    ingested: u64,
    passed: u64,
}

impl LzGate {
    /// Create a gate named "LZGate" over the given dictionary.
    pub fn new(cache: Box<dyn Dictionary>) -> Self {
        Self::with_name("LZGate", cache)
    }

    pub fn with_name(name: impl Into<String>, cache: Box<dyn Dictionary>) -> Self {
        Self {
            name: name.into(),
            cache,
            ingested: 0,
            passed: 0,
        }
    }

    /// Number of keys in the backing dictionary.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Gate for LzGate {
    fn evaluate(&mut self, current: &str, _previous: &str) -> bool {
        self.ingested += 1;
        let known = self.cache.merge(current);
        if known {
            self.passed += 1;
        }
        known
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.ingested = 0;
        self.passed = 0;
    }

    fn snapshot(&self) -> GateSnapshot {
        let pass_rate = if self.ingested == 0 {
            0.0
        } else {
            self.passed as f64 / self.ingested as f64
        };
        let mut custom_metrics = BTreeMap::new();
        custom_metrics.insert("cache_utilization".to_string(), self.cache.len() as f64);

        GateSnapshot {
            name: self.name.clone(),
            ingested: self.ingested,
            pass_rate,
            custom_metrics,
        }
    }
}

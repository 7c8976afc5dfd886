//! Directed, weighted transition graph over pattern keys.
//!
//! Nodes are created lazily the first time a pattern is referenced and
//! get monotonic ids starting at 1. Each merge of `(from, to)` adds one to
//! that edge's weight; weights never decrease.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tkn_storage::{Batch, Storage};
use tkn_types::{Key, RankedToken, Transition};

use crate::context::{GraphContext, GraphNode};
use crate::error::LatticeError;
use crate::scorer::{DegreeScorer, HubScorer};

/// Node ids touched by one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIds {
    pub from_id: u64,
    pub to_id: u64,
}

/// Markov transition graph with pluggable hub scoring.
pub trait Graph: Send {
    /// Id of the node for `token`, creating it if needed.
    fn get_or_create_node(&mut self, token: &str) -> Result<u64, LatticeError>;

    /// Record one `from -> to` transition.
    fn merge(&mut self, from: &str, to: &str) -> Result<EdgeIds, LatticeError>;

    /// Record many transitions as one unit.
    ///
    /// On a durable backend either every pair is stored or none is.
    fn merge_batch(&mut self, pairs: &[(Key, Key)]) -> Result<Vec<EdgeIds>, LatticeError> {
        self.begin();
        let merged: Result<Vec<EdgeIds>, LatticeError> =
            pairs.iter().map(|(from, to)| self.merge(from, to)).collect();
        match merged {
            Ok(ids) => {
                self.commit()?;
                Ok(ids)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    /// Outgoing transitions of `from`, ordered by destination id.
    ///
    /// Empty for an unknown token.
    fn get_next(&self, from: &str) -> Result<Vec<Transition>, LatticeError>;

    /// Rescore every node and return the `limit` best.
    ///
    /// Ties keep node id order.
    fn get_top_tokens(&mut self, limit: usize) -> Result<Vec<RankedToken>, LatticeError>;

    /// The stored node for `token`, with its last computed hub score.
    fn get_node(&self, token: &str) -> Result<Option<GraphNode>, LatticeError>;

    fn node_count(&self) -> Result<u64, LatticeError>;

    fn edge_count(&self) -> Result<u64, LatticeError>;

    /// Start buffering writes until the matching [`commit`](Self::commit).
    fn begin(&mut self) {}

    /// Persist buffered writes.
    fn commit(&mut self) -> Result<(), LatticeError> {
        Ok(())
    }

    /// Discard buffered writes.
    fn rollback(&mut self) {}

    /// End a buffering level like [`commit`](Self::commit), but put the
    /// outermost level's writes into `batch` instead of writing them.
    ///
    /// Returns true if anything was staged. Staged writes stay buffered
    /// until [`settle`](Self::settle), so a failed write loses nothing.
    fn stage(&mut self, _batch: &mut Batch) -> Result<bool, LatticeError> {
        self.commit()?;
        Ok(false)
    }

    /// The batch filled by [`stage`](Self::stage) reached storage.
    fn settle(&mut self) {}

    /// Storage that staged batches must be written to.
    fn storage(&self) -> Option<&Arc<Storage>> {
        None
    }

    /// Release backend resources.
    fn close(&mut self) -> Result<(), LatticeError> {
        Ok(())
    }
}

impl<G: Graph + ?Sized> Graph for Box<G> {
    fn get_or_create_node(&mut self, token: &str) -> Result<u64, LatticeError> {
        (**self).get_or_create_node(token)
    }

    fn merge(&mut self, from: &str, to: &str) -> Result<EdgeIds, LatticeError> {
        (**self).merge(from, to)
    }

    fn merge_batch(&mut self, pairs: &[(Key, Key)]) -> Result<Vec<EdgeIds>, LatticeError> {
        (**self).merge_batch(pairs)
    }

    fn get_next(&self, from: &str) -> Result<Vec<Transition>, LatticeError> {
        (**self).get_next(from)
    }

    fn get_top_tokens(&mut self, limit: usize) -> Result<Vec<RankedToken>, LatticeError> {
        (**self).get_top_tokens(limit)
    }

    fn get_node(&self, token: &str) -> Result<Option<GraphNode>, LatticeError> {
        (**self).get_node(token)
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        (**self).node_count()
    }

    fn edge_count(&self) -> Result<u64, LatticeError> {
        (**self).edge_count()
    }

    fn begin(&mut self) {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<(), LatticeError> {
        (**self).commit()
    }

    fn rollback(&mut self) {
        (**self).rollback()
    }

    fn stage(&mut self, batch: &mut Batch) -> Result<bool, LatticeError> {
        (**self).stage(batch)
    }

    fn settle(&mut self) {
        (**self).settle()
    }

    fn storage(&self) -> Option<&Arc<Storage>> {
        (**self).storage()
    }

    fn close(&mut self) -> Result<(), LatticeError> {
        (**self).close()
    }
}

/// In-memory graph over an owned [`GraphContext`].
pub struct MemoryGraph {
    context: GraphContext,
    ids: HashMap<String, u64>,
    scorer: Box<dyn HubScorer>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new(Box::new(DegreeScorer))
    }
}

impl MemoryGraph {
    pub fn new(scorer: Box<dyn HubScorer>) -> Self {
        Self {
            context: GraphContext::new(),
            ids: HashMap::new(),
            scorer,
        }
    }

    /// Read-only view of the arena.
    pub fn context(&self) -> &GraphContext {
        &self.context
    }
}

impl Graph for MemoryGraph {
    fn get_or_create_node(&mut self, token: &str) -> Result<u64, LatticeError> {
        if let Some(&id) = self.ids.get(token) {
            return Ok(id);
        }
        let id = self.context.add_node(token);
        self.ids.insert(token.to_string(), id);
        Ok(id)
    }

    fn merge(&mut self, from: &str, to: &str) -> Result<EdgeIds, LatticeError> {
        let from_id = self.get_or_create_node(from)?;
        let to_id = self.get_or_create_node(to)?;
        self.context.add_weight(from_id, to_id, 1)?;
        Ok(EdgeIds { from_id, to_id })
    }

    fn get_next(&self, from: &str) -> Result<Vec<Transition>, LatticeError> {
        let Some(&from_id) = self.ids.get(from) else {
            return Ok(Vec::new());
        };
        self.context
            .out_edges(from_id)
            .map(|(to_id, weight)| {
                let node = self.context.node(to_id).ok_or_else(|| {
                    LatticeError::Invariant(format!("edge target {} has no node", to_id))
                })?;
                Ok(Transition {
                    to: node.token.clone(),
                    weight,
                })
            })
            .collect()
    }

    fn get_top_tokens(&mut self, limit: usize) -> Result<Vec<RankedToken>, LatticeError> {
        self.scorer.compute(&mut self.context);
        debug!(
            scorer = self.scorer.name(),
            nodes = self.context.node_count(),
            "Rescored graph"
        );
        Ok(self.context.ranked(limit))
    }

    fn get_node(&self, token: &str) -> Result<Option<GraphNode>, LatticeError> {
        Ok(self
            .ids
            .get(token)
            .and_then(|id| self.context.node(*id))
            .cloned())
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        Ok(self.context.node_count() as u64)
    }

    fn edge_count(&self) -> Result<u64, LatticeError> {
        Ok(self.context.edge_count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::PageRankScorer;
    use proptest::prelude::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut graph = MemoryGraph::default();
        let a = graph.get_or_create_node("a").unwrap();
        let b = graph.get_or_create_node("b").unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(graph.get_or_create_node("a").unwrap(), a);
        assert_eq!(graph.node_count().unwrap(), 2);
    }

    #[test]
    fn test_merge_counts_transitions() {
        let mut graph = MemoryGraph::default();
        let ids = graph.merge("the", "tok").unwrap();
        assert_eq!(ids, EdgeIds { from_id: 1, to_id: 2 });
        graph.merge("the", "tok").unwrap();
        graph.merge("the", "en").unwrap();

        let next = graph.get_next("the").unwrap();
        assert_eq!(
            next,
            vec![
                Transition {
                    to: "tok".to_string(),
                    weight: 2
                },
                Transition {
                    to: "en".to_string(),
                    weight: 1
                },
            ]
        );
        assert_eq!(graph.edge_count().unwrap(), 2);
        assert!(graph.get_next("missing").unwrap().is_empty());
    }

    #[test]
    fn test_self_loop() {
        let mut graph = MemoryGraph::default();
        graph.merge("ab", "ab").unwrap();
        assert_eq!(graph.get_next("ab").unwrap()[0].weight, 1);
        assert_eq!(graph.node_count().unwrap(), 1);
    }

    #[test]
    fn test_merge_batch() {
        let mut graph = MemoryGraph::default();
        let pairs = vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
            ("a".to_string(), "b".to_string()),
        ];
        let ids = graph.merge_batch(&pairs).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(graph.get_next("a").unwrap()[0].weight, 2);
    }

    #[test]
    fn test_top_tokens_degree() {
        let mut graph = MemoryGraph::default();
        for _ in 0..100 {
            graph.merge("ing", "x").unwrap();
        }
        graph.merge("a", "x").unwrap();

        let top = graph.get_top_tokens(1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].pattern, "ing");
        assert!((top[0].confidence - 101f64.ln()).abs() < 1e-9);

        let node = graph.get_node("ing").unwrap().unwrap();
        assert_eq!(node.hub_score, top[0].confidence);
    }

    #[test]
    fn test_top_tokens_ties_keep_insertion_order() {
        let mut graph = MemoryGraph::default();
        graph.merge("p", "q").unwrap();
        graph.merge("r", "s").unwrap();
        let top = graph.get_top_tokens(4).unwrap();
        let patterns: Vec<&str> = top.iter().map(|t| t.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["p", "r", "q", "s"]);
    }

    #[test]
    fn test_top_tokens_are_idempotent() {
        let mut graph = MemoryGraph::new(Box::new(PageRankScorer::default()));
        for (from, to) in [("a", "b"), ("b", "c"), ("c", "a"), ("a", "c")] {
            graph.merge(from, to).unwrap();
        }
        let first = graph.get_top_tokens(10).unwrap();
        let second = graph.get_top_tokens(10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].confidence, 1.0);
    }

    proptest! {
        #[test]
        fn prop_edge_weight_counts_merges(
            pairs in proptest::collection::vec((0u8..4, 0u8..4), 0..100),
        ) {
            let mut graph = MemoryGraph::default();
            let mut expected: HashMap<(u8, u8), u64> = HashMap::new();
            for (from, to) in &pairs {
                let before = graph
                    .get_next(&from.to_string())
                    .unwrap()
                    .into_iter()
                    .find(|t| t.to == to.to_string())
                    .map(|t| t.weight)
                    .unwrap_or(0);
                graph.merge(&from.to_string(), &to.to_string()).unwrap();
                *expected.entry((*from, *to)).or_default() += 1;

                let after = graph
                    .get_next(&from.to_string())
                    .unwrap()
                    .into_iter()
                    .find(|t| t.to == to.to_string())
                    .map(|t| t.weight)
                    .unwrap_or(0);
                prop_assert!(after > before);
            }
            for ((from, to), count) in expected {
                let weight = graph
                    .get_next(&from.to_string())
                    .unwrap()
                    .into_iter()
                    .find(|t| t.to == to.to_string())
                    .map(|t| t.weight);
                prop_assert_eq!(weight, Some(count));
            }
        }
    }
}

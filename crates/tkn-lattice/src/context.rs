//! Arena view of a transition graph.
//!
//! Nodes live in a vector in id order; adjacency is one ordered map of
//! `to_id -> weight` per node, stored at the node's position. The
//! in-memory graph owns one context for its whole life; the durable graph
//! loads one from storage whenever scores are requested. Scorers only
//! ever see this type.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use tkn_types::RankedToken;

use crate::error::LatticeError;

/// A discovered pattern and its derived importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable, monotonic, unique per pattern
    pub id: u64,
    /// The pattern key
    pub token: String,
    /// Last computed hub score (0 until scored)
    #[serde(default)]
    pub hub_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GraphContext {
    nodes: Vec<GraphNode>,
    positions: HashMap<u64, usize>,
    adjacency: Vec<BTreeMap<u64, u64>>,
    next_id: u64,
}

impl GraphContext {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Append a new node with the next free id.
    pub fn add_node(&mut self, token: impl Into<String>) -> u64 {
        let id = self.next_id.max(1);
        self.insert_node(GraphNode {
            id,
            token: token.into(),
            hub_score: 0.0,
        });
        id
    }

    /// Append an existing node. Nodes must arrive in increasing id order.
    pub fn insert_node(&mut self, node: GraphNode) {
        self.next_id = self.next_id.max(node.id + 1);
        self.positions.insert(node.id, self.nodes.len());
        self.nodes.push(node);
        self.adjacency.push(BTreeMap::new());
    }

    fn position_of(&self, id: u64) -> Result<usize, LatticeError> {
        self.positions
            .get(&id)
            .copied()
            .ok_or_else(|| LatticeError::Invariant(format!("graph node {} does not exist", id)))
    }

    /// Position of a node in [`nodes`](Self::nodes).
    pub fn position(&self, id: u64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Add `delta` to the `from -> to` edge, creating it if absent.
    ///
    /// Returns the new weight.
    pub fn add_weight(&mut self, from: u64, to: u64, delta: u64) -> Result<u64, LatticeError> {
        self.position_of(to)?;
        let from_pos = self.position_of(from)?;
        let weight = self.adjacency[from_pos].entry(to).or_insert(0);
        *weight += delta;
        Ok(*weight)
    }

    pub fn node(&self, id: u64) -> Option<&GraphNode> {
        self.position(id).map(|pos| &self.nodes[pos])
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeMap::len).sum()
    }

    /// Outgoing `(to_id, weight)` pairs of a node, ordered by `to_id`.
    pub fn out_edges(&self, id: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.position(id)
            .into_iter()
            .flat_map(move |pos| self.adjacency[pos].iter().map(|(to, w)| (*to, *w)))
    }

    /// Outgoing edges by node position, for scorers.
    pub(crate) fn adjacency(&self) -> &[BTreeMap<u64, u64>] {
        &self.adjacency
    }

    /// Sum of outgoing edge weights.
    pub fn out_weight(&self, id: u64) -> u64 {
        self.out_edges(id).map(|(_, w)| w).sum()
    }

    /// Overwrite the hub score of the node at `position`.
    pub fn set_hub_score(&mut self, position: usize, score: f64) {
        if let Some(node) = self.nodes.get_mut(position) {
            node.hub_score = score;
        }
    }

    /// The `limit` highest-scoring nodes; ties keep id order.
    pub fn ranked(&self, limit: usize) -> Vec<RankedToken> {
        let mut order: Vec<&GraphNode> = self.nodes.iter().collect();
        // sort_by is stable
        order.sort_by(|a, b| b.hub_score.total_cmp(&a.hub_score));
        order
            .into_iter()
            .take(limit)
            .map(|node| RankedToken {
                pattern: node.token.clone(),
                confidence: node.hub_score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut ctx = GraphContext::new();
        assert_eq!(ctx.add_node("a"), 1);
        assert_eq!(ctx.add_node("b"), 2);
        assert_eq!(ctx.node(2).unwrap().token, "b");
        assert!(ctx.node(3).is_none());
    }

    #[test]
    fn test_add_weight_accumulates() {
        let mut ctx = GraphContext::new();
        let a = ctx.add_node("a");
        let b = ctx.add_node("b");
        assert_eq!(ctx.add_weight(a, b, 1).unwrap(), 1);
        assert_eq!(ctx.add_weight(a, b, 2).unwrap(), 3);
        assert_eq!(ctx.edge_count(), 1);
        assert_eq!(ctx.out_weight(a), 3);
        assert_eq!(ctx.out_weight(b), 0);
        assert!(matches!(
            ctx.add_weight(a, 99, 1),
            Err(LatticeError::Invariant(_))
        ));
    }

    #[test]
    fn test_insert_with_gaps() {
        let mut ctx = GraphContext::new();
        ctx.insert_node(GraphNode {
            id: 4,
            token: "x".to_string(),
            hub_score: 0.5,
        });
        assert_eq!(ctx.position(4), Some(0));
        assert_eq!(ctx.add_node("y"), 5);
    }

    #[test]
    fn test_ranked_is_stable() {
        let mut ctx = GraphContext::new();
        for token in ["a", "b", "c"] {
            ctx.add_node(token);
        }
        ctx.set_hub_score(2, 1.0);
        let ranked = ctx.ranked(3);
        let patterns: Vec<&str> = ranked.iter().map(|t| t.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["c", "a", "b"]);
        assert_eq!(ctx.ranked(1).len(), 1);
        assert!(GraphContext::new().ranked(5).is_empty());
    }
}

//! RocksDB-backed transition graph.
//!
//! Records:
//! - `graph_nodes`: `node:{id}` -> JSON [`GraphNode`]
//! - `graph_tokens`: `tok:{token}` -> node id
//! - `graph_edges`: `edge:{from}:{to}` -> weight
//!
//! Writes go to an overlay first. Outside of `begin`/`commit` every
//! mutation is written immediately; inside, the overlay is written as one
//! atomic batch at the outermost commit, or staged into a caller's batch.
//! The overlay is only dropped once its batch is written. Reads always see
//! the overlay.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, instrument};

use tkn_storage::column_families::{CF_GRAPH_EDGES, CF_GRAPH_NODES, CF_GRAPH_TOKENS};
use tkn_storage::{decode_u64, encode_u64, Batch, EdgeKey, NodeKey, Storage, TokenKey};
use tkn_types::{RankedToken, Transition};

use crate::context::{GraphContext, GraphNode};
use crate::error::LatticeError;
use crate::graph::{EdgeIds, Graph};
use crate::scorer::HubScorer;

const NODE_PREFIX: &[u8] = b"node:";

/// Committed token ids kept in memory before the cache starts over.
const TOKEN_CACHE_LIMIT: usize = 1 << 16;

#[derive(Debug, Default)]
struct PendingGraph {
    nodes: BTreeMap<u64, GraphNode>,
    tokens: HashMap<String, u64>,
    /// Absolute weights
    edges: BTreeMap<(u64, u64), u64>,
    new_edges: usize,
}

impl PendingGraph {
    fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    fn put_into(&self, batch: &mut Batch) -> Result<(), LatticeError> {
        for (id, node) in &self.nodes {
            batch.put_json(CF_GRAPH_NODES, NodeKey::new(*id).to_bytes(), node)?;
            batch.put(
                CF_GRAPH_TOKENS,
                TokenKey::new(&node.token).to_bytes(),
                encode_u64(*id).to_vec(),
            );
        }
        for ((from, to), weight) in &self.edges {
            batch.put(
                CF_GRAPH_EDGES,
                EdgeKey::new(*from, *to).to_bytes(),
                encode_u64(*weight).to_vec(),
            );
        }
        Ok(())
    }
}

pub struct RocksGraph {
    storage: Arc<Storage>,
    scorer: Box<dyn HubScorer>,
    /// Committed token ids, a read-through cache over `graph_tokens`.
    /// Cleared when it reaches [`TOKEN_CACHE_LIMIT`].
    tokens: HashMap<String, u64>,
    pending: PendingGraph,
    depth: usize,
}

impl RocksGraph {
    pub fn new(storage: Arc<Storage>, scorer: Box<dyn HubScorer>) -> Self {
        Self {
            storage,
            scorer,
            tokens: HashMap::new(),
            pending: PendingGraph::default(),
            depth: 0,
        }
    }

    fn lookup_id(&self, token: &str) -> Result<Option<u64>, LatticeError> {
        if let Some(&id) = self
            .pending
            .tokens
            .get(token)
            .or_else(|| self.tokens.get(token))
        {
            return Ok(Some(id));
        }
        match self
            .storage
            .get(CF_GRAPH_TOKENS, &TokenKey::new(token).to_bytes())?
        {
            Some(bytes) => Ok(Some(decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_node(&self, id: u64) -> Result<GraphNode, LatticeError> {
        if let Some(node) = self.pending.nodes.get(&id) {
            return Ok(node.clone());
        }
        self.storage
            .get_json(CF_GRAPH_NODES, &NodeKey::new(id).to_bytes())?
            .ok_or_else(|| LatticeError::Invariant(format!("graph node {} is missing", id)))
    }

    fn weight(&self, from: u64, to: u64) -> Result<u64, LatticeError> {
        if let Some(&weight) = self.pending.edges.get(&(from, to)) {
            return Ok(weight);
        }
        match self
            .storage
            .get(CF_GRAPH_EDGES, &EdgeKey::new(from, to).to_bytes())?
        {
            Some(bytes) => Ok(decode_u64(&bytes)?),
            None => Ok(0),
        }
    }

    fn autocommit(&mut self) -> Result<(), LatticeError> {
        if self.depth == 0 {
            self.write_pending()?;
        }
        Ok(())
    }

    fn write_pending(&mut self) -> Result<(), LatticeError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::new();
        self.pending.put_into(&mut batch)?;
        self.storage.write(batch)?;
        self.drop_written();
        Ok(())
    }

    /// Forget an overlay whose records are on disk.
    fn drop_written(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        debug!(
            nodes = pending.nodes.len(),
            edges = pending.edges.len(),
            "Committed graph batch"
        );
        for (token, id) in pending.tokens {
            self.cache_token(token, id);
        }
    }

    fn cache_token(&mut self, token: String, id: u64) {
        if self.tokens.len() >= TOKEN_CACHE_LIMIT && !self.tokens.contains_key(&token) {
            debug!(cached = self.tokens.len(), "Token cache full, starting over");
            self.tokens.clear();
        }
        self.tokens.insert(token, id);
    }

    /// Build an arena from stored records plus the overlay.
    fn load_context(&self) -> Result<GraphContext, LatticeError> {
        let mut ctx = GraphContext::new();
        for (_, value) in self.storage.prefix_iterator(CF_GRAPH_NODES, NODE_PREFIX)? {
            let node: GraphNode = serde_json::from_slice(&value)?;
            if !self.pending.nodes.contains_key(&node.id) {
                ctx.insert_node(node);
            }
        }
        for node in self.pending.nodes.values() {
            ctx.insert_node(node.clone());
        }

        let mut edges: BTreeMap<(u64, u64), u64> = BTreeMap::new();
        for (key, value) in self
            .storage
            .prefix_iterator(CF_GRAPH_EDGES, &EdgeKey::all_prefix())?
        {
            let key = EdgeKey::from_bytes(&key)?;
            edges.insert((key.from, key.to), decode_u64(&value)?);
        }
        edges.extend(self.pending.edges.iter().map(|(k, w)| (*k, *w)));
        for ((from, to), weight) in edges {
            ctx.add_weight(from, to, weight)?;
        }
        Ok(ctx)
    }
}

impl Graph for RocksGraph {
    fn get_or_create_node(&mut self, token: &str) -> Result<u64, LatticeError> {
        if let Some(id) = self.lookup_id(token)? {
            let committed = !self.pending.tokens.contains_key(token);
            if self.depth == 0 && committed && !self.tokens.contains_key(token) {
                self.cache_token(token.to_string(), id);
            }
            return Ok(id);
        }

        let id = self.storage.next_node_id();
        self.pending.nodes.insert(
            id,
            GraphNode {
                id,
                token: token.to_string(),
                hub_score: 0.0,
            },
        );
        self.pending.tokens.insert(token.to_string(), id);
        self.autocommit()?;
        Ok(id)
    }

    fn merge(&mut self, from: &str, to: &str) -> Result<EdgeIds, LatticeError> {
        let from_id = self.get_or_create_node(from)?;
        let to_id = self.get_or_create_node(to)?;

        let weight = self.weight(from_id, to_id)?;
        if weight == 0 {
            self.pending.new_edges += 1;
        }
        self.pending.edges.insert((from_id, to_id), weight + 1);
        self.autocommit()?;
        Ok(EdgeIds { from_id, to_id })
    }

    #[instrument(skip(self))]
    fn get_next(&self, from: &str) -> Result<Vec<Transition>, LatticeError> {
        let Some(from_id) = self.lookup_id(from)? else {
            return Ok(Vec::new());
        };

        let mut weights: BTreeMap<u64, u64> = BTreeMap::new();
        for (key, value) in self
            .storage
            .prefix_iterator(CF_GRAPH_EDGES, &EdgeKey::prefix(from_id))?
        {
            weights.insert(EdgeKey::from_bytes(&key)?.to, decode_u64(&value)?);
        }
        for ((_, to), weight) in self
            .pending
            .edges
            .range((from_id, 0)..=(from_id, u64::MAX))
        {
            weights.insert(*to, *weight);
        }

        weights
            .into_iter()
            .map(|(to_id, weight)| {
                Ok(Transition {
                    to: self.load_node(to_id)?.token,
                    weight,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    fn get_top_tokens(&mut self, limit: usize) -> Result<Vec<RankedToken>, LatticeError> {
        let mut ctx = self.load_context()?;
        self.scorer.compute(&mut ctx);

        // Persist scores; overlay nodes get theirs at commit.
        let mut batch = Batch::new();
        for node in ctx.nodes() {
            match self.pending.nodes.get_mut(&node.id) {
                Some(pending) => pending.hub_score = node.hub_score,
                None => batch.put_json(CF_GRAPH_NODES, NodeKey::new(node.id).to_bytes(), node)?,
            }
        }
        self.storage.write(batch)?;
        debug!(
            scorer = self.scorer.name(),
            nodes = ctx.node_count(),
            "Rescored durable graph"
        );

        Ok(ctx.ranked(limit))
    }

    fn get_node(&self, token: &str) -> Result<Option<GraphNode>, LatticeError> {
        match self.lookup_id(token)? {
            Some(id) => Ok(Some(self.load_node(id)?)),
            None => Ok(None),
        }
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        let stored = self
            .storage
            .prefix_iterator(CF_GRAPH_NODES, NODE_PREFIX)?
            .len();
        Ok((stored + self.pending.nodes.len()) as u64)
    }

    fn edge_count(&self) -> Result<u64, LatticeError> {
        let stored = self
            .storage
            .prefix_iterator(CF_GRAPH_EDGES, &EdgeKey::all_prefix())?
            .len();
        Ok((stored + self.pending.new_edges) as u64)
    }

    fn begin(&mut self) {
        self.depth += 1;
    }

    fn commit(&mut self) -> Result<(), LatticeError> {
        self.depth = self.depth.saturating_sub(1);
        self.autocommit()
    }

    fn rollback(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        let discarded = std::mem::take(&mut self.pending);
        debug!(
            nodes = discarded.nodes.len(),
            edges = discarded.edges.len(),
            "Rolled back graph batch"
        );
    }

    fn stage(&mut self, batch: &mut Batch) -> Result<bool, LatticeError> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 || self.pending.is_empty() {
            return Ok(false);
        }
        self.pending.put_into(batch)?;
        Ok(true)
    }

    fn settle(&mut self) {
        self.drop_written();
    }

    fn storage(&self) -> Option<&Arc<Storage>> {
        Some(&self.storage)
    }

    fn close(&mut self) -> Result<(), LatticeError> {
        self.depth = 0;
        self.write_pending()?;
        self.storage.flush()?;
        Ok(())
    }
}

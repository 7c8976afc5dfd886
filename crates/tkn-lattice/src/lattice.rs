//! Lattice facade: one trie and one graph sharing pattern ids.
//!
//! `pipe` consumes a segment stream. For every segment it gets or creates
//! the pattern's graph node, indexes each absorbed symbol and the full
//! pattern key in the trie against that id, and records the transition
//! from the previous pattern. Writes are grouped into batches of
//! `batch_size` transitions; the batch size changes throughput, never the
//! resulting index.

use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tkn_storage::{Batch, Storage};
use tkn_types::{BackendKind, Key, RankedToken, Segment, Settings, Transition};

use crate::error::LatticeError;
use crate::graph::{EdgeIds, Graph, MemoryGraph};
use crate::rocks_graph::RocksGraph;
use crate::rocks_trie::RocksTrie;
use crate::scorer::{self, HubScorer};
use crate::trie::{MemoryTrie, Trie, TrieEntry};

/// Transitions per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Lattice with both parts chosen at runtime.
pub type DynLattice = Lattice<Box<dyn Graph>, Box<dyn Trie>>;

/// Pure in-memory lattice.
pub type MemoryLattice = Lattice<MemoryGraph, MemoryTrie>;

/// RocksDB-backed lattice.
pub type DurableLattice = Lattice<RocksGraph, RocksTrie>;

/// Counts reported by one `pipe` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeSummary {
    pub segments: u64,
    pub transitions: u64,
    pub batches: u64,
}

/// Index size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatticeStats {
    pub nodes: u64,
    pub edges: u64,
    pub trie_nodes: u64,
}

pub struct Lattice<G: Graph, T: Trie> {
    graph: G,
    trie: T,
    batch_size: usize,
}

impl MemoryLattice {
    pub fn in_memory(scorer: Box<dyn HubScorer>) -> Self {
        Lattice::new(MemoryGraph::new(scorer), MemoryTrie::new())
    }
}

impl DurableLattice {
    /// Open a lattice over existing storage.
    pub fn durable(storage: Arc<Storage>, scorer: Box<dyn HubScorer>) -> Result<Self, LatticeError> {
        let trie = RocksTrie::new(storage.clone())?;
        Ok(Lattice::new(RocksGraph::new(storage, scorer), trie))
    }
}

/// Build the lattice described by `settings`.
///
/// The durable backend opens `storage_location`; `:memory:` keeps it in
/// memory, any other value is a directory created on demand.
pub fn open_lattice(settings: &Settings) -> Result<DynLattice, LatticeError> {
    let scorer = scorer::from_strategy(settings.scorer)?;
    let lattice: DynLattice = match settings.backend {
        BackendKind::Memory => Lattice::new(
            Box::new(MemoryGraph::new(scorer)) as Box<dyn Graph>,
            Box::new(MemoryTrie::new()) as Box<dyn Trie>,
        ),
        BackendKind::Durable => {
            let location = settings.expanded_storage_location();
            if !settings.is_memory_location() {
                ensure_dir(&location)?;
            }
            let storage = Arc::new(Storage::open_location(&location)?);
            let trie = RocksTrie::new(storage.clone())?;
            Lattice::new(
                Box::new(RocksGraph::new(storage, scorer)) as Box<dyn Graph>,
                Box::new(trie) as Box<dyn Trie>,
            )
        }
    };
    info!(backend = ?settings.backend, scorer = ?settings.scorer, "Lattice opened");
    Ok(lattice.with_batch_size(settings.batch_size))
}

fn ensure_dir(path: &Path) -> Result<(), LatticeError> {
    std::fs::create_dir_all(path).map_err(|e| {
        LatticeError::InvalidInput(format!(
            "cannot create storage directory {}: {}",
            path.display(),
            e
        ))
    })
}

impl<G: Graph, T: Trie> Lattice<G, T> {
    pub fn new(graph: G, trie: T) -> Self {
        Self {
            graph,
            trie,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of transitions written per batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn trie(&self) -> &T {
        &self.trie
    }

    fn begin(&mut self) {
        self.graph.begin();
        self.trie.begin();
    }

    /// End a batch. At the outermost level the graph and trie writes go to
    /// storage as one batch; if that write fails both stay buffered and
    /// are written by the next commit or `close`.
    fn commit(&mut self) -> Result<(), LatticeError> {
        let mut batch = Batch::new();
        // Both levels end even if one fails to stage
        let graph_staged = self.graph.stage(&mut batch);
        let trie_staged = self.trie.stage(&mut batch);
        let (graph_staged, trie_staged) = (graph_staged?, trie_staged?);
        if !graph_staged && !trie_staged {
            return Ok(());
        }

        let storage = self.shared_storage()?;
        let records = batch.len();
        storage.write(batch)?;
        if graph_staged {
            self.graph.settle();
        }
        if trie_staged {
            self.trie.settle();
        }
        debug!(records, "Committed lattice batch");
        Ok(())
    }

    fn shared_storage(&self) -> Result<Arc<Storage>, LatticeError> {
        match (self.graph.storage(), self.trie.storage()) {
            (Some(graph), Some(trie)) if !Arc::ptr_eq(graph, trie) => Err(LatticeError::Invariant(
                "graph and trie staged writes for different storage".to_string(),
            )),
            (Some(storage), _) | (None, Some(storage)) => Ok(storage.clone()),
            (None, None) => Err(LatticeError::Invariant(
                "staged writes without a storage to write them to".to_string(),
            )),
        }
    }

    fn rollback(&mut self) {
        self.graph.rollback();
        self.trie.rollback();
    }

    /// Record transitions and index both ends of each in the trie.
    ///
    /// Applied as one batch.
    pub fn merge(&mut self, pairs: &[(Key, Key)]) -> Result<Vec<EdgeIds>, LatticeError> {
        // Checked up front: the in-memory backend cannot roll back.
        if let Some((from, to)) = pairs.iter().find(|(f, t)| f.is_empty() || t.is_empty()) {
            return Err(LatticeError::InvalidInput(format!(
                "empty pattern in transition ({:?}, {:?})",
                from, to
            )));
        }
        self.begin();
        match self.merge_pairs(pairs) {
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

    fn merge_pairs(&mut self, pairs: &[(Key, Key)]) -> Result<Vec<EdgeIds>, LatticeError> {
        let mut merged = Vec::with_capacity(pairs.len());
        for (from, to) in pairs {
            let ids = self.graph.merge(from, to)?;
            self.trie.merge(from, ids.from_id)?;
            self.trie.merge(to, ids.to_id)?;
            merged.push(ids);
        }
        Ok(merged)
    }

    /// Index one segment and, if given, its incoming transition.
    fn ingest(&mut self, segment: &Segment, previous: Option<&str>) -> Result<(), LatticeError> {
        if segment.key.is_empty() {
            return Err(LatticeError::InvalidInput(
                "segment with an empty key".to_string(),
            ));
        }
        let id = self.graph.get_or_create_node(&segment.key)?;
        for symbol in segment.sequence.iter().filter(|s| !s.is_empty()) {
            self.trie.claim(symbol, id)?;
        }
        self.trie.merge(&segment.key, id)?;

        if let Some(previous) = previous {
            self.graph.merge(previous, &segment.key)?;
        }
        Ok(())
    }

    /// Consume a segment stream until it ends.
    ///
    /// If a segment is rejected the current batch is discarded and the
    /// error returned; earlier batches stay committed. If a batch cannot be
    /// written it stays buffered, unwritten, for the next commit or `close`.
    pub async fn pipe<S>(&mut self, source: S) -> Result<PipeSummary, LatticeError>
    where
        S: Stream<Item = Segment>,
    {
        let mut source = std::pin::pin!(source);
        let mut summary = PipeSummary::default();
        let mut previous: Option<Key> = None;
        let mut pending = 0usize;

        self.begin();
        while let Some(segment) = source.next().await {
            if let Err(e) = self.ingest(&segment, previous.as_deref()) {
                self.rollback();
                return Err(e);
            }
            summary.segments += 1;
            if previous.is_some() {
                summary.transitions += 1;
                pending += 1;
            }
            previous = Some(segment.key);

            if pending >= self.batch_size {
                self.commit()?;
                summary.batches += 1;
                debug!(transitions = pending, "Flushed lattice batch");
                pending = 0;
                self.begin();
            }
        }
        self.commit()?;
        if pending > 0 {
            summary.batches += 1;
        }

        info!(
            segments = summary.segments,
            transitions = summary.transitions,
            batches = summary.batches,
            "Pipe finished"
        );
        Ok(summary)
    }

    /// Outgoing transitions of a pattern.
    pub fn get_next(&self, from: &str) -> Result<Vec<Transition>, LatticeError> {
        self.graph.get_next(from)
    }

    /// Characters that extend `prefix` in the trie.
    pub fn next_characters(&self, prefix: &str) -> Result<Vec<char>, LatticeError> {
        self.trie.next_characters(prefix)
    }

    /// Rescore and return the `limit` best patterns.
    pub fn get_top_tokens(&mut self, limit: usize) -> Result<Vec<RankedToken>, LatticeError> {
        self.graph.get_top_tokens(limit)
    }

    /// Trie entry for an exact pattern.
    pub fn lookup(&self, pattern: &str) -> Result<Option<TrieEntry>, LatticeError> {
        self.trie.lookup(pattern)
    }

    pub fn stats(&self) -> Result<LatticeStats, LatticeError> {
        Ok(LatticeStats {
            nodes: self.graph.node_count()?,
            edges: self.graph.edge_count()?,
            trie_nodes: self.trie.node_count()?,
        })
    }

    /// Write anything buffered and release backend resources.
    pub fn close(&mut self) -> Result<(), LatticeError> {
        self.commit()?;
        let graph = self.graph.close();
        let trie = self.trie.close();
        graph.and(trie)
    }
}

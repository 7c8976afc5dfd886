//! RocksDB-backed character trie.
//!
//! Records:
//! - `trie_nodes`: `trie:{id}` -> JSON record (parent, symbol, terminal
//!   flag, pattern and graph id)
//! - `trie_children`: `child:{parent}:{char}` -> child id
//!
//! The root has id 0 and is created on open. Buffering and staging follow
//! the same `begin`/`commit` rules as the durable graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use tkn_storage::column_families::{CF_TRIE_CHILDREN, CF_TRIE_NODES};
use tkn_storage::{decode_u64, encode_u64, Batch, ChildKey, Storage, StorageError, TrieKey};

use crate::error::LatticeError;
use crate::trie::{require_pattern, Trie, TrieEntry};

const ROOT_ID: u64 = 0;
const TRIE_PREFIX: &[u8] = b"trie:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrieRecord {
    id: u64,
    parent: Option<u64>,
    symbol: Option<char>,
    terminal: bool,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    markov_id: Option<u64>,
}

impl TrieRecord {
    fn root() -> Self {
        Self {
            id: ROOT_ID,
            parent: None,
            symbol: None,
            terminal: false,
            pattern: None,
            markov_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct PendingTrie {
    records: BTreeMap<u64, TrieRecord>,
    children: BTreeMap<(u64, char), u64>,
    created: usize,
}

impl PendingTrie {
    fn is_empty(&self) -> bool {
        self.records.is_empty() && self.children.is_empty()
    }

    fn put_into(&self, batch: &mut Batch) -> Result<(), LatticeError> {
        for (id, record) in &self.records {
            batch.put_json(CF_TRIE_NODES, TrieKey::new(*id).to_bytes(), record)?;
        }
        for ((parent, ch), child) in &self.children {
            batch.put(
                CF_TRIE_CHILDREN,
                ChildKey::new(*parent, ch.to_string()).to_bytes(),
                encode_u64(*child).to_vec(),
            );
        }
        Ok(())
    }
}

pub struct RocksTrie {
    storage: Arc<Storage>,
    pending: PendingTrie,
    depth: usize,
}

impl RocksTrie {
    /// Open the trie over `storage`, creating the root if needed.
    pub fn new(storage: Arc<Storage>) -> Result<Self, LatticeError> {
        let root_key = TrieKey::new(ROOT_ID).to_bytes();
        if storage.get(CF_TRIE_NODES, &root_key)?.is_none() {
            let mut batch = Batch::new();
            batch.put_json(CF_TRIE_NODES, root_key, &TrieRecord::root())?;
            storage.write(batch)?;
            debug!("Created trie root");
        }
        Ok(Self {
            storage,
            pending: PendingTrie::default(),
            depth: 0,
        })
    }

    fn record(&self, id: u64) -> Result<TrieRecord, LatticeError> {
        if let Some(record) = self.pending.records.get(&id) {
            return Ok(record.clone());
        }
        self.storage
            .get_json(CF_TRIE_NODES, &TrieKey::new(id).to_bytes())?
            .ok_or_else(|| LatticeError::Invariant(format!("trie node {} is missing", id)))
    }

    fn child(&self, parent: u64, ch: char) -> Result<Option<u64>, LatticeError> {
        if let Some(&id) = self.pending.children.get(&(parent, ch)) {
            return Ok(Some(id));
        }
        match self.storage.get(
            CF_TRIE_CHILDREN,
            &ChildKey::new(parent, ch.to_string()).to_bytes(),
        )? {
            Some(bytes) => Ok(Some(decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    fn walk(&self, prefix: &str) -> Result<Option<u64>, LatticeError> {
        let mut current = ROOT_ID;
        for ch in prefix.chars() {
            match self.child(current, ch)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn insert_path(&mut self, pattern: &str) -> Result<u64, LatticeError> {
        let mut current = ROOT_ID;
        for ch in pattern.chars() {
            current = match self.child(current, ch)? {
                Some(next) => next,
                None => {
                    let id = self.storage.next_trie_id();
                    self.pending.records.insert(
                        id,
                        TrieRecord {
                            id,
                            parent: Some(current),
                            symbol: Some(ch),
                            terminal: false,
                            pattern: None,
                            markov_id: None,
                        },
                    );
                    self.pending.children.insert((current, ch), id);
                    self.pending.created += 1;
                    id
                }
            };
        }
        Ok(current)
    }

    fn stamp(&mut self, pattern: &str, markov_id: u64, replace: bool) -> Result<u64, LatticeError> {
        require_pattern(pattern)?;
        let terminal = self.insert_path(pattern)?;
        let mut record = self.record(terminal)?;

        let stamp = replace || record.markov_id.is_none();
        let changed = !record.terminal || (stamp && record.markov_id != Some(markov_id));
        if changed {
            record.terminal = true;
            record.pattern = Some(pattern.to_string());
            if stamp {
                record.markov_id = Some(markov_id);
            }
            self.pending.records.insert(terminal, record);
        }

        self.autocommit()?;
        Ok(terminal)
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

    fn drop_written(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        debug!(
            records = pending.records.len(),
            created = pending.created,
            "Committed trie batch"
        );
    }
}

impl Trie for RocksTrie {
    fn merge(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        self.stamp(pattern, markov_id, true)
    }

    fn claim(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        self.stamp(pattern, markov_id, false)
    }

    #[instrument(skip(self))]
    fn next_characters(&self, prefix: &str) -> Result<Vec<char>, LatticeError> {
        let Some(node) = self.walk(prefix)? else {
            return Ok(Vec::new());
        };

        let mut chars = BTreeSet::new();
        for (key, _) in self
            .storage
            .prefix_iterator(CF_TRIE_CHILDREN, &ChildKey::prefix(node))?
        {
            let key = ChildKey::from_bytes(&key)?;
            let ch = key.symbol.chars().next().ok_or_else(|| {
                StorageError::Key(format!("empty child symbol under trie node {}", node))
            })?;
            chars.insert(ch);
        }
        for (_, ch) in self.pending.children.keys().filter(|(parent, _)| *parent == node) {
            chars.insert(*ch);
        }
        Ok(chars.into_iter().collect())
    }

    fn lookup(&self, pattern: &str) -> Result<Option<TrieEntry>, LatticeError> {
        let Some(node) = self.walk(pattern)? else {
            return Ok(None);
        };
        let record = self.record(node)?;
        Ok(record.terminal.then(|| TrieEntry {
            node_id: node,
            markov_id: record.markov_id,
        }))
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        let stored = self
            .storage
            .prefix_iterator(CF_TRIE_NODES, TRIE_PREFIX)?
            .len();
        Ok((stored + self.pending.created) as u64)
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
        debug!(records = discarded.records.len(), "Rolled back trie batch");
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

//! Prefix tree over pattern characters.
//!
//! Every pattern key is spelled character by character from the root.
//! The node reached by the full spelling is terminal and stamped with the
//! id of the pattern's graph node. The trie is append-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tkn_storage::{Batch, Storage};

use crate::error::LatticeError;

/// What the trie knows about a terminal spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieEntry {
    /// Trie node id of the terminal node
    pub node_id: u64,
    /// Graph node id stamped on it
    pub markov_id: Option<u64>,
}

/// Character trie with graph-id stamps on terminal nodes.
pub trait Trie: Send {
    /// Index `pattern` and stamp its terminal node with `markov_id`,
    /// replacing any earlier stamp.
    ///
    /// Returns the terminal node id.
    fn merge(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError>;

    /// Index `pattern` and stamp it only if it carries no stamp yet.
    ///
    /// Used for raw symbols absorbed into a longer pattern, so that a
    /// symbol which is itself a pattern keeps its own id.
    fn claim(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError>;

    /// Children of the node spelled by `prefix`, in character order.
    ///
    /// Empty when the prefix is not in the trie.
    fn next_characters(&self, prefix: &str) -> Result<Vec<char>, LatticeError>;

    /// Terminal entry for an exact spelling.
    fn lookup(&self, pattern: &str) -> Result<Option<TrieEntry>, LatticeError>;

    /// Number of nodes, root included.
    fn node_count(&self) -> Result<u64, LatticeError>;

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

impl<T: Trie + ?Sized> Trie for Box<T> {
    fn merge(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        (**self).merge(pattern, markov_id)
    }

    fn claim(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        (**self).claim(pattern, markov_id)
    }

    fn next_characters(&self, prefix: &str) -> Result<Vec<char>, LatticeError> {
        (**self).next_characters(prefix)
    }

    fn lookup(&self, pattern: &str) -> Result<Option<TrieEntry>, LatticeError> {
        (**self).lookup(pattern)
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        (**self).node_count()
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

pub(crate) fn require_pattern(pattern: &str) -> Result<(), LatticeError> {
    if pattern.is_empty() {
        return Err(LatticeError::InvalidInput(
            "cannot index an empty pattern".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, usize>,
    terminal: bool,
    markov_id: Option<u64>,
}

/// Arena-backed in-memory trie. Node ids are arena indexes; 0 is the root.
#[derive(Debug)]
pub struct MemoryTrie {
    nodes: Vec<TrieNode>,
}

impl Default for MemoryTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    fn walk(&self, prefix: &str) -> Option<usize> {
        prefix
            .chars()
            .try_fold(0, |node, ch| self.nodes[node].children.get(&ch).copied())
    }

    fn insert_path(&mut self, pattern: &str) -> usize {
        let mut current = 0;
        for ch in pattern.chars() {
            current = match self.nodes[current].children.get(&ch) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children.insert(ch, child);
                    child
                }
            };
        }
        current
    }

    fn stamp(&mut self, pattern: &str, markov_id: u64, replace: bool) -> Result<u64, LatticeError> {
        require_pattern(pattern)?;
        let terminal = self.insert_path(pattern);
        let node = &mut self.nodes[terminal];
        node.terminal = true;
        if replace || node.markov_id.is_none() {
            node.markov_id = Some(markov_id);
        }
        Ok(terminal as u64)
    }
}

impl Trie for MemoryTrie {
    fn merge(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        self.stamp(pattern, markov_id, true)
    }

    fn claim(&mut self, pattern: &str, markov_id: u64) -> Result<u64, LatticeError> {
        self.stamp(pattern, markov_id, false)
    }

    fn next_characters(&self, prefix: &str) -> Result<Vec<char>, LatticeError> {
        Ok(self
            .walk(prefix)
            .map(|node| self.nodes[node].children.keys().copied().collect())
            .unwrap_or_default())
    }

    fn lookup(&self, pattern: &str) -> Result<Option<TrieEntry>, LatticeError> {
        Ok(self.walk(pattern).and_then(|node| {
            let record = &self.nodes[node];
            record.terminal.then(|| TrieEntry {
                node_id: node as u64,
                markov_id: record.markov_id,
            })
        }))
    }

    fn node_count(&self) -> Result<u64, LatticeError> {
        Ok(self.nodes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_returns_terminal_id() {
        let mut trie = MemoryTrie::new();
        let id = trie.merge("the", 1).unwrap();
        assert_eq!(trie.node_count().unwrap(), 4);
        assert_eq!(trie.merge("the", 1).unwrap(), id);
        assert_eq!(trie.node_count().unwrap(), 4);

        let entry = trie.lookup("the").unwrap().unwrap();
        assert_eq!(entry.node_id, id);
        assert_eq!(entry.markov_id, Some(1));
    }

    #[test]
    fn test_next_characters() {
        let mut trie = MemoryTrie::new();
        trie.merge("tok", 1).unwrap();
        trie.merge("the", 2).unwrap();
        trie.merge("to", 3).unwrap();

        assert_eq!(trie.next_characters("t").unwrap(), vec!['h', 'o']);
        assert_eq!(trie.next_characters("to").unwrap(), vec!['k']);
        assert_eq!(trie.next_characters("").unwrap(), vec!['t']);
        assert!(trie.next_characters("tok").unwrap().is_empty());
        assert!(trie.next_characters("x").unwrap().is_empty());
    }

    #[test]
    fn test_prefix_is_not_terminal() {
        let mut trie = MemoryTrie::new();
        trie.merge("abc", 1).unwrap();
        assert!(trie.lookup("ab").unwrap().is_none());
        assert!(trie.lookup("abcd").unwrap().is_none());
    }

    #[test]
    fn test_claim_does_not_override_stamp() {
        let mut trie = MemoryTrie::new();
        trie.merge("a", 1).unwrap();
        trie.claim("a", 7).unwrap();
        assert_eq!(trie.lookup("a").unwrap().unwrap().markov_id, Some(1));

        trie.claim("b", 7).unwrap();
        assert_eq!(trie.lookup("b").unwrap().unwrap().markov_id, Some(7));

        trie.merge("b", 2).unwrap();
        assert_eq!(trie.lookup("b").unwrap().unwrap().markov_id, Some(2));
    }

    #[test]
    fn test_sentinels_are_spelled_by_character() {
        let mut trie = MemoryTrie::new();
        trie.merge("<0>", 5).unwrap();
        assert_eq!(trie.next_characters("<").unwrap(), vec!['0']);
        assert_eq!(trie.lookup("<0>").unwrap().unwrap().markov_id, Some(5));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let mut trie = MemoryTrie::new();
        assert!(matches!(
            trie.merge("", 1),
            Err(LatticeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_boxed_trie() {
        let mut trie: Box<dyn Trie> = Box::new(MemoryTrie::new());
        trie.merge("é", 1).unwrap();
        assert_eq!(trie.next_characters("").unwrap(), vec!['é']);
    }
}

//! RocksDB wrapper for tkn storage.
//!
//! Provides:
//! - Database open with column family setup, on disk or in memory
//! - Atomic multi-record writes via [`Batch`]
//! - Single-key and prefix reads
//! - Monotonic id sequences for graph and trie nodes

use rocksdb::{Direction, Env, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_GRAPH_EDGES, CF_GRAPH_NODES, CF_GRAPH_TOKENS,
    CF_TRIE_CHILDREN, CF_TRIE_NODES,
};
use crate::error::StorageError;
use crate::keys::{NodeKey, TrieKey};

/// Storage location that selects the in-memory environment.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Virtual path used inside an in-memory environment.
const MEMORY_PATH: &str = "/tkn-memory";

/// A set of writes applied atomically by [`Storage::write`].
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
struct BatchOp {
    cf: &'static str,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cf: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp {
            cf,
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queue a JSON-encoded record.
    pub fn put_json<T: Serialize>(
        &mut self,
        cf: &'static str,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(cf, key, bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Main storage interface for the durable lattice
pub struct Storage {
    db: DB,
    /// Next graph node id (ids start at 1)
    node_sequence: AtomicU64,
    /// Next trie node id (0 is the root)
    trie_sequence: AtomicU64,
    location: String,
    /// In-memory environment; must outlive the DB.
    env: Option<Env>,
}

impl Storage {
    /// Open storage at the given directory, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);
        Self::open_with_env(path, None, path.to_string_lossy().to_string())
    }

    /// Open storage on a private in-memory environment.
    ///
    /// Nothing is written to disk; the data is gone once the storage is dropped.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        info!("Opening in-memory storage");
        let env = Env::mem_env()?;
        Self::open_with_env(
            Path::new(MEMORY_PATH),
            Some(env),
            MEMORY_LOCATION.to_string(),
        )
    }

    /// Open `:memory:` in memory, anything else as a directory path.
    pub fn open_location(location: &Path) -> Result<Self, StorageError> {
        if location == Path::new(MEMORY_LOCATION) {
            Self::open_in_memory()
        } else {
            Self::open(location)
        }
    }

    fn open_with_env(path: &Path, env: Option<Env>, location: String) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);
        if let Some(env) = &env {
            db_opts.set_env(env);
        }

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let node_sequence = Self::load_sequence(&db, CF_GRAPH_NODES, |key| {
            NodeKey::from_bytes(key).map(|k| k.id)
        })?;
        let trie_sequence = Self::load_sequence(&db, CF_TRIE_NODES, |key| {
            TrieKey::from_bytes(key).map(|k| k.id)
        })?;
        debug!(node_sequence, trie_sequence, "Recovered id sequences");

        Ok(Self {
            db,
            node_sequence: AtomicU64::new(node_sequence),
            trie_sequence: AtomicU64::new(trie_sequence),
            location,
            env,
        })
    }

    /// Find the next free id in a column family from its highest key.
    fn load_sequence(
        db: &DB,
        cf_name: &str,
        parse: impl Fn(&[u8]) -> Result<u64, StorageError>,
    ) -> Result<u64, StorageError> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))?;

        // Iterate in reverse to find highest key
        let mut iter = db.iterator_cf(&cf, IteratorMode::End);
        if let Some(result) = iter.next() {
            let (key, _) = result?;
            let highest = parse(&key)?;
            return highest.checked_add(1).ok_or_else(|| {
                StorageError::Invariant(format!("{} id sequence is exhausted", cf_name))
            });
        }
        Ok(1)
    }

    /// Allocate the next graph node id
    pub fn next_node_id(&self) -> u64 {
        self.node_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate the next trie node id
    pub fn next_trie_id(&self) -> u64 {
        self.trie_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// The location this storage was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_in_memory(&self) -> bool {
        self.env.is_some()
    }

    fn write_options() -> WriteOptions {
        // WAL stays on; fsync per write is skipped for throughput.
        let mut opts = WriteOptions::default();
        opts.set_sync(false);
        opts.disable_wal(false);
        opts
    }

    /// Apply a batch atomically.
    #[instrument(skip(self, batch), fields(ops = batch.len()))]
    pub fn write(&self, batch: Batch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut write_batch = WriteBatch::default();
        for op in &batch.ops {
            let handle = self
                .db
                .cf_handle(op.cf)
                .ok_or_else(|| StorageError::ColumnFamilyNotFound(op.cf.to_string()))?;
            write_batch.put_cf(&handle, &op.key, &op.value);
        }

        self.db.write_opt(write_batch, &Self::write_options())?;
        debug!("Committed batch of {} ops", batch.len());
        Ok(())
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    // ===== Generic Column Family Operations =====

    /// Get a value from a specific column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))?;
        let result = self.db.get_cf(&cf, key)?;
        Ok(result)
    }

    /// Get and decode a JSON record.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        match self.get(cf_name, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterate over entries with a given prefix in a column family.
    ///
    /// Returns (key, value) pairs in key order.
    #[allow(clippy::type_complexity)]
    pub fn prefix_iterator(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            // Stop if we've passed the prefix
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    // ===== Admin Operations =====

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        self.db.compact_range::<&[u8], &[u8]>(None, None);

        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(&cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Trigger compaction on a specific column family.
    pub fn compact_cf(&self, cf_name: &str) -> Result<(), StorageError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))?;
        info!(cf = %cf_name, "Starting compaction...");
        self.db.compact_range_cf::<&[u8], &[u8]>(&cf, None, None);
        info!(cf = %cf_name, "Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_GRAPH_NODES) {
            stats.node_count = self.count_cf_entries(cf)?;
        }

        if let Some(cf) = self.db.cf_handle(CF_GRAPH_TOKENS) {
            stats.token_count = self.count_cf_entries(cf)?;
        }

        if let Some(cf) = self.db.cf_handle(CF_GRAPH_EDGES) {
            stats.edge_count = self.count_cf_entries(cf)?;
        }

        if let Some(cf) = self.db.cf_handle(CF_TRIE_NODES) {
            stats.trie_node_count = self.count_cf_entries(cf)?;
        }

        if let Some(cf) = self.db.cf_handle(CF_TRIE_CHILDREN) {
            stats.trie_link_count = self.count_cf_entries(cf)?;
        }

        if !self.is_in_memory() {
            stats.disk_usage_bytes = self.get_disk_usage()?;
        }

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> Result<u64, StorageError> {
        let path: PathBuf = self.db.path().to_path_buf();
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of graph nodes
    pub node_count: u64,
    /// Number of entries in the token index
    pub token_count: u64,
    /// Number of distinct edges
    pub edge_count: u64,
    /// Number of trie nodes, root included
    pub trie_node_count: u64,
    /// Number of parent -> child trie links
    pub trie_link_count: u64,
    /// Total disk usage in bytes (0 in memory)
    pub disk_usage_bytes: u64,
}

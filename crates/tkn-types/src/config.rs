//! Configuration loading for tkn.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/tkn/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TknError;

/// Storage location that keeps the durable backend entirely in memory.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Default PageRank damping factor.
pub const DEFAULT_ALPHA: f64 = 0.85;

/// Default PageRank iteration count.
pub const DEFAULT_ITERATIONS: usize = 15;

/// Novelty cache strategy backing the LZ gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Grows without limit
    #[default]
    Unbounded,
    /// Fixed capacity with FIFO eviction
    Bounded {
        /// Maximum number of keys retained
        #[serde(default = "default_cache_max")]
        max: usize,
    },
}

fn default_cache_max() -> usize {
    65_536
}

/// Replay history retained by the output queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryStrategy {
    /// No history is kept
    #[default]
    None,
    /// Every delivered segment is kept
    Unbounded,
    /// Ring buffer of the most recent deliveries
    Bounded {
        /// Maximum number of segments retained
        #[serde(default = "default_history_max")]
        max_length: usize,
    },
}

fn default_history_max() -> usize {
    1024
}

/// Hub-scoring strategy used by `get_top_tokens`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerStrategy {
    /// log1p of the summed outgoing weight
    #[default]
    Degree,
    /// Weighted PageRank with a fixed iteration count
    PageRank {
        /// Damping factor
        #[serde(default = "default_alpha")]
        alpha: f64,
        /// Number of power iterations
        #[serde(default = "default_iterations")]
        iterations: usize,
    },
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_iterations() -> usize {
    DEFAULT_ITERATIONS
}

/// Which lattice backend to construct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pure in-memory trie and graph
    #[default]
    Memory,
    /// RocksDB-backed trie and graph
    Durable,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Novelty cache strategy
    #[serde(default)]
    pub cache: CacheStrategy,

    /// Queue history strategy
    #[serde(default)]
    pub history: HistoryStrategy,

    /// Hub-scoring strategy
    #[serde(default)]
    pub scorer: ScorerStrategy,

    /// Lattice backend
    #[serde(default)]
    pub backend: BackendKind,

    /// Durable storage location: `:memory:` or a directory path
    #[serde(default = "default_storage_location")]
    pub storage_location: String,

    /// Number of transitions merged per transaction while piping
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_storage_location() -> String {
    ProjectDirs::from("", "", "tkn")
        .map(|p| p.data_local_dir().join("lattice"))
        .unwrap_or_else(|| PathBuf::from("./lattice"))
        .to_string_lossy()
        .to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheStrategy::default(),
            history: HistoryStrategy::default(),
            scorer: ScorerStrategy::default(),
            backend: BackendKind::default(),
            storage_location: default_storage_location(),
            batch_size: default_batch_size(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/tkn/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (TKN_*, nested fields joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TknError> {
        let config_dir = ProjectDirs::from("", "", "tkn")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("cache.kind", "unbounded")
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("history.kind", "none")
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("scorer.kind", "degree")
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("backend", "memory")
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("storage_location", default_storage_location())
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(|e| TknError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TknError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // TKN_BATCH_SIZE, TKN_CACHE__KIND, TKN_CACHE__MAX, TKN_SCORER__ALPHA, ...
        builder = builder.add_source(
            Environment::with_prefix("TKN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TknError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TknError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TknError> {
        if let CacheStrategy::Bounded { max: 0 } = self.cache {
            return Err(TknError::Config(
                "bounded cache max must be a positive integer; got 0".to_string(),
            ));
        }
        if let HistoryStrategy::Bounded { max_length: 0 } = self.history {
            return Err(TknError::Config(
                "bounded history max_length must be a positive integer; got 0".to_string(),
            ));
        }
        if let ScorerStrategy::PageRank { alpha, iterations } = self.scorer {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(TknError::Config(format!(
                    "pagerank alpha must be in (0, 1), got {}",
                    alpha
                )));
            }
            if iterations == 0 {
                return Err(TknError::Config(
                    "pagerank iterations must be > 0".to_string(),
                ));
            }
        }
        if self.batch_size == 0 {
            return Err(TknError::Config("batch_size must be > 0".to_string()));
        }
        if self.storage_location.is_empty() {
            return Err(TknError::Config(
                "storage_location must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the durable backend should run on an in-memory environment.
    pub fn is_memory_location(&self) -> bool {
        self.storage_location == MEMORY_LOCATION
    }

    /// Expand ~ in storage_location to the actual home directory
    pub fn expanded_storage_location(&self) -> PathBuf {
        if let Some(rest) = self.storage_location.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.storage_location)
    }
}

/// Get user's home directory
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
}

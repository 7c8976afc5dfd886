//! Command implementations for the tkn binary.
//!
//! Handles:
//! - ingest: read files, segment them and pipe the segments into a lattice
//! - top / next / complete: queries against a stored lattice
//! - admin: storage statistics and compaction
//! - config: print the effective settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use tkn_lattice::{open_lattice, DynLattice, LatticeStats, PipeSummary};
use tkn_sequencer::{create_lz_sequencer, reader, SequencerOptions};
use tkn_storage::Storage;
use tkn_types::{BackendKind, RankedToken, Settings, Transition};

use crate::cli::AdminCommands;

/// Symbols pushed between cooperative yields while ingesting.
const YIELD_EVERY: usize = 256;

/// Outcome of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub symbols: usize,
    pub pipe: PipeSummary,
    pub lattice: LatticeStats,
    pub top: Vec<RankedToken>,
}

/// Load configuration and apply CLI overrides.
///
/// A `--db-path` selects the durable backend at that location.
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    db_path_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(db_path) = db_path_override {
        settings.storage_location = db_path.to_string();
        settings.backend = BackendKind::Durable;
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Segment `files` and index the segments.
///
/// The producer and the lattice run on the same task; the producer yields
/// periodically so the queue does not grow with the whole input.
pub async fn ingest(settings: &Settings, files: &[PathBuf], top: usize) -> Result<IngestReport> {
    let symbols = reader::files_symbols(files).context("Failed to read input files")?;
    let symbol_count = symbols.len();

    let mut sequencer = create_lz_sequencer(&SequencerOptions::from(settings))
        .context("Failed to create sequencer")?;
    let mut lattice = open_lattice(settings).context("Failed to open lattice")?;
    if settings.backend == BackendKind::Memory {
        info!("Memory backend: the lattice is discarded on exit");
    }

    let source = sequencer.read();
    let producer = async {
        for (index, symbol) in symbols.into_iter().enumerate() {
            sequencer.push(symbol);
            if index % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
        sequencer.close();
    };
    let ((), piped) = tokio::join!(producer, lattice.pipe(source));
    let pipe = piped.context("Failed to index segments")?;

    let top = lattice
        .get_top_tokens(top)
        .context("Failed to rank tokens")?;
    let stats = lattice.stats().context("Failed to read lattice stats")?;
    lattice.close().context("Failed to close lattice")?;

    info!(
        files = files.len(),
        symbols = symbol_count,
        segments = pipe.segments,
        "Ingest complete"
    );
    Ok(IngestReport {
        files: files.len(),
        symbols: symbol_count,
        pipe,
        lattice: stats,
        top,
    })
}

pub async fn handle_ingest(
    settings: &Settings,
    files: &[PathBuf],
    top: usize,
    json: bool,
) -> Result<()> {
    let report = ingest(settings, files, top).await?;
    if json {
        return print_json(&report);
    }

    println!(
        "Ingested {} file(s), {} symbols: {} segments, {} transitions",
        report.files, report.symbols, report.pipe.segments, report.pipe.transitions
    );
    println!(
        "Lattice: {} nodes, {} edges, {} trie nodes",
        report.lattice.nodes, report.lattice.edges, report.lattice.trie_nodes
    );
    print_ranked(&report.top);
    Ok(())
}

/// Open the lattice a previous `ingest` stored on disk.
fn open_stored_lattice(settings: &Settings) -> Result<DynLattice> {
    let path = stored_path(settings)?;
    let mut settings = settings.clone();
    settings.backend = BackendKind::Durable;
    settings.storage_location = path.to_string_lossy().to_string();
    open_lattice(&settings).context("Failed to open lattice")
}

fn stored_path(settings: &Settings) -> Result<PathBuf> {
    if settings.is_memory_location() {
        anyhow::bail!("Queries need an on-disk lattice; pass --db-path or set storage_location");
    }
    let path = settings.expanded_storage_location();
    if !path.exists() {
        anyhow::bail!(
            "No lattice at {}; run `tkn ingest` first",
            path.display()
        );
    }
    Ok(path)
}

pub fn top_tokens(settings: &Settings, limit: usize) -> Result<Vec<RankedToken>> {
    let mut lattice = open_stored_lattice(settings)?;
    let top = lattice.get_top_tokens(limit)?;
    lattice.close()?;
    Ok(top)
}

pub fn next_transitions(settings: &Settings, token: &str) -> Result<Vec<Transition>> {
    let lattice = open_stored_lattice(settings)?;
    Ok(lattice.get_next(token)?)
}

pub fn completions(settings: &Settings, prefix: &str) -> Result<Vec<char>> {
    let lattice = open_stored_lattice(settings)?;
    Ok(lattice.next_characters(prefix)?)
}

pub fn handle_top(settings: &Settings, limit: usize, json: bool) -> Result<()> {
    let top = top_tokens(settings, limit)?;
    if json {
        return print_json(&top);
    }
    print_ranked(&top);
    Ok(())
}

pub fn handle_next(settings: &Settings, token: &str, json: bool) -> Result<()> {
    let next = next_transitions(settings, token)?;
    if json {
        return print_json(&next);
    }
    if next.is_empty() {
        println!("No transitions from {:?}", token);
    }
    for transition in &next {
        println!("{:>8}  {:?}", transition.weight, transition.to);
    }
    Ok(())
}

pub fn handle_complete(settings: &Settings, prefix: &str, json: bool) -> Result<()> {
    let chars = completions(settings, prefix)?;
    if json {
        return print_json(&chars);
    }
    if chars.is_empty() {
        println!("No completions for {:?}", prefix);
    }
    for ch in chars {
        println!("{:?}", format!("{}{}", prefix, ch));
    }
    Ok(())
}

/// Handle admin commands.
pub fn handle_admin(settings: &Settings, command: AdminCommands) -> Result<()> {
    let path = stored_path(settings)?;
    let storage = open_storage(&path)?;

    match command {
        AdminCommands::Stats { json } => {
            let stats = storage.get_stats().context("Failed to read storage stats")?;
            if json {
                return print_json(&stats);
            }
            println!("Storage: {}", path.display());
            println!("  Graph nodes:   {}", stats.node_count);
            println!("  Graph tokens:  {}", stats.token_count);
            println!("  Graph edges:   {}", stats.edge_count);
            println!("  Trie nodes:    {}", stats.trie_node_count);
            println!("  Trie links:    {}", stats.trie_link_count);
            println!("  Disk usage:    {} bytes", stats.disk_usage_bytes);
        }
        AdminCommands::Compact { cf } => {
            match cf.as_deref() {
                Some(cf) => storage
                    .compact_cf(cf)
                    .with_context(|| format!("Failed to compact column family {}", cf))?,
                None => storage.compact().context("Failed to compact storage")?,
            }
            println!("Compaction complete");
        }
    }
    Ok(())
}

fn open_storage(path: &Path) -> Result<Storage> {
    Storage::open(path).with_context(|| format!("Failed to open storage at {}", path.display()))
}

/// Print the effective settings as TOML.
pub fn show_config(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_ranked(tokens: &[RankedToken]) {
    for (rank, token) in tokens.iter().enumerate() {
        println!("{:>3}. {:<24} {:.4}", rank + 1, format!("{:?}", token.pattern), token.confidence);
    }
}

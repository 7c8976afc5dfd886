//! End-to-end test infrastructure for tkn.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full symbols -> sequencer -> lattice -> query pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;

use tkn_lattice::{DegreeScorer, DurableLattice, Lattice};
use tkn_sequencer::{create_lz_sequencer, reader, SequencerOptions};
use tkn_storage::Storage;
use tkn_types::{BackendKind, Segment, Settings, Symbol};

/// Shared test harness for E2E tests.
///
/// Owns a temp directory holding input files and the durable lattice.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Directory of the durable lattice
    pub lattice_path: PathBuf,
    /// Directory for input files
    pub input_dir: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with a temp directory.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let lattice_path = temp_dir.path().join("lattice");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        Self {
            _temp_dir: temp_dir,
            lattice_path,
            input_dir,
        }
    }

    /// Settings selecting the durable backend in this harness.
    pub fn durable_settings(&self) -> Settings {
        Settings {
            backend: BackendKind::Durable,
            storage_location: self.lattice_path.to_string_lossy().to_string(),
            ..Settings::default()
        }
    }

    /// Open the harness storage directly.
    pub fn open_storage(&self) -> Arc<Storage> {
        Arc::new(Storage::open(&self.lattice_path).expect("Failed to open test storage"))
    }

    /// Open a durable lattice with the degree scorer.
    pub fn durable_lattice(&self) -> DurableLattice {
        Lattice::durable(self.open_storage(), Box::new(DegreeScorer))
            .expect("Failed to open durable lattice")
    }

    /// Write an input file and return its path.
    pub fn write_input(&self, name: &str, text: &str) -> PathBuf {
        let path = self.input_dir.join(name);
        std::fs::write(&path, text).expect("Failed to write input file");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Run symbols through a default LZ sequencer and collect every segment,
/// including the flushed tail.
pub fn segment_symbols<I, S>(symbols: I) -> Vec<Segment>
where
    I: IntoIterator<Item = S>,
    S: Into<Symbol>,
{
    let mut sequencer =
        create_lz_sequencer(&SequencerOptions::default()).expect("Failed to create sequencer");
    for symbol in symbols {
        sequencer.push(symbol);
    }
    sequencer.close();
    futures::executor::block_on(sequencer.read().collect())
}

/// Segment a text one NFC character at a time.
pub fn segment_text(text: &str) -> Vec<Segment> {
    segment_symbols(reader::symbols(text))
}

/// Keys of segments, in order.
pub fn keys(segments: &[Segment]) -> Vec<&str> {
    segments.iter().map(|s| s.key.as_str()).collect()
}

/// A short English corpus with plenty of repeated substrings.
pub const CORPUS: &str = "the cat sat on the mat. the cat ate the rat. \
    the rat sat on the cat. that is the thing about the theory of the three \
    thin thieves: they think the thought through.";

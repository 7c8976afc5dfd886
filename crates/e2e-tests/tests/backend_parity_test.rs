//! Memory and durable backends must build the same index.
//!
//! Both backends implement the same trie and graph contracts, so piping
//! identical segments must give identical transitions, completions and
//! rankings, whatever the scorer and batch size.

use futures::stream;
use pretty_assertions::assert_eq;

use e2e_tests::{keys, segment_text, TestHarness, CORPUS};
use tkn_lattice::{open_lattice, DegreeScorer, Lattice, PageRankScorer};
use tkn_types::{BackendKind, ScorerStrategy, DEFAULT_ALPHA, DEFAULT_ITERATIONS};

#[tokio::test]
async fn test_degree_backends_agree() {
    let harness = TestHarness::new();
    let segments = segment_text(CORPUS);

    let mut memory = Lattice::in_memory(Box::new(DegreeScorer));
    let mut durable = harness.durable_lattice().with_batch_size(5);
    memory.pipe(stream::iter(segments.clone())).await.unwrap();
    durable.pipe(stream::iter(segments.clone())).await.unwrap();

    assert_eq!(memory.stats().unwrap(), durable.stats().unwrap());
    for key in keys(&segments) {
        assert_eq!(memory.get_next(key).unwrap(), durable.get_next(key).unwrap());
        assert_eq!(memory.lookup(key).unwrap(), durable.lookup(key).unwrap());
    }
    for prefix in ["", "t", "th", "the", "ca", "<"] {
        assert_eq!(
            memory.next_characters(prefix).unwrap(),
            durable.next_characters(prefix).unwrap(),
            "prefix {:?}",
            prefix
        );
    }
    assert_eq!(
        memory.get_top_tokens(10).unwrap(),
        durable.get_top_tokens(10).unwrap()
    );
}

#[tokio::test]
async fn test_pagerank_backends_agree() {
    let harness = TestHarness::new();
    let segments = segment_text(CORPUS);

    let mut memory = Lattice::in_memory(Box::new(PageRankScorer::default()));
    let mut durable = Lattice::durable(harness.open_storage(), Box::new(PageRankScorer::default()))
        .unwrap();
    memory.pipe(stream::iter(segments.clone())).await.unwrap();
    durable.pipe(stream::iter(segments)).await.unwrap();

    let from_memory = memory.get_top_tokens(8).unwrap();
    let from_durable = durable.get_top_tokens(8).unwrap();
    assert_eq!(from_memory.len(), 8);
    for (m, d) in from_memory.iter().zip(&from_durable) {
        assert_eq!(m.pattern, d.pattern);
        assert!((m.confidence - d.confidence).abs() < 1e-12);
    }
    assert!((from_memory[0].confidence - 1.0).abs() < 1e-12);

    // No new data: the ranking is stable
    assert_eq!(durable.get_top_tokens(8).unwrap(), from_durable);
}

#[tokio::test]
async fn test_durable_scores_survive_reopen() {
    let harness = TestHarness::new();
    let mut settings = harness.durable_settings();
    settings.scorer = ScorerStrategy::PageRank {
        alpha: DEFAULT_ALPHA,
        iterations: DEFAULT_ITERATIONS,
    };

    let top = {
        let mut lattice = open_lattice(&settings).unwrap();
        lattice
            .pipe(stream::iter(segment_text(CORPUS)))
            .await
            .unwrap();
        let top = lattice.get_top_tokens(3).unwrap();
        lattice.close().unwrap();
        top
    };

    let lattice = open_lattice(&settings).unwrap();
    let node = lattice.graph().get_node(&top[0].pattern).unwrap().unwrap();
    assert!((node.hub_score - top[0].confidence).abs() < 1e-9);
}

#[tokio::test]
async fn test_in_memory_durable_location() {
    let mut settings = TestHarness::new().durable_settings();
    settings.storage_location = ":memory:".to_string();
    assert_eq!(settings.backend, BackendKind::Durable);

    let mut lattice = open_lattice(&settings).unwrap();
    let segments = segment_text("banana bandana");
    lattice.pipe(stream::iter(segments.clone())).await.unwrap();

    let mut memory = Lattice::in_memory(Box::new(DegreeScorer));
    memory.pipe(stream::iter(segments)).await.unwrap();
    assert_eq!(lattice.stats().unwrap(), memory.stats().unwrap());
    lattice.close().unwrap();
}

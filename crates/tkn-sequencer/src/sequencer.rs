//! Segmentation state machine.
//!
//! The sequencer grows a candidate one symbol at a time. For each symbol
//! it forms `candidate_key + symbol` and asks every gate, in order,
//! whether to continue. If all gates agree the candidate absorbs the
//! symbol's key. Otherwise the candidate accumulated so far is emitted as
//! a segment and the symbol starts the next candidate. The candidate is
//! only emitted when its key is non-empty, so a cold start never produces
//! an empty segment.

use std::time::{Duration, Instant};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tkn_types::{Key, Segment, Symbol};

use crate::gate::{Gate, GateSnapshot};
use crate::queue::Queue;

/// Diagnostics for a sequencer and its gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerSnapshot {
    pub name: String,
    /// Milliseconds since the first push (0 before any input)
    pub duration_ms: u64,
    pub gates: Vec<GateSnapshot>,
}

pub struct Sequencer {
    name: String,
    gates: Vec<Box<dyn Gate>>,
    queue: Queue,
    ongoing_sequence: Vec<Symbol>,
    ongoing_key: Key,
    started_at: Option<Instant>,
}

impl Sequencer {
    /// Create a sequencer over the given gates, emitting into `queue`.
    pub fn new(gates: Vec<Box<dyn Gate>>, queue: Queue) -> Self {
        Self::with_name("Sequencer", gates, queue)
    }

    pub fn with_name(name: impl Into<String>, gates: Vec<Box<dyn Gate>>, queue: Queue) -> Self {
        Self {
            name: name.into(),
            gates,
            queue,
            ongoing_sequence: Vec::new(),
            ongoing_key: Key::new(),
            started_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feed one symbol.
    ///
    /// Empty symbols are ignored.
    pub fn push(&mut self, symbol: impl Into<Symbol>) {
        let symbol = symbol.into();
        if symbol.is_empty() {
            trace!("Ignoring empty symbol");
            return;
        }
        self.started_at.get_or_insert_with(Instant::now);

        let candidate = format!("{}{}", self.ongoing_key, symbol);
        // First refusal wins; later gates do not see this key.
        let accepted = self
            .gates
            .iter_mut()
            .all(|gate| gate.evaluate(&candidate, &self.ongoing_key));

        trace!(symbol = %symbol, candidate = %candidate, accepted, "Sequencer push");

        if accepted {
            self.ongoing_key = candidate;
        } else {
            if !self.ongoing_key.is_empty() {
                self.emit();
            }
            self.ongoing_key = symbol.clone();
        }
        self.ongoing_sequence.push(symbol);
    }

    /// Force-emit the current candidate.
    ///
    /// Returns true if a segment was emitted. The candidate is empty
    /// afterwards either way.
    pub fn flush(&mut self) -> bool {
        if self.ongoing_sequence.is_empty() {
            self.ongoing_key.clear();
            return false;
        }
        self.emit();
        true
    }

    fn emit(&mut self) {
        let sequence = std::mem::take(&mut self.ongoing_sequence);
        let key = std::mem::take(&mut self.ongoing_key);
        debug!(key = %key, symbols = sequence.len(), "Emitting segment");
        self.queue.push(Segment::with_key(sequence, key));
    }

    /// Clear the candidate and every gate. The queue and its history are
    /// left untouched.
    pub fn reset(&mut self) {
        self.ongoing_sequence.clear();
        self.ongoing_key.clear();
        for gate in &mut self.gates {
            gate.reset();
        }
        self.started_at = None;
        debug!(name = %self.name, "Sequencer reset");
    }

    /// Flush the candidate and close the queue, ending every reader
    /// stream once the buffer drains.
    pub fn close(&mut self) {
        self.flush();
        self.queue.close();
    }

    /// Stream of emitted segments.
    pub fn read(&self) -> impl Stream<Item = Segment> + Send + 'static {
        self.queue.read()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Delivered segments retained by the queue history.
    pub fn history(&self) -> Vec<Segment> {
        self.queue.history()
    }

    /// Symbols of the in-progress candidate.
    pub fn candidate(&self) -> &[Symbol] {
        &self.ongoing_sequence
    }

    pub fn candidate_key(&self) -> &str {
        &self.ongoing_key
    }

    /// Time since the first push after construction or reset.
    pub fn duration(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            name: self.name.clone(),
            duration_ms: self.duration().as_millis() as u64,
            gates: self.gates.iter().map(|gate| gate.snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{Bounded, Unbounded};
    use crate::gate::LzGate;
    use futures::StreamExt;
    use proptest::prelude::*;

    fn lz_sequencer() -> Sequencer {
        Sequencer::new(vec![Box::new(LzGate::new(Box::new(Unbounded::new())))], Queue::new())
    }

    fn drain(sequencer: &mut Sequencer) -> Vec<Segment> {
        sequencer.queue().close();
        futures::executor::block_on(sequencer.read().collect())
    }

    fn run(input: &[String]) -> (Vec<Segment>, Vec<Symbol>) {
        let mut sequencer = lz_sequencer();
        for symbol in input {
            sequencer.push(symbol.as_str());
        }
        let candidate = sequencer.candidate().to_vec();
        (drain(&mut sequencer), candidate)
    }

    /// Gate that refuses everything and counts how often it was asked.
    struct Refuse(u64);

    impl Gate for Refuse {
        fn evaluate(&mut self, _current: &str, _previous: &str) -> bool {
            self.0 += 1;
            false
        }

        fn reset(&mut self) {
            self.0 = 0;
        }

        fn snapshot(&self) -> GateSnapshot {
            GateSnapshot {
                name: "Refuse".to_string(),
                ingested: self.0,
                pass_rate: 0.0,
                custom_metrics: Default::default(),
            }
        }
    }

    #[test]
    fn test_repeated_pattern_grows() {
        let mut sequencer = lz_sequencer();
        for symbol in ["a", "b", "a", "b", "a", "b", "c"] {
            sequencer.push(symbol);
        }
        assert_eq!(sequencer.candidate(), ["c"]);
        assert_eq!(sequencer.candidate_key(), "c");

        let segments = drain(&mut sequencer);
        let emitted: Vec<(Vec<Symbol>, Key)> = segments
            .into_iter()
            .map(|s| (s.sequence, s.key))
            .collect();
        assert_eq!(
            emitted,
            vec![
                (vec!["a".to_string()], "a".to_string()),
                (vec!["b".to_string()], "b".to_string()),
                (vec!["a".to_string(), "b".to_string()], "ab".to_string()),
                (vec!["a".to_string(), "b".to_string()], "ab".to_string()),
            ]
        );
    }

    #[test]
    fn test_first_symbol_never_emits() {
        let mut sequencer = lz_sequencer();
        sequencer.push("a");
        assert!(sequencer.queue().is_empty());
        assert_eq!(sequencer.candidate_key(), "a");
    }

    #[test]
    fn test_flush_emits_extending_candidate() {
        let mut sequencer = lz_sequencer();
        for symbol in ["a", "b", "a", "b"] {
            sequencer.push(symbol);
        }
        // "ab" is known, so the candidate is still extending
        assert_eq!(sequencer.candidate_key(), "ab");
        let before = sequencer.queue().len();

        assert!(sequencer.flush());
        assert_eq!(sequencer.queue().len(), before + 1);
        assert!(sequencer.candidate().is_empty());
        assert_eq!(sequencer.candidate_key(), "");

        let segments = drain(&mut sequencer);
        let last = segments.last().unwrap();
        assert_eq!(last.key, "ab");
        assert_eq!(last.sequence, vec!["a", "b"]);

        assert!(!sequencer.flush());
    }

    #[test]
    fn test_empty_symbol_is_ignored() {
        let mut sequencer = lz_sequencer();
        sequencer.push("");
        assert!(sequencer.candidate().is_empty());
        assert_eq!(sequencer.snapshot().gates[0].ingested, 0);
        assert_eq!(sequencer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_sentinels_are_opaque_symbols() {
        let mut sequencer = lz_sequencer();
        for symbol in ["a", "<0>", "a", "<0>"] {
            sequencer.push(symbol);
        }
        sequencer.flush();
        let keys: Vec<Key> = drain(&mut sequencer).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["a", "<0>", "a<0>"]);
    }

    #[test]
    fn test_without_gates_everything_extends() {
        let mut sequencer = Sequencer::new(Vec::new(), Queue::new());
        for symbol in ["x", "y", "z"] {
            sequencer.push(symbol);
        }
        assert!(sequencer.queue().is_empty());
        sequencer.flush();
        let segments = drain(&mut sequencer);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].key, "xyz");
    }

    #[test]
    fn test_first_refusal_short_circuits() {
        let mut sequencer = Sequencer::new(
            vec![
                Box::new(Refuse(0)),
                Box::new(LzGate::new(Box::new(Unbounded::new()))),
            ],
            Queue::new(),
        );
        sequencer.push("a");
        sequencer.push("b");

        let snapshot = sequencer.snapshot();
        assert_eq!(snapshot.gates[0].ingested, 2);
        assert_eq!(snapshot.gates[1].ingested, 0);
    }

    #[test]
    fn test_reset_clears_gates_but_keeps_queue() {
        let mut sequencer = lz_sequencer();
        for symbol in ["a", "b", "a", "b"] {
            sequencer.push(symbol);
        }
        let queued = sequencer.queue().len();
        sequencer.reset();

        assert!(sequencer.candidate().is_empty());
        assert_eq!(sequencer.queue().len(), queued);
        let snapshot = sequencer.snapshot();
        assert_eq!(snapshot.gates[0].ingested, 0);
        assert_eq!(snapshot.gates[0].custom_metrics["cache_utilization"], 0.0);
        assert_eq!(snapshot.duration_ms, 0);
    }

    #[test]
    fn test_snapshot_reports_gate_metrics() {
        let mut sequencer = Sequencer::with_name(
            "bounded",
            vec![Box::new(LzGate::new(Box::new(Bounded::new(2).unwrap())))],
            Queue::new(),
        );
        for symbol in ["a", "b", "c", "d"] {
            sequencer.push(symbol);
        }
        let snapshot = sequencer.snapshot();
        assert_eq!(snapshot.name, "bounded");
        assert_eq!(snapshot.gates.len(), 1);
        assert_eq!(snapshot.gates[0].name, "LZGate");
        assert_eq!(snapshot.gates[0].ingested, 4);
        assert_eq!(snapshot.gates[0].custom_metrics["cache_utilization"], 2.0);
    }

    #[tokio::test]
    async fn test_concurrent_reader_sees_every_segment() {
        let mut sequencer = lz_sequencer();
        let reader = tokio::spawn(sequencer.read().collect::<Vec<Segment>>());

        let text = "the cat and the hat and the bat";
        for ch in text.chars() {
            sequencer.push(ch.to_string());
            tokio::task::yield_now().await;
        }
        sequencer.close();

        let segments = reader.await.unwrap();
        let joined: String = segments.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_push_after_close_does_not_panic() {
        let mut sequencer = lz_sequencer();
        sequencer.push("a");
        sequencer.close();
        sequencer.push("b");
        sequencer.push("c");
        assert!(sequencer.queue().is_closed());
    }

    proptest! {
        #[test]
        fn prop_segmentation_is_deterministic(
            input in proptest::collection::vec("[a-d]|<[0-2]>", 0..120),
        ) {
            let first = run(&input);
            let second = run(&input);
            prop_assert_eq!(first, second);

            // Same input after reset on a reused sequencer
            let mut sequencer = lz_sequencer();
            for symbol in &input {
                sequencer.push(symbol.as_str());
            }
            sequencer.flush();
            sequencer.reset();
            let before = sequencer.queue().len();
            for symbol in &input {
                sequencer.push(symbol.as_str());
            }
            let replay: Vec<Segment> = drain(&mut sequencer).split_off(before);
            prop_assert_eq!(replay, run(&input).0);
        }

        #[test]
        fn prop_no_empty_emission(
            input in proptest::collection::vec("[a-c]{0,2}", 0..120),
        ) {
            let (segments, _) = run(&input);
            for segment in &segments {
                prop_assert!(!segment.key.is_empty());
                prop_assert!(!segment.sequence.is_empty());
                prop_assert_eq!(&segment.key, &segment.sequence.concat());
            }
        }

        #[test]
        fn prop_segments_cover_input(
            input in proptest::collection::vec("[a-e]", 0..120),
        ) {
            let (segments, candidate) = run(&input);
            let mut replayed: Vec<Symbol> = segments.into_iter().flat_map(|s| s.sequence).collect();
            replayed.extend(candidate);
            prop_assert_eq!(replayed, input);
        }
    }
}

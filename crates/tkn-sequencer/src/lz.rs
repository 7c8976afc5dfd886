//! Factory for the standard LZ sequencer.

use tkn_types::{CacheStrategy, HistoryStrategy, Settings, TknError};

use crate::dictionary;
use crate::gate::LzGate;
use crate::queue::Queue;
use crate::sequencer::Sequencer;

/// Construction options for [`create_lz_sequencer`].
#[derive(Debug, Clone, Default)]
pub struct SequencerOptions {
    /// Sequencer name shown in snapshots
    pub name: Option<String>,
    /// Novelty cache backing the LZ gate
    pub cache: CacheStrategy,
    /// Queue history
    pub history: HistoryStrategy,
}

impl From<&Settings> for SequencerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            name: None,
            cache: settings.cache,
            history: settings.history,
        }
    }
}

/// Build a sequencer with a single LZ gate and a fresh queue.
///
/// # Errors
///
/// Returns `TknError::Config` for a zero-capacity cache or history.
pub fn create_lz_sequencer(options: &SequencerOptions) -> Result<Sequencer, TknError> {
    let cache = dictionary::from_strategy(options.cache)?;
    let queue = Queue::from_strategy(options.history)?;
    let gate = LzGate::new(cache);

    let name = options.name.as_deref().unwrap_or("LZSequencer");
    Ok(Sequencer::with_name(name, vec![Box::new(gate)], queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default() {
        let sequencer = create_lz_sequencer(&SequencerOptions::default()).unwrap();
        let snapshot = sequencer.snapshot();
        assert_eq!(snapshot.name, "LZSequencer");
        assert_eq!(snapshot.gates.len(), 1);
        assert_eq!(snapshot.gates[0].name, "LZGate");
    }

    #[test]
    fn test_create_from_settings() {
        let settings = Settings {
            cache: CacheStrategy::Bounded { max: 8 },
            history: HistoryStrategy::Unbounded,
            ..Settings::default()
        };
        let mut options = SequencerOptions::from(&settings);
        options.name = Some("files".to_string());

        let mut sequencer = create_lz_sequencer(&options).unwrap();
        assert_eq!(sequencer.name(), "files");
        for symbol in ["a", "b", "c"] {
            sequencer.push(symbol);
        }
        assert_eq!(sequencer.queue().len(), 2);
    }

    #[test]
    fn test_invalid_options_fail_fast() {
        let options = SequencerOptions {
            cache: CacheStrategy::Bounded { max: 0 },
            ..SequencerOptions::default()
        };
        assert!(matches!(create_lz_sequencer(&options), Err(TknError::Config(_))));

        let options = SequencerOptions {
            history: HistoryStrategy::Bounded { max_length: 0 },
            ..SequencerOptions::default()
        };
        assert!(create_lz_sequencer(&options).is_err());
    }
}

//! Symbol extraction from text.
//!
//! Text is normalized to NFC and split into Unicode scalar values, so a
//! precomposed and a decomposed spelling of the same character produce
//! the same symbol.

use std::path::Path;

use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use tkn_types::{sentinel, Symbol, TknError};

/// NFC-normalized symbols of `text`, one per character.
pub fn symbols(text: &str) -> impl Iterator<Item = Symbol> + '_ {
    text.nfc().map(String::from)
}

/// Read a UTF-8 file and return its NFC-normalized symbols.
pub fn file_symbols(path: impl AsRef<Path>) -> Result<Vec<Symbol>, TknError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        TknError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    let symbols: Vec<Symbol> = symbols(&text).collect();
    debug!(path = %path.display(), symbols = symbols.len(), "Read file symbols");
    Ok(symbols)
}

/// Symbols of several files, each file followed by its `<N>` sentinel.
pub fn files_symbols<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Symbol>, TknError> {
    let mut all = Vec::new();
    for (index, path) in paths.iter().enumerate() {
        all.extend(file_symbols(path)?);
        all.push(sentinel(index));
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_symbols_are_characters() {
        let collected: Vec<Symbol> = symbols("héllo").collect();
        assert_eq!(collected, vec!["h", "é", "l", "l", "o"]);
    }

    #[test]
    fn test_symbols_are_nfc() {
        // e + combining acute accent
        let decomposed = "e\u{0301}";
        let collected: Vec<Symbol> = symbols(decomposed).collect();
        assert_eq!(collected, vec!["\u{00e9}"]);
    }

    #[test]
    fn test_file_symbols() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "ab").unwrap();
        let symbols = file_symbols(file.path()).unwrap();
        assert_eq!(symbols, vec!["a", "b"]);
    }

    #[test]
    fn test_files_are_separated_by_sentinels() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        write!(first, "x").unwrap();
        write!(second, "y").unwrap();

        let symbols = files_symbols(&[first.path(), second.path()]).unwrap();
        assert_eq!(symbols, vec!["x", "<0>", "y", "<1>"]);
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let result = file_symbols("/definitely/not/here.txt");
        assert!(matches!(result, Err(TknError::InvalidInput(_))));
    }
}

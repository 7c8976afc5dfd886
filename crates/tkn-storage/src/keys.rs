//! Key encoding and decoding for storage layer.
//!
//! Numeric ids are zero-padded to 20 digits so that lexicographic byte
//! order equals numeric order. This lets the highest id be found by
//! iterating from the end, and lets all edges of one node be read with a
//! single prefix scan.
//!
//! Formats:
//! - `node:{id:020}`
//! - `tok:{token}`
//! - `edge:{from:020}:{to:020}`
//! - `trie:{id:020}`
//! - `child:{parent:020}:{symbol}`

use crate::error::StorageError;

fn utf8(bytes: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(bytes).map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
}

fn parse_id(s: &str, what: &str) -> Result<u64, StorageError> {
    s.parse()
        .map_err(|e| StorageError::Key(format!("Invalid {}: {}", what, e)))
}

/// Encode a counter or id value.
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a value written by [`encode_u64`].
pub fn decode_u64(bytes: &[u8]) -> Result<u64, StorageError> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        StorageError::Serialization(format!("expected 8-byte integer, got {} bytes", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(array))
}

/// Key for graph node records
/// Format: node:{id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKey {
    pub id: u64,
}

impl NodeKey {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("node:{:020}", self.id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = utf8(bytes)?;
        let id = s
            .strip_prefix("node:")
            .ok_or_else(|| StorageError::Key(format!("Invalid node key format: {}", s)))?;
        Ok(Self {
            id: parse_id(id, "node id")?,
        })
    }
}

/// Key for the token -> node id index
/// Format: tok:{token}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKey<'a> {
    pub token: &'a str,
}

impl<'a> TokenKey<'a> {
    pub fn new(token: &'a str) -> Self {
        Self { token }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("tok:{}", self.token).into_bytes()
    }
}

/// Key for edge weights
/// Format: edge:{from:020}:{to:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeKey {
    pub from: u64,
    pub to: u64,
}

impl EdgeKey {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("edge:{:020}:{:020}", self.from, self.to).into_bytes()
    }

    /// Prefix covering every outgoing edge of `from`
    pub fn prefix(from: u64) -> Vec<u8> {
        format!("edge:{:020}:", from).into_bytes()
    }

    /// Prefix covering every edge
    pub fn all_prefix() -> Vec<u8> {
        b"edge:".to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = utf8(bytes)?;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "edge" {
            return Err(StorageError::Key(format!("Invalid edge key format: {}", s)));
        }
        Ok(Self {
            from: parse_id(parts[1], "edge source")?,
            to: parse_id(parts[2], "edge target")?,
        })
    }
}

/// Key for trie node records
/// Format: trie:{id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieKey {
    pub id: u64,
}

impl TrieKey {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("trie:{:020}", self.id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = utf8(bytes)?;
        let id = s
            .strip_prefix("trie:")
            .ok_or_else(|| StorageError::Key(format!("Invalid trie key format: {}", s)))?;
        Ok(Self {
            id: parse_id(id, "trie id")?,
        })
    }
}

/// Key for trie child links
/// Format: child:{parent:020}:{symbol}
///
/// The symbol is everything after the second separator and may itself
/// contain `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildKey {
    pub parent: u64,
    pub symbol: String,
}

impl ChildKey {
    pub fn new(parent: u64, symbol: impl Into<String>) -> Self {
        Self {
            parent,
            symbol: symbol.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("child:{:020}:{}", self.parent, self.symbol).into_bytes()
    }

    /// Prefix covering every child of `parent`
    pub fn prefix(parent: u64) -> Vec<u8> {
        format!("child:{:020}:", parent).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = utf8(bytes)?;
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("child"), Some(parent), Some(symbol)) => Ok(Self {
                parent: parse_id(parent, "trie parent")?,
                symbol: symbol.to_string(),
            }),
            _ => Err(StorageError::Key(format!("Invalid child key format: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_roundtrip() {
        let key = NodeKey::new(42);
        assert_eq!(key.to_bytes(), b"node:00000000000000000042".to_vec());
        assert_eq!(NodeKey::from_bytes(&key.to_bytes()).unwrap(), key);
    }

    #[test]
    fn test_node_key_lexicographic_order() {
        assert!(NodeKey::new(9).to_bytes() < NodeKey::new(10).to_bytes());
        assert!(NodeKey::new(99).to_bytes() < NodeKey::new(1000).to_bytes());
    }

    #[test]
    fn test_edge_key_prefix() {
        let key = EdgeKey::new(3, 17);
        assert!(key.to_bytes().starts_with(&EdgeKey::prefix(3)));
        assert!(!key.to_bytes().starts_with(&EdgeKey::prefix(1)));
        assert_eq!(EdgeKey::from_bytes(&key.to_bytes()).unwrap(), key);
    }

    #[test]
    fn test_child_key_symbol_may_contain_separator() {
        let key = ChildKey::new(7, ":");
        let decoded = ChildKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded.parent, 7);
        assert_eq!(decoded.symbol, ":");

        let sentinel = ChildKey::new(0, "<12>");
        assert_eq!(ChildKey::from_bytes(&sentinel.to_bytes()).unwrap(), sentinel);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(NodeKey::from_bytes(b"edge:1").is_err());
        assert!(EdgeKey::from_bytes(b"edge:1").is_err());
        assert!(TrieKey::from_bytes(b"trie:abc").is_err());
        assert!(ChildKey::from_bytes(b"child:1").is_err());
    }

    #[test]
    fn test_u64_values() {
        assert_eq!(decode_u64(&encode_u64(12345)).unwrap(), 12345);
        assert!(decode_u64(b"short").is_err());
    }
}

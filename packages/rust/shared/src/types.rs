//! Core domain types shared by the pipeline, index, and storage crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Open, string-keyed metadata attached to sources and entries.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Reserved separator between a rendered resource path and its version.
pub const VERSION_SEPARATOR: char = '~';

/// URI scheme every resource template and resource URI uses.
pub const RESOURCE_SCHEME: &str = "docs://";

/// Hex-encoded SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// EntryId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for entry identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Generate a new time-sortable entry identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One stored documentation unit.
///
/// `path` is the rendered, version-qualified resource path
/// (e.g. `docs://api/endpoint~1.2.0`). Content is post-filter and is never
/// mutated once the entry is indexed; updates replace the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier, unique across the index's lifetime.
    pub id: EntryId,
    /// Canonical resource path.
    pub path: String,
    /// Filtered content.
    pub content: String,
    /// Source URL, fetch time, content hash, and anything providers attach.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Entry {
    /// Create an entry with empty metadata.
    pub fn new(id: EntryId, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insert.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_sha256_hex() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn entry_id_roundtrip() {
        let id = EntryId::new();
        let s = id.to_string();
        let parsed: EntryId = s.parse().expect("parse EntryId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn entry_ids_are_time_sortable() {
        let a = EntryId::new();
        let b = EntryId::new();
        assert!(a <= b);
    }

    #[test]
    fn entry_serialization() {
        let entry = Entry::new(EntryId::new(), "docs://api/endpoint~1.2.0", "# Endpoint\n")
            .with_meta("source_ref", "https://example.com/endpoint")
            .with_meta("content_len", 11);

        let json = serde_json::to_string(&entry).expect("serialize");
        let parsed: Entry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, entry);
        assert_eq!(parsed.metadata["content_len"], 11);
    }

    #[test]
    fn entry_without_metadata_deserializes() {
        let json = format!(
            r#"{{"id":"{}","path":"docs://a","content":"x"}}"#,
            EntryId::new()
        );
        let parsed: Entry = serde_json::from_str(&json).expect("deserialize");
        assert!(parsed.metadata.is_empty());
    }
}

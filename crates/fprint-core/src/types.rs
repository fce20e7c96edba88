use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a raw filesystem notification, as far as debouncing cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchKind {
    /// A file appeared in the watched directory
    Created,
    /// File content changed
    Written,
    /// Anything else (metadata, rename, remove, access)
    Other,
}

impl WatchKind {
    /// Only creates and writes restart a path's quiescence countdown.
    pub fn resets_countdown(self) -> bool {
        matches!(self, WatchKind::Created | WatchKind::Written)
    }
}

/// A single notification from the watch source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, WatchKind::Created)
    }

    pub fn written(path: impl Into<PathBuf>) -> Self {
        Self::new(path, WatchKind::Written)
    }
}

/// Emitted once a path has been quiet for a full debounce window.
///
/// Deliberately carries no notification kind: a burst may mix creates and
/// writes and none of them is more meaningful than the others.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StableEvent {
    pub path: PathBuf,
}

/// A contiguous byte range of a file assigned to one hash worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// SHA-256 digest of one chunk range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDigest {
    pub index: usize,
    pub digest: [u8; 32],
}

/// Deterministic fingerprint of a whole file: the lowercase hex chunk
/// digests concatenated in index order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalDigest(String);

impl FinalDigest {
    pub fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of chunk digests folded into this fingerprint
    pub fn chunk_count(&self) -> usize {
        self.0.len() / 64
    }
}

impl fmt::Display for FinalDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of checking a file's trailing signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Recognized,
    NotRecognized,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Recognized => f.write_str("recognized"),
            Classification::NotRecognized => f.write_str("not recognized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_create_and_write_reset() {
        assert!(WatchKind::Created.resets_countdown());
        assert!(WatchKind::Written.resets_countdown());
        assert!(!WatchKind::Other.resets_countdown());
    }

    #[test]
    fn final_digest_counts_chunks() {
        let d = FinalDigest::from_hex("ab".repeat(64));
        assert_eq!(d.chunk_count(), 2);
        assert_eq!(d.to_string().len(), 128);
    }

    #[test]
    fn chunk_range_end() {
        let r = ChunkRange {
            index: 1,
            offset: 250_000,
            length: 250_000,
        };
        assert_eq!(r.end(), 500_000);
    }
}

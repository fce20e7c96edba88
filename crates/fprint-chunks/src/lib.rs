//! fprint-chunks: deterministic parallel fingerprinting of files
//!
//! # Overview
//! - `partition`: split a file length into one contiguous range per worker
//! - `hasher`: SHA-256 each range on a fixed-size rayon pool, then combine
//! - `sniff`: trailing-signature check for complete files

pub mod hasher;
pub mod partition;
pub mod sniff;

pub use hasher::{combine, hash_file, hash_range, ChunkHasher, HashError, READ_BUFFER_SIZE};
pub use partition::partition;
pub use sniff::{sniff, SniffError, Sniffer};

impl From<HashError> for fprint_core::FprintError {
    fn from(e: HashError) -> Self {
        fprint_core::FprintError::Hash(e.to_string())
    }
}

impl From<SniffError> for fprint_core::FprintError {
    fn from(e: SniffError) -> Self {
        fprint_core::FprintError::Sniff(e.to_string())
    }
}

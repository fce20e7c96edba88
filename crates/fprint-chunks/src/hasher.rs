//! Parallel chunked SHA-256 fingerprinting
//!
//! A file is split with [`partition`](crate::partition::partition) into one
//! range per worker. Each range is streamed through its own SHA-256 state on a
//! fixed-size rayon pool, and the per-range digests are joined in index order
//! as lowercase hex. The result depends only on file content and worker
//! count, never on which worker finishes first.

use fprint_core::{ChunkDigest, ChunkRange, FinalDigest};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::partition::partition;

/// Size of the read buffer each worker streams its range through
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hashing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("building hash worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl HashError {
    fn io(path: &Path, source: io::Error) -> Self {
        HashError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A fixed-size pool of hash workers, reused across files.
pub struct ChunkHasher {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for ChunkHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkHasher")
            .field("workers", &self.workers)
            .finish()
    }
}

impl ChunkHasher {
    pub fn new(workers: usize) -> Result<Self, HashError> {
        if workers == 0 {
            return Err(HashError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fprint-hash-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fingerprint `path`, blocking until every range is hashed.
    ///
    /// The first worker error fails the whole job and no digest is returned.
    pub fn hash_file(&self, path: &Path) -> Result<FinalDigest, HashError> {
        let meta = std::fs::metadata(path).map_err(|e| HashError::io(path, e))?;
        if !meta.is_file() {
            return Err(HashError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let size = meta.len();
        let ranges = partition(size, self.workers);
        let start = Instant::now();

        let digests = self.pool.install(|| {
            ranges
                .par_iter()
                .map(|range| hash_range(path, range))
                .collect::<Result<Vec<_>, _>>()
        })?;

        tracing::debug!(
            path = %path.display(),
            size,
            workers = self.workers,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "file hashed"
        );

        Ok(combine(digests))
    }
}

/// Fingerprint `path` with a one-off pool of `workers` threads.
pub fn hash_file(path: &Path, workers: usize) -> Result<FinalDigest, HashError> {
    ChunkHasher::new(workers)?.hash_file(path)
}

/// SHA-256 of exactly `range.length` bytes starting at `range.offset`.
///
/// Opens its own read-only handle. Hitting EOF before the range is consumed
/// (file truncated mid-hash) is reported as `UnexpectedEof`.
pub fn hash_range(path: &Path, range: &ChunkRange) -> Result<ChunkDigest, HashError> {
    let mut hasher = Sha256::new();

    if range.length > 0 {
        let mut file = File::open(path).map_err(|e| HashError::io(path, e))?;
        file.seek(SeekFrom::Start(range.offset))
            .map_err(|e| HashError::io(path, e))?;

        let mut reader = file.take(range.length);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut remaining = range.length;

        while remaining > 0 {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::io(path, e)),
            };
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }

        if remaining > 0 {
            return Err(HashError::io(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "chunk {} ended {remaining} bytes early (file shrank while hashing)",
                        range.index
                    ),
                ),
            ));
        }
    }

    Ok(ChunkDigest {
        index: range.index,
        digest: hasher.finalize().into(),
    })
}

/// Join chunk digests into a fingerprint, ordered by chunk index.
pub fn combine(mut digests: Vec<ChunkDigest>) -> FinalDigest {
    digests.sort_unstable_by_key(|d| d.index);
    let mut hex_out = String::with_capacity(digests.len() * 64);
    for d in &digests {
        hex_out.push_str(&hex::encode(d.digest));
    }
    FinalDigest::from_hex(hex_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn combine_sorts_by_index() {
        let a = ChunkDigest {
            index: 0,
            digest: [0xaa; 32],
        };
        let b = ChunkDigest {
            index: 1,
            digest: [0xbb; 32],
        };
        let forward = combine(vec![a, b]);
        let reversed = combine(vec![b, a]);
        assert_eq!(forward, reversed);
        assert!(forward.as_str().starts_with("aaaa"));
        assert!(forward.as_str().ends_with("bbbb"));
    }

    #[test]
    fn single_worker_matches_plain_sha256() {
        let data = b"Hello, parallel hashing!";
        let f = write_temp(data);
        let digest = hash_file(f.path(), 1).unwrap();
        assert_eq!(digest.as_str(), sha256_hex(data));
    }

    #[test]
    fn empty_file_is_repeated_empty_digest() {
        let f = write_temp(b"");
        let digest = hash_file(f.path(), 3).unwrap();
        assert_eq!(digest.as_str(), sha256_hex(b"").repeat(3));
    }

    #[test]
    fn fewer_bytes_than_workers() {
        let data = b"abc";
        let f = write_temp(data);
        let digest = hash_file(f.path(), 8).unwrap();
        let expected = format!("{}{}", sha256_hex(b"").repeat(7), sha256_hex(data));
        assert_eq!(digest.as_str(), expected);
        assert_eq!(digest, hash_file(f.path(), 8).unwrap());
    }

    #[test]
    fn remainder_is_hashed() {
        // 10 bytes / 3 workers: the last chunk must include the trailing byte
        let data = b"0123456789";
        let f = write_temp(data);
        let digest = hash_file(f.path(), 3).unwrap();
        let expected = format!(
            "{}{}{}",
            sha256_hex(b"012"),
            sha256_hex(b"345"),
            sha256_hex(b"6789")
        );
        assert_eq!(digest.as_str(), expected);
    }

    #[test]
    fn range_past_eof_is_an_error() {
        let f = write_temp(b"short");
        let range = ChunkRange {
            index: 0,
            offset: 0,
            length: 100,
        };
        let err = hash_range(f.path(), &range).unwrap_err();
        match err {
            HashError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected Io, got: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = hash_file(Path::new("/nonexistent/fprint/file.mcap"), 4).unwrap_err();
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(dir.path(), 2).unwrap_err();
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(ChunkHasher::new(0), Err(HashError::NoWorkers)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn hash_is_deterministic(
            data in proptest::collection::vec(any::<u8>(), 0..=200_000),
            workers in 1usize..=16,
        ) {
            let f = write_temp(&data);
            let hasher = ChunkHasher::new(workers).unwrap();
            let first = hasher.hash_file(f.path()).unwrap();
            let second = hasher.hash_file(f.path()).unwrap();
            prop_assert_eq!(first.chunk_count(), workers);
            prop_assert_eq!(first, second);
        }
    }
}

//! Static split of a file into per-worker byte ranges
//!
//! Every worker but the last gets `size / workers` bytes; the last one also
//! takes the remainder, so the ranges always cover `[0, size)` exactly.

use fprint_core::ChunkRange;

/// Partition `size` bytes across `workers` contiguous ranges.
///
/// Returns an empty list when `workers` is zero. When `size < workers` every
/// range but the last is empty and the last one spans the whole file.
pub fn partition(size: u64, workers: usize) -> Vec<ChunkRange> {
    if workers == 0 {
        return Vec::new();
    }

    let per_worker = size / workers as u64;
    let last = workers - 1;

    (0..workers)
        .map(|index| {
            let offset = index as u64 * per_worker;
            let length = if index == last {
                size - offset
            } else {
                per_worker
            };
            ChunkRange {
                index,
                offset,
                length,
            }
        })
        .collect()
}

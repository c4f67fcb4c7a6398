//! The backing segment: a capacity-bounded bump store.
//!
//! The segment is the primitive underneath the allocator: a single
//! contiguous byte buffer that only ever grows, by bumping its high-water
//! mark. It knows nothing about blocks, tags, or free lists; the heap core
//! consumes it through `extend`/`low`/`high` and never touches bytes
//! outside `[low, high)`.

use crate::error::{HeapError, Result};

/// Default segment capacity: 16 MB.
pub const DEFAULT_SEGMENT_BYTES: usize = 16 * 1024 * 1024;

/// Maximum segment capacity: 4 GB.
pub const MAX_SEGMENT_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// A growable, capacity-bounded byte segment.
#[derive(Debug)]
pub struct Segment {
    bytes: Vec<u8>,
    limit: usize,
}

impl Segment {
    /// Create an empty segment that may grow up to `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: limit.min(MAX_SEGMENT_BYTES),
        }
    }

    /// Grow the segment by `bytes` zeroed bytes.
    ///
    /// Returns the byte offset the new region starts at (the old high-water
    /// mark), or [`HeapError::OutOfMemory`] if the capacity limit would be
    /// exceeded. On failure the segment is unchanged.
    pub fn extend(&mut self, bytes: usize) -> Result<usize> {
        let old_high = self.bytes.len();
        if bytes > self.limit - old_high {
            tracing::debug!(
                requested = bytes,
                available = self.limit - old_high,
                "segment extend refused"
            );
            return Err(HeapError::OutOfMemory {
                requested: bytes as u64,
                available: (self.limit - old_high) as u64,
            });
        }
        self.bytes.resize(old_high + bytes, 0);
        Ok(old_high)
    }

    /// Truncate back to zero length, keeping the backing storage.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    /// Drop the backing storage entirely, keeping the capacity limit.
    pub fn release(&mut self) {
        self.bytes = Vec::new();
    }

    /// Low bound of the segment (always zero; kept for API symmetry).
    #[must_use]
    pub fn low(&self) -> usize {
        0
    }

    /// High-water mark: one past the last valid byte.
    #[must_use]
    pub fn high(&self) -> usize {
        self.bytes.len()
    }

    /// Capacity limit in bytes.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Read access to the segment's cells.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.bytes
    }

    /// Write access to the segment's cells.
    #[must_use]
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

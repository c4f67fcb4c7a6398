//! Strongly-typed offsets into the heap segment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one unit (cell) in bytes.
///
/// Every block size is measured in units, and every tag or free-list link
/// occupies exactly one unit. A payload starts one unit past its block
/// header, so payload offsets are always `UNIT_BYTES`-aligned, which meets
/// the alignment of the strictest scalar type on 64-bit targets.
pub const UNIT_BYTES: usize = 8;

/// Minimum block size in units: header + footer + two free-list links.
pub const MIN_BLOCK_UNITS: u64 = 4;

/// Index of a unit within the segment.
///
/// This is a raw cell index from the start of the segment, used internally
/// for all block bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIndex(u64);

impl UnitIndex {
    /// Create a new unit index.
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Get the raw index value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Advance by a number of units.
    #[must_use]
    pub const fn add(&self, units: u64) -> Self {
        Self(self.0 + units)
    }

    /// Step back by a number of units.
    #[must_use]
    pub const fn sub(&self, units: u64) -> Self {
        Self(self.0 - units)
    }

    /// Byte offset of this unit within the segment.
    #[must_use]
    pub const fn byte(&self) -> usize {
        self.0 as usize * UNIT_BYTES
    }
}

impl fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {}", self.0)
    }
}

impl From<u64> for UnitIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

/// A handle to an allocated payload.
///
/// `HeapPtr` is the byte offset of a block's payload within the segment.
/// The data is accessed through the owning [`Heap`](crate::Heap), never
/// directly through this handle, so a stale or fabricated handle can be
/// rejected instead of corrupting the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeapPtr(u64);

impl HeapPtr {
    /// The null/invalid handle.
    pub const NULL: Self = Self(0);

    /// Create a null handle.
    #[must_use]
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Create a handle from a payload byte offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Byte offset of the payload within the segment.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.0
    }

    /// Check if this is the null handle.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Unit index of the block header, one unit before the payload.
    ///
    /// Only meaningful when the offset is unit-aligned and non-null; the
    /// heap validates both before trusting the result.
    #[must_use]
    pub(crate) const fn header_unit(&self) -> UnitIndex {
        UnitIndex::new(self.0 / UNIT_BYTES as u64 - 1)
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

//! Error types for heap operations.
//!
//! Two kinds of failure exist at the API boundary, both reported by value:
//! exhaustion of the backing segment, and a handle that does not name a
//! currently allocated block. Neither is fatal and neither leaves the heap
//! in a modified state.

use thiserror::Error;

/// The error type for heap operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// The backing segment could not be extended to satisfy a request.
    #[error("H001: out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory {
        /// Number of bytes the segment was asked to grow by.
        requested: u64,
        /// Number of bytes still available in the segment.
        available: u64,
    },

    /// A handle passed to `free` or `reallocate` does not name a currently
    /// allocated block (never allocated, already freed, interior, or
    /// misaligned).
    #[error("H002: invalid pointer 0x{offset:08x}: {cause}")]
    InvalidPointer {
        /// The offending payload byte offset.
        offset: u64,
        /// Why validation rejected it.
        cause: &'static str,
    },
}

/// Convenient result type for heap operations.
pub type Result<T> = std::result::Result<T, HeapError>;

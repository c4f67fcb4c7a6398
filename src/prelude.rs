//! Prelude for convenient imports.
//!
//! # Example
//!
//! ```
//! use tagheap::prelude::*;
//!
//! let mut heap = Heap::new(HeapConfig::default());
//! let ptr = heap.allocate(16)?;
//! heap.free(ptr)?;
//! # Ok::<(), HeapError>(())
//! ```

// Core types
pub use crate::types::{HeapPtr, UnitIndex, MIN_BLOCK_UNITS, UNIT_BYTES};

// Error handling
pub use crate::error::{HeapError, Result};

// The heap and its configuration
pub use crate::heap::{Heap, HeapConfig, HeapStats, DEFAULT_PAGE_BYTES};
pub use crate::strategy::FitStrategy;

// Backing segment
pub use crate::store::{Segment, DEFAULT_SEGMENT_BYTES, MAX_SEGMENT_BYTES};

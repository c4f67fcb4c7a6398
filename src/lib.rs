//! # tagheap: a boundary-tag heap allocator
//!
//! This crate implements a general-purpose dynamic-memory allocator over a
//! single contiguous, growable byte segment. Returned regions are
//! non-overlapping, at least as large as requested, and unit-aligned;
//! freed regions are reused by later allocations.
//!
//! # Overview
//!
//! Every block, allocated or free, is delimited by a boundary-tag pair:
//! a header at its first unit and a footer at its last, both encoding the
//! block's size and allocation flag. Because any block's left neighbor
//! ends exactly one unit below its header, freeing coalesces with both
//! address-neighbors in O(1), with no separate index:
//!
//! ```text
//!   ┌────┬──────────────────┬────┬────┬──────────┬────┬─────┐
//!   │ hd │     payload      │ ft │ hd │ payload  │ ft │ ... │
//!   └────┴──────────────────┴────┴────┴──────────┴────┴─────┘
//!          block A (allocated)       block B (free)
//!                                    ▲ free blocks carry their own
//!                                      prev/next list links inside
//!                                      the first two payload units
//! ```
//!
//! Free blocks form a circular doubly-linked list threaded through their
//! own payloads. Allocation scans the list with a configurable
//! [`FitStrategy`] (first-fit or best-fit), splitting oversized blocks
//! and growing the segment when nothing fits.
//!
//! Everything is offset-based: user handles ([`HeapPtr`]) and free-list
//! links are arena-relative offsets into an owned buffer, so the crate
//! contains no `unsafe` code and a bad handle is rejected instead of
//! corrupting memory.
//!
//! # Example
//!
//! ```
//! use tagheap::{Heap, HeapConfig, FitStrategy};
//!
//! let mut heap = Heap::new(HeapConfig::default().with_strategy(FitStrategy::FirstFit));
//!
//! let ptr = heap.allocate(64)?;
//! heap.payload_mut(ptr)?[..5].copy_from_slice(b"hello");
//!
//! let ptr = heap.reallocate(ptr, 256)?;
//! assert_eq!(&heap.payload(ptr)?[..5], b"hello");
//!
//! heap.free(ptr)?;
//! # Ok::<(), tagheap::HeapError>(())
//! ```
//!
//! # Concurrency
//!
//! The allocator is single-threaded by design: every mutating operation
//! takes `&mut self`, so at most one call is in flight per heap. Shared
//! use requires external mutual exclusion around the whole [`Heap`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod prelude;
pub mod store;
pub mod types;

mod freelist;
mod heap;
mod strategy;
mod tag;

pub use error::{HeapError, Result};
pub use heap::{Heap, HeapConfig, HeapStats, DEFAULT_PAGE_BYTES};
pub use store::{Segment, DEFAULT_SEGMENT_BYTES, MAX_SEGMENT_BYTES};
pub use strategy::FitStrategy;
pub use tag::{bytes_for_units, units_for_bytes, Tag};
pub use types::{HeapPtr, UnitIndex, MIN_BLOCK_UNITS, UNIT_BYTES};

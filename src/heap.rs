//! The heap: lifecycle, allocate/free/reallocate, and handle validation.
//!
//! A [`Heap`] owns its backing [`Segment`] and the free-list anchor; all
//! allocator state lives in this one context object, so independent heaps
//! coexist and tests are deterministic. The segment always holds a 4-unit
//! allocated sentinel block at its low end and a 1-unit allocated sentinel
//! tag at its high end, so neighbor arithmetic never needs edge checks:
//!
//! ```text
//!   ┌──────────────┬─────────────────────────────────────┬──────────┐
//!   │ low sentinel │  blocks (allocated and free, mixed) │ high     │
//!   │ 4 units,     │                                     │ sentinel │
//!   │ always       │  grows on exhaustion ──────────▶    │ 1 unit   │
//!   │ allocated    │                                     │          │
//!   └──────────────┴─────────────────────────────────────┴──────────┘
//! ```
//!
//! On a fresh heap the low sentinel doubles as the self-linked free-list
//! anchor. Being allocated, a fit search that finds only the sentinel
//! correctly concludes "nothing free" and grows the segment instead of
//! mis-selecting it.

use crate::error::{HeapError, Result};
use crate::freelist;
use crate::store::{Segment, DEFAULT_SEGMENT_BYTES};
use crate::strategy::{self, FitStrategy};
use crate::tag::{
    bytes_for_units, read_tag, units_for_bytes, write_link, write_pair, write_tag, Tag,
    MIN_BLOCK_UNITS, NEXT, PREV, UNIT_BYTES,
};
use crate::types::{HeapPtr, UnitIndex};
use serde::{Deserialize, Serialize};

/// Default growth granule: 4 KiB.
pub const DEFAULT_PAGE_BYTES: usize = 4096;

/// Configuration for heap creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Capacity limit of the backing segment in bytes.
    pub capacity: usize,
    /// Minimum growth granule in bytes.
    pub page_bytes: usize,
    /// Block-selection policy.
    pub strategy: FitStrategy,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SEGMENT_BYTES,
            page_bytes: DEFAULT_PAGE_BYTES,
            strategy: FitStrategy::default(),
        }
    }
}

impl HeapConfig {
    /// Set the segment capacity limit.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the growth granule.
    #[must_use]
    pub fn with_page_bytes(mut self, page_bytes: usize) -> Self {
        self.page_bytes = page_bytes;
        self
    }

    /// Set the block-selection policy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: FitStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// A point-in-time summary of the heap, computed by a boundary-tag walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    /// Total segment size in units, sentinels included.
    pub total_units: u64,
    /// Units in free blocks.
    pub free_units: u64,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Number of allocated blocks, sentinels excluded.
    pub allocated_blocks: usize,
    /// Size of the largest free block in units.
    pub largest_free: u64,
}

/// A boundary-tag heap allocator over a growable segment.
#[derive(Debug)]
pub struct Heap {
    store: Segment,
    anchor: UnitIndex,
    started: bool,
    config: HeapConfig,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

impl Heap {
    /// Create a heap with the given configuration.
    ///
    /// No backing memory is claimed yet; the segment is laid out on
    /// [`init`](Heap::init) or lazily on the first allocation.
    #[must_use]
    pub fn new(config: HeapConfig) -> Self {
        Self {
            store: Segment::new(config.capacity),
            anchor: UnitIndex::new(0),
            started: false,
            config,
        }
    }

    /// The heap's configuration.
    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Switch the block-selection policy for subsequent allocations.
    pub fn set_strategy(&mut self, strategy: FitStrategy) {
        self.config.strategy = strategy;
    }

    /// Lay out the initial minimal segment (sentinels only) if the heap
    /// is not already initialized.
    pub fn init(&mut self) -> Result<()> {
        if !self.started {
            self.restart()?;
        }
        Ok(())
    }

    /// Tear down to the initial minimal state, keeping the backing
    /// storage. All outstanding handles become invalid.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset();
        self.started = false;
        self.restart()
    }

    /// Release the backing storage and clear allocator state. A later
    /// allocation lazily re-initializes the heap.
    pub fn deinit(&mut self) {
        self.store.release();
        self.started = false;
        tracing::debug!("heap deinitialized");
    }

    /// Allocate at least `bytes` bytes, returning a handle to the
    /// payload. Initializes the heap lazily if needed.
    ///
    /// # Errors
    ///
    /// [`HeapError::OutOfMemory`] when the backing segment cannot grow
    /// enough to satisfy the request.
    pub fn allocate(&mut self, bytes: usize) -> Result<HeapPtr> {
        if !self.started {
            self.restart()?;
        }
        let required = Self::block_units(bytes);
        self.check_request(bytes, required)?;
        let (strategy, page_units) = (self.config.strategy, self.page_units());
        let block = strategy::acquire(
            &mut self.store,
            &mut self.anchor,
            strategy,
            page_units,
            required,
        )?;
        Ok(Self::payload_ptr(block))
    }

    /// Return an allocated block to the free list.
    ///
    /// Freeing the null handle is a no-op. Any other handle that does not
    /// validate (never allocated, already freed, interior, misaligned) is
    /// rejected with [`HeapError::InvalidPointer`] and the heap is left
    /// unchanged.
    pub fn free(&mut self, ptr: HeapPtr) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let block = self.resolve(ptr)?;
        freelist::insert(self.store.cells_mut(), &mut self.anchor, block);
        Ok(())
    }

    /// Resize an allocation to at least `bytes` bytes.
    ///
    /// The null handle behaves as [`allocate`](Heap::allocate). If the
    /// existing block's capacity already covers the request, the same
    /// handle is returned unchanged (blocks are never shrunk). Otherwise
    /// a new block is acquired, the old payload copied over, and the old
    /// block freed. If acquiring the new block fails, the original block
    /// is left intact and unfreed.
    ///
    /// # Errors
    ///
    /// [`HeapError::InvalidPointer`] for a handle that does not validate;
    /// [`HeapError::OutOfMemory`] when a needed grow is refused.
    pub fn reallocate(&mut self, ptr: HeapPtr, bytes: usize) -> Result<HeapPtr> {
        if ptr.is_null() {
            return self.allocate(bytes);
        }
        let block = self.resolve(ptr)?;
        let have = read_tag(self.store.cells(), block).units;
        let need = Self::block_units(bytes);
        if have >= need {
            return Ok(ptr);
        }
        self.check_request(bytes, need)?;

        // Acquire first: on failure the original block must stay valid.
        let (strategy, page_units) = (self.config.strategy, self.page_units());
        let new_block = strategy::acquire(
            &mut self.store,
            &mut self.anchor,
            strategy,
            page_units,
            need,
        )?;

        let src = block.add(1).byte();
        let dst = new_block.add(1).byte();
        let len = bytes_for_units(have - 2);
        let cells = self.store.cells_mut();
        cells.copy_within(src..src + len, dst);

        freelist::insert(cells, &mut self.anchor, block);
        Ok(Self::payload_ptr(new_block))
    }

    /// Validated read access to a block's full usable byte span.
    pub fn payload(&self, ptr: HeapPtr) -> Result<&[u8]> {
        let block = self.resolve(ptr)?;
        let units = read_tag(self.store.cells(), block).units;
        let start = block.add(1).byte();
        Ok(&self.store.cells()[start..start + bytes_for_units(units - 2)])
    }

    /// Validated write access to a block's full usable byte span.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8]> {
        let block = self.resolve(ptr)?;
        let units = read_tag(self.store.cells(), block).units;
        let start = block.add(1).byte();
        Ok(&mut self.store.cells_mut()[start..start + bytes_for_units(units - 2)])
    }

    /// Summarize the heap with a boundary-tag walk. An uninitialized
    /// heap reports all zeroes.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total_units: 0,
            free_units: 0,
            free_blocks: 0,
            allocated_blocks: 0,
            largest_free: 0,
        };
        if !self.started {
            return stats;
        }
        let cells = self.store.cells();
        let total = (self.store.high() / UNIT_BYTES) as u64;
        stats.total_units = total;

        // Walk the real blocks between the sentinels.
        let mut at = MIN_BLOCK_UNITS;
        while at < total - 1 {
            let tag = read_tag(cells, UnitIndex::new(at));
            if tag.allocated {
                stats.allocated_blocks += 1;
            } else {
                stats.free_blocks += 1;
                stats.free_units += tag.units;
                stats.largest_free = stats.largest_free.max(tag.units);
            }
            at += tag.units;
        }
        stats
    }

    fn restart(&mut self) -> Result<()> {
        self.store.extend(bytes_for_units(MIN_BLOCK_UNITS + 1))?;
        let cells = self.store.cells_mut();
        let sentinel = UnitIndex::new(0);
        write_pair(cells, sentinel, Tag::allocated(MIN_BLOCK_UNITS));
        write_link(cells, sentinel, PREV, sentinel);
        write_link(cells, sentinel, NEXT, sentinel);
        write_tag(cells, sentinel.add(MIN_BLOCK_UNITS), Tag::allocated(1));
        self.anchor = sentinel;
        self.started = true;
        tracing::debug!(capacity = self.config.capacity, "heap initialized");
        Ok(())
    }

    /// Units a request of `bytes` occupies: payload rounded up, plus the
    /// tag pair, clamped to the minimum block size.
    fn block_units(bytes: usize) -> u64 {
        (units_for_bytes(bytes) + 2).max(MIN_BLOCK_UNITS)
    }

    fn page_units(&self) -> u64 {
        units_for_bytes(self.config.page_bytes)
            .max(MIN_BLOCK_UNITS)
            .min(self.limit_units())
    }

    /// Units the capacity limit can ever hold.
    fn limit_units(&self) -> u64 {
        (self.store.limit() / UNIT_BYTES) as u64
    }

    /// Reject a request too large for the capacity limit before any unit
    /// count is converted back to bytes, which would overflow for sizes
    /// near `usize::MAX`.
    fn check_request(&self, bytes: usize, required: u64) -> Result<()> {
        if required > self.limit_units() {
            return Err(HeapError::OutOfMemory {
                requested: bytes as u64,
                available: (self.store.limit() - self.store.high()) as u64,
            });
        }
        Ok(())
    }

    fn payload_ptr(block: UnitIndex) -> HeapPtr {
        HeapPtr::new(block.add(1).byte() as u64)
    }

    /// Validate a handle down to its block header.
    ///
    /// Fast path: unit-aligned, strictly inside the segment, header in
    /// real-block range, marked allocated with a consistent footer. When
    /// the structural check is inconclusive, a linear walk from the low
    /// sentinel locates the containing block and confirms the handle is
    /// exactly its payload start and the block is allocated.
    fn resolve(&self, ptr: HeapPtr) -> Result<UnitIndex> {
        let invalid = |cause| HeapError::InvalidPointer {
            offset: ptr.offset(),
            cause,
        };
        if !self.started {
            return Err(invalid("heap is not initialized"));
        }
        let off = ptr.offset();
        if off == 0 || off >= self.store.high() as u64 {
            return Err(invalid("outside segment bounds"));
        }
        if off % UNIT_BYTES as u64 != 0 {
            return Err(invalid("not aligned to a unit boundary"));
        }

        let cells = self.store.cells();
        let total = (self.store.high() / UNIT_BYTES) as u64;
        let header = ptr.header_unit();

        if header.get() >= MIN_BLOCK_UNITS {
            let tag = read_tag(cells, header);
            if tag.allocated
                && tag.units >= MIN_BLOCK_UNITS
                && header.get() + tag.units < total
            {
                let foot = read_tag(cells, header.add(tag.units - 1));
                if foot == tag {
                    return Ok(header);
                }
            }
        }

        // Fallback: walk block-by-block from the low sentinel.
        let mut at = 0u64;
        while at < total {
            let tag = read_tag(cells, UnitIndex::new(at));
            if tag.units == 0 {
                // Corrupt size would loop forever; stop and reject.
                break;
            }
            let end = at + tag.units;
            if header.get() < end {
                if at == header.get()
                    && tag.allocated
                    && at >= MIN_BLOCK_UNITS
                    && end < total
                {
                    return Ok(header);
                }
                break;
            }
            at = end;
        }
        Err(invalid("not the payload start of an allocated block"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::read_link;
    use std::collections::BTreeSet;

    fn small_heap() -> Heap {
        Heap::new(
            HeapConfig::default()
                .with_capacity(64 * 1024)
                .with_page_bytes(256),
        )
    }

    /// Assert every structural invariant: header/footer agreement, no
    /// adjacent free blocks, sizes summing to the segment, a well-formed
    /// free-list cycle containing the sentinel and exactly the free
    /// blocks.
    fn check_invariants(heap: &Heap) {
        let cells = heap.store.cells();
        let total = (heap.store.high() / UNIT_BYTES) as u64;
        assert!(total >= MIN_BLOCK_UNITS + 1);

        let mut free_by_walk = BTreeSet::new();
        let mut prev_free = false;
        let mut at = 0u64;
        while at < total - 1 {
            let tag = read_tag(cells, UnitIndex::new(at));
            assert!(tag.units >= MIN_BLOCK_UNITS, "undersized block at unit {at}");
            let foot = read_tag(cells, UnitIndex::new(at + tag.units - 1));
            assert_eq!(foot, tag, "header/footer disagree at unit {at}");
            assert!(
                !(prev_free && !tag.allocated),
                "adjacent free blocks at unit {at}"
            );
            prev_free = !tag.allocated;
            if !tag.allocated {
                free_by_walk.insert(at);
            }
            at += tag.units;
        }
        assert_eq!(at, total - 1, "block sizes do not sum to the segment");
        assert_eq!(
            read_tag(cells, UnitIndex::new(total - 1)),
            Tag::allocated(1),
            "high sentinel missing"
        );

        let mut free_by_list = BTreeSet::new();
        let mut saw_sentinel = false;
        let mut node = heap.anchor;
        loop {
            let tag = read_tag(cells, node);
            if node.get() == 0 {
                assert!(tag.allocated, "low sentinel must stay allocated");
                saw_sentinel = true;
            } else {
                assert!(!tag.allocated, "allocated block on the free list");
                free_by_list.insert(node.get());
            }
            let next = read_link(cells, node, NEXT);
            assert_eq!(read_link(cells, next, PREV), node, "asymmetric links");
            node = next;
            if node == heap.anchor {
                break;
            }
            assert!(free_by_list.len() as u64 <= total, "free list does not cycle");
        }
        assert!(saw_sentinel, "sentinel left the free list");
        assert_eq!(free_by_list, free_by_walk, "free list disagrees with tags");
    }

    #[test]
    fn lazy_init_on_first_allocate() {
        let mut heap = small_heap();
        assert_eq!(heap.stats().total_units, 0);

        let ptr = heap.allocate(16).unwrap();
        assert!(!ptr.is_null());
        assert!(heap.stats().total_units > 0);
        check_invariants(&heap);
    }

    #[test]
    fn init_is_idempotent() {
        let mut heap = small_heap();
        heap.init().unwrap();
        let total = heap.stats().total_units;
        assert_eq!(total, MIN_BLOCK_UNITS + 1);

        heap.init().unwrap();
        assert_eq!(heap.stats().total_units, total);
        check_invariants(&heap);
    }

    #[test]
    fn reset_restores_a_clean_slate() {
        let mut heap = small_heap();
        let first = heap.allocate(100).unwrap();
        heap.allocate(24).unwrap();

        heap.reset().unwrap();
        assert_eq!(heap.stats().total_units, MIN_BLOCK_UNITS + 1);
        check_invariants(&heap);

        // The workload replays deterministically.
        assert_eq!(heap.allocate(100).unwrap(), first);
    }

    #[test]
    fn deinit_releases_and_allows_lazy_revival() {
        let mut heap = small_heap();
        let ptr = heap.allocate(8).unwrap();

        heap.deinit();
        assert_eq!(heap.stats().total_units, 0);
        // Old handles are rejected, not dereferenced.
        assert!(matches!(
            heap.free(ptr),
            Err(HeapError::InvalidPointer { .. })
        ));

        let revived = heap.allocate(8).unwrap();
        assert_eq!(revived, ptr);
        check_invariants(&heap);
    }

    #[test]
    fn zero_byte_allocation_gets_a_minimum_block() {
        let mut heap = small_heap();
        let ptr = heap.allocate(0).unwrap();
        assert_eq!(heap.payload(ptr).unwrap().len(), bytes_for_units(2));
        check_invariants(&heap);
    }

    #[test]
    fn rejects_misaligned_and_foreign_handles() {
        let mut heap = small_heap();
        let ptr = heap.allocate(16).unwrap();

        for bogus in [
            HeapPtr::new(ptr.offset() + 1), // misaligned
            HeapPtr::new(ptr.offset() + 8), // interior, aligned
            HeapPtr::new(1 << 40),          // far outside the segment
            HeapPtr::new(8),                // inside the low sentinel
        ] {
            assert!(
                matches!(heap.free(bogus), Err(HeapError::InvalidPointer { .. })),
                "accepted bogus handle {bogus}"
            );
        }
        // The real allocation is still intact.
        heap.free(ptr).unwrap();
        check_invariants(&heap);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut heap = small_heap();
        let keep = heap.allocate(16).unwrap();
        let ptr = heap.allocate(16).unwrap();
        heap.payload_mut(keep).unwrap().fill(0x5A);

        heap.free(ptr).unwrap();
        assert!(matches!(
            heap.free(ptr),
            Err(HeapError::InvalidPointer { .. })
        ));
        // Existing allocations were not perturbed.
        assert!(heap.payload(keep).unwrap().iter().all(|&b| b == 0x5A));
        check_invariants(&heap);
    }

    #[test]
    fn free_of_null_is_a_no_op() {
        let mut heap = small_heap();
        heap.allocate(16).unwrap();
        heap.free(HeapPtr::NULL).unwrap();
        check_invariants(&heap);
    }

    #[test]
    fn reallocate_within_capacity_returns_the_same_handle() {
        let mut heap = small_heap();
        // 100 bytes round up to 13 payload units; asking for fewer bytes
        // stays within the block.
        let ptr = heap.allocate(100).unwrap();
        assert_eq!(heap.reallocate(ptr, 64).unwrap(), ptr);
        assert_eq!(heap.reallocate(ptr, 104).unwrap(), ptr);
        check_invariants(&heap);
    }

    #[test]
    fn reallocate_null_allocates() {
        let mut heap = small_heap();
        let ptr = heap.reallocate(HeapPtr::NULL, 32).unwrap();
        assert!(!ptr.is_null());
        check_invariants(&heap);
    }

    #[test]
    fn failed_grow_leaves_the_original_block_intact() {
        let mut heap = Heap::new(
            HeapConfig::default()
                .with_capacity(512)
                .with_page_bytes(256),
        );
        let ptr = heap.allocate(64).unwrap();
        heap.payload_mut(ptr).unwrap().fill(0xC3);

        let err = heap.reallocate(ptr, 4096).unwrap_err();
        assert!(matches!(err, HeapError::OutOfMemory { .. }));

        let bytes = heap.payload(ptr).unwrap();
        assert!(bytes[..64].iter().all(|&b| b == 0xC3));
        check_invariants(&heap);
    }

    #[test]
    fn maximum_size_request_fails_cleanly() {
        let mut heap = Heap::new(
            HeapConfig::default()
                .with_capacity(4096)
                .with_page_bytes(256),
        );
        for oversized in [usize::MAX, usize::MAX - 64, 1 << 40] {
            assert!(matches!(
                heap.allocate(oversized),
                Err(HeapError::OutOfMemory { .. })
            ));
        }

        let ptr = heap.allocate(16).unwrap();
        assert!(matches!(
            heap.reallocate(ptr, usize::MAX),
            Err(HeapError::OutOfMemory { .. })
        ));
        // The heap stays usable after every rejection.
        heap.free(ptr).unwrap();
        check_invariants(&heap);
    }

    #[test]
    fn mixed_workload_preserves_every_invariant() {
        let mut heap = small_heap();
        let mut live = Vec::new();

        for round in 0..6usize {
            for size in [8, 24, 100, 64, 1, 256] {
                live.push(heap.allocate(size + round).unwrap());
                check_invariants(&heap);
            }
            // Free every other allocation, oldest first.
            let mut index = 0;
            live.retain(|&ptr| {
                index += 1;
                if index % 2 == 0 {
                    heap.free(ptr).unwrap();
                    false
                } else {
                    true
                }
            });
            check_invariants(&heap);

            if let Some(ptr) = live.pop() {
                live.push(heap.reallocate(ptr, 512).unwrap());
                check_invariants(&heap);
            }
        }

        for ptr in live {
            heap.free(ptr).unwrap();
            check_invariants(&heap);
        }
    }

    #[test]
    fn stats_track_the_walk() {
        let mut heap = small_heap();
        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(16).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.allocated_blocks, 2);

        heap.free(a).unwrap();
        heap.free(b).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.allocated_blocks, 0);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_units, stats.total_units - (MIN_BLOCK_UNITS + 1));
        assert_eq!(stats.largest_free, stats.free_units);
    }
}

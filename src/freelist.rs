//! The circular free list.
//!
//! A doubly-linked list threaded through the free blocks themselves, using
//! the first two payload units of each free block as prev/next links. The
//! low sentinel is a permanent member: it is allocated, so searches skip
//! it, but its presence means the list is never empty and the anchor can
//! always be repointed to a surviving node in O(1).
//!
//! Insertion coalesces with both address-neighbors. The left merge needs
//! no link surgery at all: the left block simply grows over the freed one
//! and keeps its list position. This is why the allocator's split path
//! hands the high part of a block to the caller and leaves the low part in
//! the list.

use crate::tag::{read_link, read_tag, write_link, write_pair, Tag, NEXT, PREV};
use crate::types::UnitIndex;

/// Return `block` to the free list, coalescing with free address-neighbors.
///
/// `block` must be a real block (header and footer in place, strictly
/// between the sentinels). The anchor ends up on the freed or merged
/// block. Postcondition: no two address-adjacent blocks are both free.
pub(crate) fn insert(cells: &mut [u8], anchor: &mut UnitIndex, block: UnitIndex) {
    let mut start = block;
    let mut units = read_tag(cells, block).units;
    write_pair(cells, start, Tag::free(units));

    // Left neighbor: its footer sits one unit below our header.
    let left_foot = read_tag(cells, block.sub(1));
    if !left_foot.allocated {
        start = block.sub(left_foot.units);
        units += left_foot.units;
        write_pair(cells, start, Tag::free(units));
        // The left block keeps its list position; no link mutation.
    } else {
        let after = read_link(cells, *anchor, NEXT);
        write_link(cells, start, PREV, *anchor);
        write_link(cells, start, NEXT, after);
        write_link(cells, after, PREV, start);
        write_link(cells, *anchor, NEXT, start);
    }
    *anchor = start;

    // Right neighbor: its header sits one unit past our footer.
    let right = start.add(units);
    let right_tag = read_tag(cells, right);
    if !right_tag.allocated {
        remove(cells, anchor, right);
        units += right_tag.units;
        write_pair(cells, start, Tag::free(units));
    }
}

/// Splice `block` out of the free list in O(1).
///
/// If `block` is the anchor, the anchor moves to `block`'s predecessor,
/// which always survives because the low sentinel never leaves the list.
pub(crate) fn remove(cells: &mut [u8], anchor: &mut UnitIndex, block: UnitIndex) {
    if *anchor == block {
        *anchor = read_link(cells, block, PREV);
    }
    let prev = read_link(cells, block, PREV);
    let next = read_link(cells, block, NEXT);
    write_link(cells, prev, NEXT, next);
    write_link(cells, next, PREV, prev);
}

//! Boundary-tag layout.
//!
//! Every block is delimited by two tags: a header at its first unit and a
//! footer at its last, both encoding the same `(size, allocated)` record.
//! Agreement between the two is what lets a neighbor be found by address
//! arithmetic alone: the footer of the block to the left sits exactly one
//! unit below any header. This is the basis of O(1) coalescing.
//!
//! ```text
//!   one block, N units:
//!
//!   ┌────────┬────────┬────────┬─────────────────┬────────┐
//!   │ header │ prev*  │ next*  │     payload     │ footer │
//!   │ (N, a) │        │        │                 │ (N, a) │
//!   └────────┴────────┴────────┴─────────────────┴────────┘
//!                                                 * link units are live
//!                                                   only while free
//! ```
//!
//! A tag is stored as one little-endian u64 word: the allocation flag in
//! bit 0, the size in units in the remaining bits. The in-memory [`Tag`]
//! is a plain record; the word packing is purely an on-buffer codec.

use crate::types::UnitIndex;
use byteorder::{ByteOrder, LittleEndian};

pub(crate) use crate::types::{MIN_BLOCK_UNITS, UNIT_BYTES};

/// A decoded boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Block size in units, counting both tags.
    pub units: u64,
    /// Whether the block is currently allocated.
    pub allocated: bool,
}

impl Tag {
    /// Tag for an allocated block of `units` units.
    #[must_use]
    pub const fn allocated(units: u64) -> Self {
        Self {
            units,
            allocated: true,
        }
    }

    /// Tag for a free block of `units` units.
    #[must_use]
    pub const fn free(units: u64) -> Self {
        Self {
            units,
            allocated: false,
        }
    }

    fn encode(self) -> u64 {
        (self.units << 1) | self.allocated as u64
    }

    fn decode(word: u64) -> Self {
        Self {
            units: word >> 1,
            allocated: word & 1 == 1,
        }
    }
}

/// Round a byte count up to whole units.
#[must_use]
pub const fn units_for_bytes(bytes: usize) -> u64 {
    bytes.div_ceil(UNIT_BYTES) as u64
}

/// Byte count of a whole number of units.
#[must_use]
pub const fn bytes_for_units(units: u64) -> usize {
    units as usize * UNIT_BYTES
}

/// Read the tag stored at `at`.
pub(crate) fn read_tag(cells: &[u8], at: UnitIndex) -> Tag {
    Tag::decode(LittleEndian::read_u64(&cells[at.byte()..at.byte() + UNIT_BYTES]))
}

/// Write a single tag at `at`.
///
/// Only the one-unit high sentinel is ever written through this; real
/// blocks go through [`write_pair`] so header and footer are never
/// observed disagreeing.
pub(crate) fn write_tag(cells: &mut [u8], at: UnitIndex, tag: Tag) {
    LittleEndian::write_u64(&mut cells[at.byte()..at.byte() + UNIT_BYTES], tag.encode());
}

/// Write a block's header and footer together.
pub(crate) fn write_pair(cells: &mut [u8], start: UnitIndex, tag: Tag) {
    write_tag(cells, start, tag);
    write_tag(cells, start.add(tag.units - 1), tag);
}

/// Read a free-list link stored in the `slot`-th payload unit of `block`
/// (slot 0 = prev, slot 1 = next).
pub(crate) fn read_link(cells: &[u8], block: UnitIndex, slot: u64) -> UnitIndex {
    let at = block.add(1 + slot);
    UnitIndex::new(LittleEndian::read_u64(
        &cells[at.byte()..at.byte() + UNIT_BYTES],
    ))
}

/// Write a free-list link into the `slot`-th payload unit of `block`.
pub(crate) fn write_link(cells: &mut [u8], block: UnitIndex, slot: u64, to: UnitIndex) {
    let at = block.add(1 + slot);
    LittleEndian::write_u64(&mut cells[at.byte()..at.byte() + UNIT_BYTES], to.get());
}

/// Slot index of the prev link.
pub(crate) const PREV: u64 = 0;
/// Slot index of the next link.
pub(crate) const NEXT: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_word_roundtrip() {
        for tag in [Tag::free(4), Tag::allocated(4), Tag::free(513), Tag::allocated(1)] {
            assert_eq!(Tag::decode(tag.encode()), tag);
        }
    }

    #[test]
    fn unit_math() {
        assert_eq!(units_for_bytes(0), 0);
        assert_eq!(units_for_bytes(1), 1);
        assert_eq!(units_for_bytes(8), 1);
        assert_eq!(units_for_bytes(9), 2);
        assert_eq!(units_for_bytes(16), 2);
        assert_eq!(bytes_for_units(3), 24);
    }

    #[test]
    fn pair_write_lands_at_both_ends() {
        let mut cells = vec![0u8; 6 * UNIT_BYTES];
        write_pair(&mut cells, UnitIndex::new(1), Tag::free(5));

        assert_eq!(read_tag(&cells, UnitIndex::new(1)), Tag::free(5));
        assert_eq!(read_tag(&cells, UnitIndex::new(5)), Tag::free(5));
        // Unit 0 untouched.
        assert_eq!(read_tag(&cells, UnitIndex::new(0)), Tag::free(0));
    }

    #[test]
    fn links_occupy_first_two_payload_units() {
        let mut cells = vec![0u8; 4 * UNIT_BYTES];
        let block = UnitIndex::new(0);
        write_link(&mut cells, block, PREV, UnitIndex::new(7));
        write_link(&mut cells, block, NEXT, UnitIndex::new(9));

        assert_eq!(read_link(&cells, block, PREV), UnitIndex::new(7));
        assert_eq!(read_link(&cells, block, NEXT), UnitIndex::new(9));
        assert_eq!(LittleEndian::read_u64(&cells[8..16]), 7);
        assert_eq!(LittleEndian::read_u64(&cells[16..24]), 9);
    }
}

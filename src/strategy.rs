//! Block selection: first-fit and best-fit placement, plus segment growth.
//!
//! Both strategies operate on a required size in units that the public
//! layer has already inflated with tag overhead and clamped to the
//! minimum block size. When no free block suffices, the segment is grown
//! and the search retried; a refused growth surfaces as
//! [`OutOfMemory`](crate::HeapError::OutOfMemory).

use crate::error::Result;
use crate::freelist;
use crate::store::Segment;
use crate::tag::{
    bytes_for_units, read_link, read_tag, write_pair, write_tag, Tag, MIN_BLOCK_UNITS, NEXT,
    UNIT_BYTES,
};
use crate::types::UnitIndex;
use serde::{Deserialize, Serialize};

/// Block-selection policy.
///
/// First-fit stops at the first sufficient block and trades fragmentation
/// quality for scan cost; best-fit pays a full pass per allocation for
/// the tightest sufficient block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    /// First sufficient free block, scanning from the anchor.
    #[default]
    FirstFit,
    /// Minimum sufficient free block over one full pass; ties keep the
    /// block found earliest.
    BestFit,
}

/// Find, detach, and mark allocated a block of at least `required` units,
/// growing the segment as needed.
pub(crate) fn acquire(
    store: &mut Segment,
    anchor: &mut UnitIndex,
    strategy: FitStrategy,
    page_units: u64,
    required: u64,
) -> Result<UnitIndex> {
    match strategy {
        FitStrategy::FirstFit => first_fit(store, anchor, page_units, required),
        FitStrategy::BestFit => best_fit(store, anchor, page_units, required),
    }
}

fn first_fit(
    store: &mut Segment,
    anchor: &mut UnitIndex,
    page_units: u64,
    required: u64,
) -> Result<UnitIndex> {
    loop {
        let mut at = *anchor;
        loop {
            let tag = read_tag(store.cells(), at);
            if !tag.allocated && tag.units >= required {
                return Ok(take_or_split(store.cells_mut(), anchor, at, required));
            }
            at = read_link(store.cells(), at, NEXT);
            if at == *anchor {
                break;
            }
        }
        grow(store, anchor, page_units, required)?;
    }
}

fn best_fit(
    store: &mut Segment,
    anchor: &mut UnitIndex,
    page_units: u64,
    required: u64,
) -> Result<UnitIndex> {
    loop {
        let mut best: Option<(UnitIndex, u64)> = None;
        let mut at = *anchor;
        loop {
            let tag = read_tag(store.cells(), at);
            if !tag.allocated
                && tag.units >= required
                && best.is_none_or(|(_, units)| tag.units < units)
            {
                best = Some((at, tag.units));
            }
            at = read_link(store.cells(), at, NEXT);
            if at == *anchor {
                break;
            }
        }
        if let Some((block, _)) = best {
            return Ok(take_or_split(store.cells_mut(), anchor, block, required));
        }
        grow(store, anchor, page_units, required)?;
    }
}

/// Detach `required` units from the free `block`.
///
/// Too little left over for a valid free block: the whole block is
/// unlinked and handed out. Otherwise the block is split: the low part
/// keeps its size-shrunk tags and its list position, the high `required`
/// units are carved off, marked allocated, and returned. Handing out the
/// high part is what lets a later free of it merge back into the low
/// remainder without touching any links.
fn take_or_split(
    cells: &mut [u8],
    anchor: &mut UnitIndex,
    block: UnitIndex,
    required: u64,
) -> UnitIndex {
    let units = read_tag(cells, block).units;
    if units - required < MIN_BLOCK_UNITS {
        freelist::remove(cells, anchor, block);
        write_pair(cells, block, Tag::allocated(units));
        block
    } else {
        let rest = units - required;
        write_pair(cells, block, Tag::free(rest));
        let carved = block.add(rest);
        write_pair(cells, carved, Tag::allocated(required));
        carved
    }
}

/// Grow the segment by at least `required` units (one page minimum) and
/// feed the new space into the free list.
///
/// The new block starts at the old high sentinel's unit and the granted
/// extent's last unit becomes the new high sentinel, so the segment
/// gains exactly the granted unit count and `insert` can coalesce the
/// new block with a free old top-of-segment block.
fn grow(
    store: &mut Segment,
    anchor: &mut UnitIndex,
    page_units: u64,
    required: u64,
) -> Result<()> {
    let units = required.max(page_units);
    let old_high = store.extend(bytes_for_units(units))?;
    let start = UnitIndex::new((old_high / UNIT_BYTES) as u64 - 1);

    let cells = store.cells_mut();
    write_pair(cells, start, Tag::free(units));
    write_tag(cells, start.add(units), Tag::allocated(1));
    tracing::debug!(granted_units = units, start = start.get(), "segment grown");

    freelist::insert(cells, anchor, start);
    Ok(())
}

//! A size-class ("binned") flavor of the system allocator.
//!
//! Blocks are committed in fixed size classes, the way small-object
//! allocators serve requests from per-class bins. [`BinnedMalloc::quantize_size`]
//! reports the class size, so slack calculations that quantize against it
//! claim the headroom the allocator hands out anyway, and resizes that stay
//! within one class never move the block.

use std::ptr::NonNull;

use crate::{
    align::{align_up, checked_align_up},
    malloc::{DEFAULT_ALIGNMENT, Malloc, realloc_exact},
};

/// Requests up to this size are served in `SMALL_STEP` increments.
const SMALL_LIMIT: usize = 128;
const SMALL_STEP: usize = 16;
/// Between `SMALL_LIMIT` and `MEDIUM_LIMIT`, each power-of-two range is split
/// into this many classes.
const CLASSES_PER_DOUBLING: usize = 4;
const MEDIUM_LIMIT: usize = 64 * 1024;
/// Above `MEDIUM_LIMIT`, blocks are whole pages.
const PAGE_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinnedMalloc;

impl BinnedMalloc {
    /// Returns the size class serving a request of `size` bytes, or `None`
    /// when the class size would overflow.
    pub fn bin_size(size: usize) -> Option<usize> {
        if size == 0 {
            Some(0)
        } else if size <= SMALL_LIMIT {
            Some(align_up(size, SMALL_STEP))
        } else if size <= MEDIUM_LIMIT {
            let upper = size.next_power_of_two();
            let step = upper / 2 / CLASSES_PER_DOUBLING;
            Some(align_up(size, step))
        } else {
            checked_align_up(size, PAGE_SIZE)
        }
    }

    fn committed_size(size: usize, alignment: usize) -> usize {
        Self::bin_size(size)
            .and_then(|bin| checked_align_up(bin, alignment.max(DEFAULT_ALIGNMENT)))
            .unwrap_or(size)
    }
}

unsafe impl Malloc for BinnedMalloc {
    unsafe fn realloc(
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        let old_committed = if ptr.is_some() {
            Self::committed_size(old_size, alignment)
        } else {
            0
        };
        let new_committed = Self::committed_size(new_size, alignment);
        if ptr.is_some() && new_size != 0 && old_committed == new_committed {
            return ptr;
        }
        unsafe { realloc_exact(ptr, old_committed, new_committed, alignment) }
    }

    #[inline]
    fn quantize_size(size: usize, alignment: usize) -> usize {
        Self::committed_size(size, alignment)
    }
}

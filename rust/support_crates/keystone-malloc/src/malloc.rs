use std::{alloc::Layout, ptr::NonNull};

use crate::align::checked_align_up;

/// Alignment applied to blocks whose owner did not ask for a specific one.
///
/// Matches the granularity of common system allocators, so quantizing to it
/// never reports headroom the allocator would not really hand out.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// A realloc-style raw memory primitive.
///
/// The functions are associated (no `self`) so that allocator policies can be
/// parameterized by a `Malloc` without storing anything for it.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - A returned block is valid for reads and writes of `new_size` bytes and is
///   aligned to at least `alignment`.
/// - On resize, the first `min(old_size, new_size)` bytes are preserved.
/// - `None` is returned if and only if `new_size == 0`.
/// - Allocation failure never returns; it terminates the process.
pub unsafe trait Malloc {
    /// Allocates, resizes or frees a raw block.
    ///
    /// - `ptr == None, new_size > 0`: allocates a fresh block.
    /// - `ptr == Some, new_size > 0`: resizes, preserving contents.
    /// - `ptr == Some, new_size == 0`: frees the block and returns `None`.
    /// - `ptr == None, new_size == 0`: returns `None` without touching the allocator.
    ///
    /// # Safety
    ///
    /// When `ptr` is `Some`, it must have been returned by this same `Malloc`
    /// for a block of exactly `old_size` bytes, allocated with the same
    /// `alignment`, and not freed since.
    unsafe fn realloc(
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> Option<NonNull<u8>>;

    /// Returns the number of bytes this allocator would actually commit for a
    /// request of `size` bytes at `alignment`. Always `>= size`, unless the
    /// rounded value would not fit in a `usize`, in which case `size` is
    /// returned unchanged.
    fn quantize_size(size: usize, alignment: usize) -> usize;
}

/// The process-wide Rust global allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemMalloc;

unsafe impl Malloc for SystemMalloc {
    unsafe fn realloc(
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        unsafe { realloc_exact(ptr, old_size, new_size, alignment) }
    }

    #[inline]
    fn quantize_size(size: usize, alignment: usize) -> usize {
        checked_align_up(size, alignment.max(DEFAULT_ALIGNMENT)).unwrap_or(size)
    }
}

/// Resizes a block through `std::alloc` without any rounding of the sizes.
///
/// # Safety
///
/// Same contract as [`Malloc::realloc`].
pub(crate) unsafe fn realloc_exact(
    ptr: Option<NonNull<u8>>,
    old_size: usize,
    new_size: usize,
    alignment: usize,
) -> Option<NonNull<u8>> {
    let alignment = alignment.max(1);
    match ptr {
        None => {
            if new_size == 0 {
                return None;
            }
            let layout = make_layout(new_size, alignment);
            let p = unsafe { std::alloc::alloc(layout) };
            Some(NonNull::new(p).unwrap_or_else(|| std::alloc::handle_alloc_error(layout)))
        }
        Some(p) => {
            debug_assert_ne!(old_size, 0);
            let old_layout = make_layout(old_size, alignment);
            if new_size == 0 {
                unsafe { std::alloc::dealloc(p.as_ptr(), old_layout) };
                return None;
            }
            if new_size == old_size {
                return Some(p);
            }
            // Validates that `new_size` rounded up to `alignment` fits in `isize`.
            let new_layout = make_layout(new_size, alignment);
            let q = unsafe { std::alloc::realloc(p.as_ptr(), old_layout, new_size) };
            Some(NonNull::new(q).unwrap_or_else(|| std::alloc::handle_alloc_error(new_layout)))
        }
    }
}

#[inline]
pub(crate) fn make_layout(size: usize, alignment: usize) -> Layout {
    Layout::from_size_align(size, alignment).unwrap_or_else(|_| capacity_overflow())
}

#[cold]
#[track_caller]
fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

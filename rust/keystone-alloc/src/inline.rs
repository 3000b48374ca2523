//! Small-buffer storage: the first `N` elements live inside the container
//! object, larger counts move to a secondary policy.

use std::{marker::PhantomData, mem::MaybeUninit};

use crate::{
    heap::HeapAllocator,
    policy::{AllocatorPolicy, ElementAllocator, SizeType},
};

/// Policy with an inline buffer of `N` elements that falls back to
/// `Secondary` once more than `N` elements are needed.
///
/// Element storage is in exactly one place at a time. When the count drops
/// back to `N` or below, the elements are relocated into the inline buffer
/// and the secondary storage is released. The secondary may itself be an
/// inline policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineAllocator<const N: usize, Secondary: AllocatorPolicy = HeapAllocator>(
    PhantomData<Secondary>,
);

impl<const N: usize, Secondary: AllocatorPolicy> AllocatorPolicy
    for InlineAllocator<N, Secondary>
{
    const SUPPORTS_MOVE: bool = Secondary::SUPPORTS_MOVE;
    const IS_ZERO_CONSTRUCT: bool = false;
    const NEEDS_ELEMENT_TYPE: bool = true;

    type ForElementType<T> = InlineStorage<T, N, Secondary::ForElementType<T>>;
}

/// Per-element storage of [`InlineAllocator`].
pub struct InlineStorage<T, const N: usize, S> {
    inline: [MaybeUninit<T>; N],
    secondary: S,
    spilled: bool,
}

impl<T, const N: usize, S: ElementAllocator<T>> InlineStorage<T, N, S> {
    /// `N` as an element count.
    pub const INLINE_COUNT: SizeType = {
        assert!(N <= SizeType::MAX as usize, "inline element count does not fit in SizeType");
        N as SizeType
    };

    /// Whether the elements currently live in the secondary allocation.
    #[inline]
    pub fn is_spilled(&self) -> bool {
        self.spilled
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Address of the inline buffer, whether or not it is in use.
    #[inline]
    pub fn inline_ptr(&self) -> *const T {
        self.inline.as_ptr().cast()
    }
}

impl<T, const N: usize, S: Default> Default for InlineStorage<T, N, S> {
    fn default() -> Self {
        InlineStorage {
            inline: [const { MaybeUninit::uninit() }; N],
            secondary: S::default(),
            spilled: false,
        }
    }
}

impl<T, const N: usize, S: std::fmt::Debug> std::fmt::Debug for InlineStorage<T, N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineStorage")
            .field("inline_count", &N)
            .field("secondary", &self.secondary)
            .field("spilled", &self.spilled)
            .finish()
    }
}

unsafe impl<T, const N: usize, S: ElementAllocator<T>> ElementAllocator<T>
    for InlineStorage<T, N, S>
{
    #[inline]
    fn allocation(&self) -> *const T {
        if self.spilled {
            self.secondary.allocation()
        } else {
            self.inline_ptr()
        }
    }

    #[inline]
    fn allocation_mut(&mut self) -> *mut T {
        if self.spilled {
            self.secondary.allocation_mut()
        } else {
            self.inline.as_mut_ptr().cast()
        }
    }

    #[inline]
    fn has_allocation(&self) -> bool {
        self.spilled
    }

    fn initial_capacity(&self) -> SizeType {
        Self::INLINE_COUNT
    }

    unsafe fn resize_allocation(
        &mut self,
        previous_count: SizeType,
        new_count: SizeType,
        bytes_per_element: usize,
    ) {
        if new_count <= Self::INLINE_COUNT {
            if self.spilled {
                let keep = previous_count.min(new_count).max(0) as usize;
                let src = self.secondary.allocation();
                let dst = self.inline.as_mut_ptr().cast::<T>();
                // SAFETY: the secondary storage holds at least `previous_count`
                // elements and the inline buffer has room for `new_count`.
                unsafe {
                    relocate(src, dst, keep);
                    self.secondary.resize_allocation(0, 0, bytes_per_element);
                }
                self.spilled = false;
            }
        } else if self.spilled {
            // SAFETY: forwarded contract.
            unsafe {
                self.secondary
                    .resize_allocation(previous_count, new_count, bytes_per_element)
            };
        } else {
            // SAFETY: the secondary storage is empty, so nothing needs to be
            // preserved while it is sized.
            unsafe { self.secondary.resize_allocation(0, new_count, bytes_per_element) };
            let keep = previous_count.min(Self::INLINE_COUNT).max(0) as usize;
            let src = self.inline.as_ptr().cast::<T>();
            let dst = self.secondary.allocation_mut();
            // SAFETY: the inline buffer holds `keep` initialized elements and
            // the secondary has room for `new_count > keep`.
            unsafe { relocate(src, dst, keep) };
            self.spilled = true;
        }
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_reserve(
        &self,
        element_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        if element_count <= Self::INLINE_COUNT {
            Self::INLINE_COUNT
        } else {
            self.secondary
                .calculate_slack_reserve(element_count, bytes_per_element)
        }
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_shrink(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        if element_count <= Self::INLINE_COUNT {
            Self::INLINE_COUNT
        } else {
            self.secondary
                .calculate_slack_shrink(element_count, allocated_count, bytes_per_element)
        }
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_grow(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        if element_count <= Self::INLINE_COUNT {
            Self::INLINE_COUNT
        } else {
            self.secondary
                .calculate_slack_grow(element_count, allocated_count, bytes_per_element)
        }
    }

    fn allocated_size(&self, allocated_count: SizeType, bytes_per_element: usize) -> usize {
        if self.spilled {
            self.secondary
                .allocated_size(allocated_count, bytes_per_element)
        } else {
            0
        }
    }

    fn move_to_empty(&mut self, other: &mut Self) {
        debug_assert!(!std::ptr::eq(self, other));
        debug_assert!(!self.spilled);
        if !other.spilled {
            // The caller owns the elements and their count; relocating every
            // slot moves whatever prefix is initialized.
            self.inline = std::mem::replace(
                &mut other.inline,
                [const { MaybeUninit::uninit() }; N],
            );
        }
        self.secondary.move_to_empty(&mut other.secondary);
        self.spilled = std::mem::take(&mut other.spilled);
    }
}

/// Moves `count` elements between two distinct buffers.
///
/// # Safety
///
/// `src` must hold `count` initialized elements and `dst` must be valid for
/// `count` writes. Both may be null only if no bytes are copied.
unsafe fn relocate<T>(src: *const T, dst: *mut T, count: usize) {
    if count == 0 || std::mem::size_of::<T>() == 0 {
        return;
    }
    unsafe { std::ptr::copy_nonoverlapping(src, dst, count) };
}

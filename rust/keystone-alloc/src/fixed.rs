//! Inline-only storage with a hard capacity.

use std::mem::MaybeUninit;

use crate::policy::{AllocatorPolicy, ElementAllocator, SizeType};

/// Policy storing up to `N` elements inside the container object and never
/// allocating. Asking for more than `N` elements is a contract violation by
/// the container (checked in debug builds).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAllocator<const N: usize>;

impl<const N: usize> AllocatorPolicy for FixedAllocator<N> {
    const SUPPORTS_MOVE: bool = true;
    const IS_ZERO_CONSTRUCT: bool = false;
    const NEEDS_ELEMENT_TYPE: bool = true;

    type ForElementType<T> = FixedStorage<T, N>;
}

pub struct FixedStorage<T, const N: usize> {
    slots: [MaybeUninit<T>; N],
}

impl<T, const N: usize> FixedStorage<T, N> {
    pub const CAPACITY: SizeType = {
        assert!(N <= SizeType::MAX as usize, "fixed element count does not fit in SizeType");
        N as SizeType
    };
}

impl<T, const N: usize> Default for FixedStorage<T, N> {
    fn default() -> Self {
        FixedStorage {
            slots: [const { MaybeUninit::uninit() }; N],
        }
    }
}

impl<T, const N: usize> std::fmt::Debug for FixedStorage<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedStorage").field("capacity", &N).finish()
    }
}

unsafe impl<T, const N: usize> ElementAllocator<T> for FixedStorage<T, N> {
    #[inline]
    fn allocation(&self) -> *const T {
        self.slots.as_ptr().cast()
    }

    #[inline]
    fn allocation_mut(&mut self) -> *mut T {
        self.slots.as_mut_ptr().cast()
    }

    #[inline]
    fn has_allocation(&self) -> bool {
        false
    }

    fn initial_capacity(&self) -> SizeType {
        Self::CAPACITY
    }

    unsafe fn resize_allocation(
        &mut self,
        _previous_count: SizeType,
        new_count: SizeType,
        _bytes_per_element: usize,
    ) {
        debug_assert!(
            new_count <= Self::CAPACITY,
            "fixed allocator of {N} elements asked for {new_count}"
        );
    }

    fn calculate_slack_reserve(&self, _element_count: SizeType, _bytes_per_element: usize) -> SizeType {
        Self::CAPACITY
    }

    fn calculate_slack_shrink(
        &self,
        _element_count: SizeType,
        _allocated_count: SizeType,
        _bytes_per_element: usize,
    ) -> SizeType {
        Self::CAPACITY
    }

    fn calculate_slack_grow(
        &self,
        _element_count: SizeType,
        _allocated_count: SizeType,
        _bytes_per_element: usize,
    ) -> SizeType {
        Self::CAPACITY
    }

    fn allocated_size(&self, _allocated_count: SizeType, _bytes_per_element: usize) -> usize {
        0
    }

    fn move_to_empty(&mut self, other: &mut Self) {
        debug_assert!(!std::ptr::eq(self, other));
        self.slots = std::mem::replace(&mut other.slots, [const { MaybeUninit::uninit() }; N]);
    }
}

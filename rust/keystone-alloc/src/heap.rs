//! Indirect allocation: elements live in one heap block that is resized with
//! a realloc-style call.

use std::{marker::PhantomData, ptr::NonNull};

use keystone_malloc::{DEFAULT_ALIGNMENT, Malloc, SystemMalloc};

use crate::{
    growth::GrowthPolicy,
    policy::{AllocatorPolicy, ElementAllocator, SizeType},
};

/// Policy storing elements in a heap block aligned to [`DEFAULT_ALIGNMENT`]
/// (or the element alignment, if larger).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator<M: Malloc = SystemMalloc>(PhantomData<M>);

/// Policy storing elements in a heap block aligned to at least `ALIGNMENT`
/// bytes. `ALIGNMENT` must be a power of two.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignedHeapAllocator<const ALIGNMENT: usize, M: Malloc = SystemMalloc>(PhantomData<M>);

impl<M: Malloc> AllocatorPolicy for HeapAllocator<M> {
    const SUPPORTS_MOVE: bool = true;
    const IS_ZERO_CONSTRUCT: bool = true;
    const NEEDS_ELEMENT_TYPE: bool = false;

    type ForElementType<T> = HeapStorage<T, DEFAULT_ALIGNMENT, M>;
}

impl<const ALIGNMENT: usize, M: Malloc> AllocatorPolicy for AlignedHeapAllocator<ALIGNMENT, M> {
    const SUPPORTS_MOVE: bool = true;
    const IS_ZERO_CONSTRUCT: bool = true;
    const NEEDS_ELEMENT_TYPE: bool = false;

    type ForElementType<T> = HeapStorage<T, ALIGNMENT, M>;
}

/// An owned, untyped heap block.
///
/// The block remembers its committed size and alignment so that it can be
/// resized and freed through [`Malloc::realloc`]. An all-zero value (no
/// pointer, zero size) is a valid empty block.
pub struct RawHeapBlock<M: Malloc = SystemMalloc> {
    data: Option<NonNull<u8>>,
    size: usize,
    alignment: usize,
    _malloc: PhantomData<M>,
}

// The block is exclusively owned, like the buffer of a `Vec<u8>`.
unsafe impl<M: Malloc> Send for RawHeapBlock<M> {}

unsafe impl<M: Malloc> Sync for RawHeapBlock<M> {}

impl<M: Malloc> RawHeapBlock<M> {
    pub const fn new() -> Self {
        RawHeapBlock {
            data: None,
            size: 0,
            alignment: 0,
            _malloc: PhantomData,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.data
    }

    /// Committed size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    /// Resizes the block to `new_size` bytes at `alignment`, preserving the
    /// first `min(size, new_size)` bytes. A size of zero frees the block.
    pub fn resize(&mut self, new_size: usize, alignment: usize) {
        // `realloc(None, 0)` is never issued: resizing an empty block to
        // nothing is a no-op.
        if self.data.is_none() && new_size == 0 {
            return;
        }
        if self.data.is_some() && new_size != 0 && alignment != self.alignment {
            self.realign(new_size, alignment);
            return;
        }
        let alignment = if self.data.is_some() {
            self.alignment
        } else {
            alignment
        };
        // SAFETY: `data` was produced by `M` with `size` and `alignment`.
        self.data = unsafe { M::realloc(self.data, self.size, new_size, alignment) };
        self.set_committed(new_size, alignment);
    }

    /// Frees the block, if any.
    pub fn free(&mut self) {
        self.resize(0, self.alignment);
    }

    /// Frees any block owned by `self`, then takes ownership of the block of
    /// `other`, leaving `other` empty.
    pub fn move_to_empty(&mut self, other: &mut Self) {
        debug_assert!(!std::ptr::eq(self, other));
        self.free();
        self.data = other.data.take();
        self.size = std::mem::take(&mut other.size);
        self.alignment = std::mem::take(&mut other.alignment);
    }

    /// Moves the contents into a new block with a different alignment.
    fn realign(&mut self, new_size: usize, alignment: usize) {
        // SAFETY: allocating a fresh block.
        let fresh = unsafe { M::realloc(None, 0, new_size, alignment) };
        if let (Some(src), Some(dst)) = (self.data, fresh) {
            // SAFETY: both blocks are valid for the copied length and distinct.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src.as_ptr(),
                    dst.as_ptr(),
                    self.size.min(new_size),
                )
            };
        }
        self.free();
        self.data = fresh;
        self.set_committed(new_size, alignment);
    }

    #[inline]
    fn set_committed(&mut self, size: usize, alignment: usize) {
        if self.data.is_some() {
            self.size = size;
            self.alignment = alignment;
        } else {
            self.size = 0;
            self.alignment = 0;
        }
    }
}

impl<M: Malloc> Default for RawHeapBlock<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Malloc> Drop for RawHeapBlock<M> {
    fn drop(&mut self) {
        self.free();
    }
}

impl<M: Malloc> std::fmt::Debug for RawHeapBlock<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHeapBlock")
            .field("data", &self.data)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .finish()
    }
}

/// Per-element view of a heap policy: a [`RawHeapBlock`] sized in elements
/// of `T`.
pub struct HeapStorage<T, const ALIGNMENT: usize, M: Malloc = SystemMalloc> {
    block: RawHeapBlock<M>,
    _marker: PhantomData<T>,
}

impl<T, const ALIGNMENT: usize, M: Malloc> HeapStorage<T, ALIGNMENT, M> {
    /// Alignment of the block: the requested one, raised to the element's.
    pub const BLOCK_ALIGNMENT: usize = {
        assert!(ALIGNMENT.is_power_of_two(), "heap alignment must be a power of two");
        if ALIGNMENT > std::mem::align_of::<T>() {
            ALIGNMENT
        } else {
            std::mem::align_of::<T>()
        }
    };

    pub const fn new() -> Self {
        HeapStorage {
            block: RawHeapBlock::new(),
            _marker: PhantomData,
        }
    }

    pub fn block(&self) -> &RawHeapBlock<M> {
        &self.block
    }
}

impl<T, const ALIGNMENT: usize, M: Malloc> Default for HeapStorage<T, ALIGNMENT, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const ALIGNMENT: usize, M: Malloc> std::fmt::Debug for HeapStorage<T, ALIGNMENT, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapStorage")
            .field("block", &self.block)
            .finish()
    }
}

unsafe impl<T, const ALIGNMENT: usize, M: Malloc> ElementAllocator<T>
    for HeapStorage<T, ALIGNMENT, M>
{
    #[inline]
    fn allocation(&self) -> *const T {
        self.block
            .as_ptr()
            .map_or(std::ptr::null(), |p| p.as_ptr().cast::<T>().cast_const())
    }

    #[inline]
    fn allocation_mut(&mut self) -> *mut T {
        self.block
            .as_ptr()
            .map_or(std::ptr::null_mut(), |p| p.as_ptr().cast::<T>())
    }

    #[inline]
    fn has_allocation(&self) -> bool {
        self.block.is_allocated()
    }

    unsafe fn resize_allocation(
        &mut self,
        _previous_count: SizeType,
        new_count: SizeType,
        bytes_per_element: usize,
    ) {
        let new_size = byte_size(new_count, bytes_per_element);
        self.block.resize(new_size, Self::BLOCK_ALIGNMENT);
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_reserve(
        &self,
        element_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        GrowthPolicy::current().slack_reserve::<M>(
            element_count,
            bytes_per_element,
            true,
            Self::BLOCK_ALIGNMENT,
        )
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_shrink(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        GrowthPolicy::current().slack_shrink::<M>(
            element_count,
            allocated_count,
            bytes_per_element,
            true,
            Self::BLOCK_ALIGNMENT,
        )
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn calculate_slack_grow(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType {
        GrowthPolicy::current().slack_grow::<M>(
            element_count,
            allocated_count,
            bytes_per_element,
            true,
            Self::BLOCK_ALIGNMENT,
        )
    }

    fn allocated_size(&self, allocated_count: SizeType, bytes_per_element: usize) -> usize {
        allocated_count.max(0) as usize * bytes_per_element
    }

    fn move_to_empty(&mut self, other: &mut Self) {
        self.block.move_to_empty(&mut other.block);
    }
}

/// Byte size of `count` elements; panics if it does not fit in a `usize`.
#[inline]
pub(crate) fn byte_size(count: SizeType, bytes_per_element: usize) -> usize {
    debug_assert!(count >= 0);
    (count.max(0) as usize)
        .checked_mul(bytes_per_element)
        .unwrap_or_else(|| capacity_overflow())
}

#[cold]
#[track_caller]
pub(crate) fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

#[cfg(test)]
mod tests {
    use keystone_malloc::{BinnedMalloc, align::is_ptr_aligned};

    use super::*;

    type Storage<T> = <HeapAllocator as AllocatorPolicy>::ForElementType<T>;

    fn write_sequence(storage: &mut Storage<u32>, count: usize) {
        let p = storage.allocation_mut();
        for i in 0..count {
            unsafe { p.add(i).write(i as u32 * 10) };
        }
    }

    fn read_sequence(storage: &Storage<u32>, count: usize) -> Vec<u32> {
        unsafe { std::slice::from_raw_parts(storage.allocation(), count).to_vec() }
    }

    #[test]
    fn test_empty_state() {
        let storage = Storage::<u64>::default();
        assert!(!storage.has_allocation());
        assert!(storage.allocation().is_null());
        assert_eq!(storage.initial_capacity(), 0);
        assert_eq!(storage.block().size(), 0);
    }

    #[test]
    fn test_policy_traits() {
        assert!(<HeapAllocator as AllocatorPolicy>::SUPPORTS_MOVE);
        assert!(<HeapAllocator as AllocatorPolicy>::IS_ZERO_CONSTRUCT);
        assert!(!<HeapAllocator as AllocatorPolicy>::NEEDS_ELEMENT_TYPE);
        assert!(<AlignedHeapAllocator<64> as AllocatorPolicy>::IS_ZERO_CONSTRUCT);
    }

    #[test]
    fn test_zeroed_value_is_empty() {
        // An all-zero bit pattern is a valid empty allocator.
        let storage: Storage<u32> = unsafe { std::mem::zeroed() };
        assert!(!storage.has_allocation());
        assert!(storage.allocation().is_null());
    }

    #[test]
    fn test_resize_lifecycle() {
        let mut storage = Storage::<u32>::default();
        unsafe { storage.resize_allocation(0, 0, 4) };
        assert!(!storage.has_allocation());

        unsafe { storage.resize_allocation(0, 8, 4) };
        assert!(storage.has_allocation());
        assert_eq!(storage.block().size(), 32);
        write_sequence(&mut storage, 8);

        unsafe { storage.resize_allocation(8, 1000, 4) };
        assert_eq!(read_sequence(&storage, 8), vec![0, 10, 20, 30, 40, 50, 60, 70]);

        unsafe { storage.resize_allocation(8, 3, 4) };
        assert_eq!(read_sequence(&storage, 3), vec![0, 10, 20]);

        unsafe { storage.resize_allocation(3, 0, 4) };
        assert!(!storage.has_allocation());
        assert!(storage.allocation().is_null());
    }

    #[test]
    fn test_resize_same_count_preserves_contents() {
        let mut storage = Storage::<u32>::default();
        unsafe { storage.resize_allocation(0, 16, 4) };
        write_sequence(&mut storage, 16);
        let before = storage.allocation();
        unsafe { storage.resize_allocation(16, 16, 4) };
        assert_eq!(storage.allocation(), before);
        assert_eq!(read_sequence(&storage, 16)[15], 150);
    }

    #[test]
    fn test_move_to_empty() {
        let mut source = Storage::<u32>::default();
        unsafe { source.resize_allocation(0, 4, 4) };
        write_sequence(&mut source, 4);
        let ptr = source.allocation();

        let mut target = Storage::<u32>::default();
        target.move_to_empty(&mut source);
        assert_eq!(target.allocation(), ptr);
        assert!(!source.has_allocation());
        assert_eq!(read_sequence(&target, 4), vec![0, 10, 20, 30]);

        // The source stays usable.
        unsafe { source.resize_allocation(0, 2, 4) };
        assert!(source.has_allocation());
    }

    #[test]
    fn test_aligned_heap() {
        let mut storage = <AlignedHeapAllocator<256> as AllocatorPolicy>::ForElementType::<u8>::default();
        for count in [1, 17, 4000, 3] {
            unsafe { storage.resize_allocation(0, count, 1) };
            assert!(is_ptr_aligned(storage.allocation(), 256));
        }
        assert_eq!(
            <HeapStorage<u8, 256, SystemMalloc>>::BLOCK_ALIGNMENT,
            256
        );
        // Quantization happens against the requested alignment.
        assert_eq!(storage.calculate_slack_reserve(10, 1), 256);
    }

    #[test]
    fn test_element_alignment_wins() {
        #[repr(align(64))]
        struct Wide([u8; 64]);
        assert_eq!(<Storage<Wide>>::BLOCK_ALIGNMENT, 64);
        assert_eq!(<Storage<u8>>::BLOCK_ALIGNMENT, DEFAULT_ALIGNMENT);

        let mut storage = Storage::<Wide>::default();
        unsafe { storage.resize_allocation(0, 3, std::mem::size_of::<Wide>()) };
        assert!(is_ptr_aligned(storage.allocation(), 64));
        unsafe { storage.allocation_mut().write(Wide([7; 64])) };
        assert_eq!(unsafe { (*storage.allocation()).0[63] }, 7);
    }

    #[test]
    fn test_block_realign_keeps_bytes() {
        let mut block = RawHeapBlock::<SystemMalloc>::new();
        block.resize(8, 16);
        unsafe { block.as_ptr().unwrap().as_ptr().write_bytes(9, 8) };
        block.resize(16, 128);
        let p = block.as_ptr().unwrap();
        assert!(is_ptr_aligned(p.as_ptr(), 128));
        assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), 8) }, &[9; 8]);
    }

    #[test]
    fn test_slack_uses_quantization() {
        let storage = Storage::<u32>::default();
        assert_eq!(storage.calculate_slack_grow(1, 0, 4), 4);
        assert_eq!(storage.calculate_slack_grow(5, 4, 4), 24);
        assert_eq!(storage.calculate_slack_shrink(10, 1000, 4), 12);
        assert_eq!(storage.calculate_slack_reserve(10, 4), 12);
        assert_eq!(storage.allocated_size(24, 4), 96);

        let binned = <HeapAllocator<BinnedMalloc> as AllocatorPolicy>::ForElementType::<u32>::default();
        assert_eq!(binned.calculate_slack_grow(100, 4, 4), 160);
    }

    #[test]
    fn test_zero_sized_elements_never_allocate() {
        let mut storage = Storage::<()>::default();
        unsafe { storage.resize_allocation(0, 100, 0) };
        assert!(!storage.has_allocation());
        assert_eq!(storage.allocated_size(100, 0), 0);
    }
}

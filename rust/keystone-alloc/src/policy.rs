//! The contract between containers and allocation policies.

/// Signed 32-bit element count used by all policies and containers.
///
/// Element counts and capacities are always non-negative; the signed type
/// keeps the arithmetic of the slack calculations (and its overflow clamp)
/// explicit.
pub type SizeType = i32;

/// A container allocation strategy, chosen as a type parameter of the container.
///
/// The policy type itself holds no state. Each container instance embeds one
/// [`ForElementType`](AllocatorPolicy::ForElementType) value that owns the
/// storage for its elements.
pub trait AllocatorPolicy {
    /// The allocator can be transferred between containers with
    /// [`ElementAllocator::move_to_empty`] without touching the elements.
    const SUPPORTS_MOVE: bool = false;

    /// An all-zero bit pattern is a valid, empty per-element allocator.
    const IS_ZERO_CONSTRUCT: bool = false;

    /// The storage layout depends on the element type (inline buffers do;
    /// heap blocks are raw bytes).
    const NEEDS_ELEMENT_TYPE: bool = true;

    /// The per-container allocator for elements of type `T`.
    type ForElementType<T>: ElementAllocator<T>;
}

/// The storage of a single container.
///
/// All counts are in elements; `bytes_per_element` is always
/// `size_of::<T>()` and is passed through so that element-type-erased
/// allocators can size raw blocks.
///
/// # Safety
///
/// Implementors must guarantee that after
/// `resize_allocation(previous, new, size_of::<T>())` returns:
/// - `allocation_mut()` points to storage valid for reads and writes of `new`
///   elements of `T`, aligned for `T` (it may be null only while no storage is
///   committed, which for element types with non-zero size means `new == 0`);
/// - the first `min(previous, new)` elements hold the bytes they held before
///   the call (relocated, never duplicated);
/// - the storage does not move again until the next `resize_allocation` or
///   `move_to_empty`, or until the allocator value itself is moved.
pub unsafe trait ElementAllocator<T>: Default {
    /// Base address of the live storage, independent of the element count.
    fn allocation(&self) -> *const T;

    /// Mutable base address of the live storage.
    fn allocation_mut(&mut self) -> *mut T;

    /// Whether the elements live outside the allocator's own inline buffer
    /// (for heap allocators: whether a block is held).
    fn has_allocation(&self) -> bool;

    /// Number of slots usable before the first `resize_allocation`.
    fn initial_capacity(&self) -> SizeType {
        0
    }

    /// Resizes the storage to hold exactly `new_count` elements, preserving the
    /// first `min(previous_count, new_count)` elements.
    ///
    /// # Safety
    ///
    /// - `previous_count` must not exceed the number of slots the storage held
    ///   before the call.
    /// - Elements at or beyond `new_count` must already have been dropped or
    ///   moved out by the caller; they are not preserved.
    /// - `bytes_per_element` must equal `size_of::<T>()`.
    unsafe fn resize_allocation(
        &mut self,
        previous_count: SizeType,
        new_count: SizeType,
        bytes_per_element: usize,
    );

    /// Capacity to allocate when exactly `element_count` elements are wanted.
    fn calculate_slack_reserve(&self, element_count: SizeType, bytes_per_element: usize)
    -> SizeType;

    /// Capacity to keep after the element count dropped to `element_count`.
    /// Returns `allocated_count` when no reallocation should happen.
    fn calculate_slack_shrink(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType;

    /// Capacity to allocate when the element count grows past `allocated_count`.
    fn calculate_slack_grow(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
    ) -> SizeType;

    /// Bytes committed outside the owning object, for memory accounting.
    fn allocated_size(&self, allocated_count: SizeType, bytes_per_element: usize) -> usize;

    /// Takes over the storage of `other`, leaving it empty and reusable.
    ///
    /// `self` must be empty beforehand. The elements stored in `other` are
    /// relocated, not copied: the caller transfers their ownership along with
    /// their count and capacity.
    fn move_to_empty(&mut self, other: &mut Self);
}

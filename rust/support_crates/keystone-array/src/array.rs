use std::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};

use keystone_alloc::{AllocatorPolicy, ElementAllocator, HeapAllocator, SizeType};

/// A growable array storing its elements through the allocator policy `A`.
///
/// Capacity changes are decided by the policy:
/// - appending past the capacity asks for grow slack,
/// - removing elements asks for shrink slack (which usually keeps the
///   current capacity),
/// - [`reserve`](Array::reserve), [`with_capacity`](Array::with_capacity)
///   and [`shrink_to_fit`](Array::shrink_to_fit) ask for reserve slack.
///
/// Lengths are limited to [`SizeType::MAX`] elements.
pub struct Array<T, A: AllocatorPolicy = HeapAllocator> {
    storage: A::ForElementType<T>,
    len: SizeType,
    capacity: SizeType,
    _marker: PhantomData<T>,
}

impl<T, A: AllocatorPolicy> Array<T, A> {
    const BYTES_PER_ELEMENT: usize = std::mem::size_of::<T>();

    /// Creates an empty array. Allocates nothing; policies with inline
    /// storage start with their inline capacity.
    pub fn new() -> Self {
        let storage = A::ForElementType::<T>::default();
        let capacity = storage.initial_capacity();
        Array {
            storage,
            len: 0,
            capacity,
            _marker: PhantomData,
        }
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut array = Self::new();
        array.reserve(capacity);
        array
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the array can hold before it has to grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Bytes committed by the policy outside of the array object.
    pub fn allocated_size(&self) -> usize {
        self.storage
            .allocated_size(self.capacity, Self::BYTES_PER_ELEMENT)
    }

    /// Whether the elements live outside the array object.
    pub fn has_allocation(&self) -> bool {
        self.storage.has_allocation()
    }

    /// Pointer to the first element. Never null; dangling while no storage is
    /// committed.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        let ptr = self.storage.allocation();
        if ptr.is_null() {
            NonNull::dangling().as_ptr()
        } else {
            ptr
        }
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        let ptr = self.storage.allocation_mut();
        if ptr.is_null() {
            NonNull::dangling().as_ptr()
        } else {
            ptr
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        // SAFETY: the first `len` slots are initialized.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }

    /// Raw bytes of the elements.
    pub fn as_bytes(&self) -> &[u8]
    where
        T: bytemuck::NoUninit,
    {
        bytemuck::cast_slice(self.as_slice())
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn push(&mut self, value: T) {
        if self.len == self.capacity {
            self.grow_to(to_count(self.len() + 1));
        }
        // SAFETY: `len < capacity` after the grow.
        unsafe { self.as_mut_ptr().add(self.len()).write(value) };
        self.len += 1;
    }

    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old `len - 1` is initialized and no longer
        // counted.
        let value = unsafe { self.as_ptr().add(self.len()).read() };
        self.shrink_slack();
        Some(value)
    }

    /// Inserts `value` at `index`, shifting the following elements up.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.len();
        assert!(index <= len, "insertion index {index} is out of bounds for length {len}");
        if self.len == self.capacity {
            self.grow_to(to_count(len + 1));
        }
        // SAFETY: there is room for one more element; the shifted range is
        // initialized.
        unsafe {
            let p = self.as_mut_ptr().add(index);
            ptr::copy(p, p.add(1), len - index);
            p.write(value);
        }
        self.len += 1;
    }

    /// Removes the element at `index`, shifting the following elements down.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len();
        assert!(index < len, "removal index {index} is out of bounds for length {len}");
        // SAFETY: `index` is in bounds; the tail is moved down by one.
        let value = unsafe {
            let p = self.as_mut_ptr().add(index);
            let value = p.read();
            ptr::copy(p.add(1), p, len - index - 1);
            value
        };
        self.len -= 1;
        self.shrink_slack();
        value
    }

    /// Removes the element at `index`, replacing it with the last element.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.len();
        assert!(index < len, "swap_remove index {index} is out of bounds for length {len}");
        // SAFETY: `index` and `len - 1` are in bounds.
        let value = unsafe {
            let base = self.as_mut_ptr();
            let value = base.add(index).read();
            ptr::copy(base.add(len - 1), base.add(index), 1);
            value
        };
        self.len -= 1;
        self.shrink_slack();
        value
    }

    /// Drops the elements past `len`. No effect if `len` is not smaller than
    /// the current length.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        let tail_len = self.len() - len;
        self.len = len as SizeType;
        // SAFETY: the tail is initialized and no longer counted.
        unsafe {
            let tail = ptr::slice_from_raw_parts_mut(self.as_mut_ptr().add(len), tail_len);
            ptr::drop_in_place(tail);
        }
        self.shrink_slack();
    }

    /// Drops all elements, releasing the storage as the shrink slack decides.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Drops all elements and keeps the capacity.
    pub fn reset(&mut self) {
        let len = self.len();
        self.len = 0;
        // SAFETY: the elements are initialized and no longer counted.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.as_mut_ptr(), len));
        }
    }

    /// Makes room for at least `additional` more elements.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len()
            .checked_add(additional)
            .map_or_else(|| capacity_overflow(), to_count);
        if required > self.capacity {
            self.resize_to(required);
        }
    }

    /// Reduces the capacity to what the policy reserves for the current
    /// length.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn shrink_to_fit(&mut self) {
        if self.capacity != self.len {
            self.resize_to(self.len);
        }
    }

    /// Appends clones of all elements of `other`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn extend_from_slice(&mut self, other: &[T])
    where
        T: Clone,
    {
        let required = self
            .len()
            .checked_add(other.len())
            .map_or_else(|| capacity_overflow(), to_count);
        if required > self.capacity {
            self.grow_to(required);
        }
        for value in other {
            // SAFETY: capacity covers `required` elements.
            unsafe { self.as_mut_ptr().add(self.len()).write(value.clone()) };
            self.len += 1;
        }
    }

    /// Moves the contents into a new array without touching the elements,
    /// leaving `self` empty.
    pub fn take(&mut self) -> Self {
        const { assert!(A::SUPPORTS_MOVE, "allocator policy does not support moves") };
        let mut taken = Self::new();
        taken.storage.move_to_empty(&mut self.storage);
        taken.len = std::mem::take(&mut self.len);
        taken.capacity = std::mem::replace(&mut self.capacity, self.storage.initial_capacity());
        taken
    }

    /// Grows the storage for `required > capacity` elements.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn grow_to(&mut self, required: SizeType) {
        debug_assert!(required > self.capacity);
        let new_capacity =
            self.storage
                .calculate_slack_grow(required, self.capacity, Self::BYTES_PER_ELEMENT);
        self.reallocate(new_capacity, required);
    }

    /// Sets the capacity to the reserve slack for `new_max` elements.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn resize_to(&mut self, new_max: SizeType) {
        let new_capacity = if new_max > 0 {
            self.storage
                .calculate_slack_reserve(new_max, Self::BYTES_PER_ELEMENT)
        } else {
            0
        };
        if new_capacity != self.capacity {
            self.reallocate(new_capacity, new_max);
        }
    }

    /// Gives unused capacity back if the shrink slack says so.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn shrink_slack(&mut self) {
        if self.len < self.capacity {
            let new_capacity = self.storage.calculate_slack_shrink(
                self.len,
                self.capacity,
                Self::BYTES_PER_ELEMENT,
            );
            if new_capacity != self.capacity {
                self.reallocate(new_capacity, self.len);
            }
        }
    }

    fn reallocate(&mut self, new_capacity: SizeType, required: SizeType) {
        // Slack results are trusted for sizing only; the elements written
        // afterwards must fit.
        assert!(
            new_capacity >= required && new_capacity >= self.len,
            "allocator provided {new_capacity} slots for {required} elements"
        );
        // SAFETY: `len` slots are initialized and within both capacities.
        unsafe {
            self.storage
                .resize_allocation(self.len, new_capacity, Self::BYTES_PER_ELEMENT)
        };
        self.capacity = new_capacity;
    }
}

#[inline]
fn to_count(n: usize) -> SizeType {
    SizeType::try_from(n).unwrap_or_else(|_| capacity_overflow())
}

#[cold]
#[track_caller]
fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

impl<T, A: AllocatorPolicy> Drop for Array<T, A> {
    fn drop(&mut self) {
        // SAFETY: the first `len` slots are initialized; the storage itself
        // is released by the allocator's own drop.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.as_mut_ptr(),
                self.len(),
            ))
        };
    }
}

impl<T, A: AllocatorPolicy> Default for Array<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: AllocatorPolicy> Deref for Array<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: AllocatorPolicy> DerefMut for Array<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, A: AllocatorPolicy> AsRef<[T]> for Array<T, A> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Clone, A: AllocatorPolicy> Clone for Array<T, A> {
    fn clone(&self) -> Self {
        let mut array = Self::new();
        array.reserve(self.len());
        array.extend_from_slice(self);
        array
    }
}

impl<T: fmt::Debug, A: AllocatorPolicy> fmt::Debug for Array<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, A: AllocatorPolicy> Extend<T> for Array<T, A> {
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let required = to_count(self.len().saturating_add(lower));
        if required > self.capacity {
            self.grow_to(required);
        }
        for value in iter {
            self.push(value);
        }
    }
}

impl<'a, T: Copy + 'a, A: AllocatorPolicy> Extend<&'a T> for Array<T, A> {
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T, A: AllocatorPolicy> FromIterator<T> for Array<T, A> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        array.extend(iter);
        array
    }
}

impl<T: Clone, A: AllocatorPolicy> From<&[T]> for Array<T, A> {
    fn from(values: &[T]) -> Self {
        let mut array = Self::new();
        array.reserve(values.len());
        array.extend_from_slice(values);
        array
    }
}

impl<T, A, B> PartialEq<Array<T, B>> for Array<T, A>
where
    T: PartialEq,
    A: AllocatorPolicy,
    B: AllocatorPolicy,
{
    fn eq(&self, other: &Array<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq, A: AllocatorPolicy> PartialEq<[T]> for Array<T, A> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: PartialEq, A: AllocatorPolicy, const N: usize> PartialEq<[T; N]> for Array<T, A> {
    fn eq(&self, other: &[T; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq, A: AllocatorPolicy> Eq for Array<T, A> {}

impl<'a, T, A: AllocatorPolicy> IntoIterator for &'a Array<T, A> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: AllocatorPolicy> IntoIterator for &'a mut Array<T, A> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

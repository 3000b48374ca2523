use std::{cell::Cell, rc::Rc};

use keystone_alloc::{
    AlignedHeapAllocator, FixedAllocator, HeapAllocator, InlineAllocator,
    InlineSparseArrayAllocator, SparseArrayAllocatorConfig,
};
use keystone_array::Array;
use keystone_malloc::{BinnedMalloc, align::is_ptr_aligned};

#[derive(Debug, Clone)]
struct Tracked {
    value: u32,
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(value: u32, drops: &Rc<Cell<usize>>) -> Tracked {
        Tracked {
            value,
            drops: drops.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn test_heap_array_growth_follows_slack() {
    let mut array = Array::<u32>::new();
    assert_eq!(array.capacity(), 0);
    assert!(!array.has_allocation());

    array.push(1);
    assert_eq!(array.capacity(), 4);
    for v in 2..=5 {
        array.push(v);
    }
    // 5 + 5 * 3 / 8 + 16 = 22 elements, 88 bytes rounded to 96.
    assert_eq!(array.capacity(), 24);
    assert_eq!(array.allocated_size(), 96);
    assert_eq!(array, [1, 2, 3, 4, 5]);
}

#[test]
fn test_binned_heap_quantization() {
    let mut array = Array::<u32, HeapAllocator<BinnedMalloc>>::new();
    array.extend(0..5u32);
    array.extend(5..100u32);
    // Grows for 100 elements at once: 153 elements, 612 bytes, binned to 640.
    assert_eq!(array.capacity(), 160);
    assert_eq!(array.len(), 100);
}

#[test]
fn test_inline_array_scenario() {
    let mut array = Array::<i32, InlineAllocator<4>>::new();
    assert_eq!(array.capacity(), 4);
    array.extend_from_slice(&[1, 2, 3, 4]);
    assert!(!array.has_allocation());
    assert_eq!(array.allocated_size(), 0);

    array.push(5);
    assert!(array.has_allocation());
    assert_eq!(array, [1, 2, 3, 4, 5]);
    assert!(array.allocated_size() >= 5 * 4);

    array.truncate(2);
    assert!(!array.has_allocation());
    assert_eq!(array.capacity(), 4);
    assert_eq!(array, [1, 2]);
}

#[test]
fn test_fixed_array() {
    let mut array = Array::<u8, FixedAllocator<8>>::new();
    for v in 0..8 {
        array.push(v);
    }
    assert_eq!(array.capacity(), 8);
    assert_eq!(array.allocated_size(), 0);
    array.remove(0);
    assert_eq!(array.capacity(), 8);
    assert_eq!(array, [1, 2, 3, 4, 5, 6, 7]);
}

#[test]
#[should_panic]
fn test_fixed_array_overflow_panics() {
    let mut array = Array::<u8, FixedAllocator<8>>::new();
    array.extend(0..9u8);
}

#[test]
fn test_aligned_array() {
    let mut array = Array::<u8, AlignedHeapAllocator<128>>::new();
    array.extend_from_slice(b"keystone");
    assert!(is_ptr_aligned(array.as_ptr(), 128));
    assert_eq!(array.capacity(), 128);
    assert_eq!(array.as_bytes(), b"keystone");
}

#[test]
fn test_insert_remove() {
    let mut array = Array::<u32, InlineAllocator<2>>::new();
    array.insert(0, 3);
    array.insert(0, 1);
    array.insert(1, 2);
    array.insert(3, 4);
    assert_eq!(array, [1, 2, 3, 4]);

    assert_eq!(array.remove(1), 2);
    assert_eq!(array.swap_remove(0), 1);
    assert_eq!(array, [4, 3]);
    assert!(!array.has_allocation());
    assert_eq!(array.pop(), Some(3));
    assert_eq!(array.pop(), Some(4));
    assert_eq!(array.pop(), None);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn test_remove_out_of_bounds() {
    let mut array = Array::<u32>::new();
    array.push(1);
    array.remove(1);
}

#[test]
fn test_shrink_after_large_removal() {
    let mut array = Array::<u64>::with_capacity(1000);
    assert_eq!(array.capacity(), 1000);
    array.extend(0..1000u64);
    array.truncate(10);
    // The slack of 990 elements is far above half the capacity.
    assert_eq!(array.capacity(), 10);

    let mut array = Array::<u64>::with_capacity(1000);
    array.extend(0..1000u64);
    array.truncate(990);
    assert_eq!(array.capacity(), 1000);

    array.clear();
    assert_eq!(array.capacity(), 0);
    assert!(!array.has_allocation());
}

#[test]
fn test_reserve_and_shrink_to_fit() {
    let mut array = Array::<u32>::new();
    array.reserve(10);
    assert_eq!(array.capacity(), 12);
    array.extend(0..3u32);
    array.reserve(5);
    assert_eq!(array.capacity(), 12);

    array.shrink_to_fit();
    assert_eq!(array.capacity(), 4);
    assert_eq!(array, [0, 1, 2]);

    array.reset();
    assert!(array.is_empty());
    assert_eq!(array.capacity(), 4);
    array.shrink_to_fit();
    assert_eq!(array.capacity(), 0);
}

#[test]
fn test_drops_every_element_once() {
    let drops = Rc::new(Cell::new(0));
    {
        let mut array = Array::<Tracked, InlineAllocator<3>>::new();
        for v in 0..10 {
            array.push(Tracked::new(v, &drops));
        }
        let removed = array.remove(4);
        assert_eq!(removed.value, 4);
        drop(removed);
        assert_eq!(drops.get(), 1);

        array.truncate(2);
        assert_eq!(drops.get(), 8);
        assert_eq!(array[1].value, 1);

        let cloned = array.clone();
        assert_eq!(cloned.len(), 2);
    }
    assert_eq!(drops.get(), 12);
}

#[test]
fn test_take_moves_storage() {
    let mut heap = Array::<String>::new();
    heap.push("a".to_string());
    heap.push("b".to_string());
    let ptr = heap.as_ptr();
    let taken = heap.take();
    assert_eq!(taken.as_ptr(), ptr);
    assert!(heap.is_empty());
    assert_eq!(heap.capacity(), 0);
    assert_eq!(taken, ["a".to_string(), "b".to_string()]);

    let mut inline = Array::<String, InlineAllocator<4>>::new();
    inline.push("x".to_string());
    let taken = inline.take();
    assert_eq!(taken, ["x".to_string()]);
    assert!(inline.is_empty());
    assert_eq!(inline.capacity(), 4);
    inline.push("y".to_string());
    assert_eq!(inline, ["y".to_string()]);
}

#[test]
fn test_zero_sized_elements() {
    let mut array = Array::<()>::new();
    for _ in 0..100 {
        array.push(());
    }
    assert_eq!(array.len(), 100);
    assert_eq!(array.allocated_size(), 0);
    assert_eq!(array.pop(), Some(()));
    array.clear();
    assert!(array.is_empty());
}

#[test]
fn test_sparse_array_parts() {
    type Config = InlineSparseArrayAllocator<8, 1>;
    let mut elements = Array::<u64, <Config as SparseArrayAllocatorConfig>::ElementAllocator>::new();
    let mut bits = Array::<u32, <Config as SparseArrayAllocatorConfig>::BitArrayAllocator>::new();
    assert_eq!(elements.capacity(), 8);
    assert_eq!(bits.capacity(), 1);

    for i in 0..40u64 {
        elements.push(i);
        let word = (i / 32) as usize;
        if word == bits.len() {
            bits.push(0);
        }
        bits[word] |= 1u32 << (i % 32);
    }
    assert_eq!(bits, [u32::MAX, 0xff]);
    // The bit array spilled into its secondary inline buffer, not the heap.
    assert_eq!(bits.capacity(), 4);
    assert!(bits.has_allocation());
    assert_eq!(bits.allocated_size(), 0);
    assert!(elements.has_allocation());
}

#[test]
fn test_collect_debug_and_equality() {
    let array: Array<u32, InlineAllocator<4>> = (1..=3).collect();
    let heap: Array<u32> = array.iter().copied().collect();
    assert_eq!(array, heap);
    assert_eq!(format!("{array:?}"), "[1, 2, 3]");
    assert_eq!(Array::<u32>::from(&[1u32, 2, 3][..]), heap);

    let mut doubled = heap.clone();
    for v in &mut doubled {
        *v *= 2;
    }
    assert_eq!(doubled.iter().sum::<u32>(), 12);
    assert_ne!(doubled, heap);
}

fn random_model_check<A: keystone_alloc::AllocatorPolicy>(seed: u64) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut array = Array::<u32, A>::new();
    let mut model = Vec::<u32>::new();
    for _ in 0..2000 {
        match rng.u8(..8) {
            0..=3 => {
                let v = rng.u32(..);
                array.push(v);
                model.push(v);
            }
            4 => {
                assert_eq!(array.pop(), model.pop());
            }
            5 if !model.is_empty() => {
                let i = rng.usize(..model.len());
                assert_eq!(array.remove(i), model.remove(i));
            }
            6 => {
                let i = rng.usize(..=model.len());
                let v = rng.u32(..);
                array.insert(i, v);
                model.insert(i, v);
            }
            _ => {
                let len = rng.usize(..=model.len());
                array.truncate(len);
                model.truncate(len);
            }
        }
        assert!(array.capacity() >= array.len());
        assert_eq!(array.as_slice(), model.as_slice());
    }
}

#[test]
fn test_random_operations_match_vec() {
    random_model_check::<HeapAllocator>(1);
    random_model_check::<HeapAllocator<BinnedMalloc>>(2);
    random_model_check::<AlignedHeapAllocator<32>>(3);
    random_model_check::<InlineAllocator<16>>(4);
    random_model_check::<InlineAllocator<2, InlineAllocator<8>>>(5);
}

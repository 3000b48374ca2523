//! Allocator bundles for the containers built from more than one array.
//!
//! A sparse array stores its elements next to an allocation bit array (one
//! bit per slot, packed into `u32` words). A set adds a hash bucket array on
//! top of its sparse array. The configs below only pick the policies for each
//! part; they own no memory themselves.

use std::marker::PhantomData;

use crate::{
    fixed::FixedAllocator,
    heap::HeapAllocator,
    inline::InlineAllocator,
    policy::{AllocatorPolicy, SizeType},
};

/// Largest bucket count a [`SetAllocator`] reports.
pub const MAX_HASH_BUCKETS: SizeType = 1 << 30;

/// Policies for the two arrays of a sparse array.
pub trait SparseArrayAllocatorConfig {
    type ElementAllocator: AllocatorPolicy;
    type BitArrayAllocator: AllocatorPolicy;
}

/// Policies and bucket sizing for a hashed set.
pub trait SetAllocatorConfig {
    type SparseArrayAllocator: SparseArrayAllocatorConfig;
    type HashAllocator: AllocatorPolicy;

    /// Number of hash buckets for `num_hashed_elements` elements. Always a
    /// power of two.
    fn num_hash_buckets(num_hashed_elements: SizeType) -> SizeType;
}

/// Number of `u32` bit-array words needed to track `num_elements` slots.
pub const fn bit_words_for(num_elements: usize) -> usize {
    num_elements.div_ceil(u32::BITS as usize)
}

/// Bucket count for an inline set holding up to `num_elements` elements at
/// `average_per_bucket` elements per bucket.
pub const fn inline_hash_buckets(num_elements: usize, average_per_bucket: usize) -> usize {
    let buckets = num_elements.div_ceil(average_per_bucket);
    if buckets == 0 {
        1
    } else {
        buckets.next_power_of_two()
    }
}

/// Sparse array parts on independent policies; the bit array keeps its first
/// 128 slots inline by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseArrayAllocator<
    Element: AllocatorPolicy = HeapAllocator,
    BitArray: AllocatorPolicy = InlineAllocator<4>,
>(PhantomData<(Element, BitArray)>);

impl<Element: AllocatorPolicy, BitArray: AllocatorPolicy> SparseArrayAllocatorConfig
    for SparseArrayAllocator<Element, BitArray>
{
    type ElementAllocator = Element;
    type BitArrayAllocator = BitArray;
}

/// Sparse array with `N` inline element slots and `BIT_WORDS` inline bit-array
/// words (see [`bit_words_for`]), spilling into the policies of `Secondary`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSparseArrayAllocator<
    const N: usize,
    const BIT_WORDS: usize,
    Secondary: SparseArrayAllocatorConfig = SparseArrayAllocator,
>(PhantomData<Secondary>);

impl<const N: usize, const BIT_WORDS: usize, Secondary: SparseArrayAllocatorConfig>
    SparseArrayAllocatorConfig for InlineSparseArrayAllocator<N, BIT_WORDS, Secondary>
{
    type ElementAllocator = InlineAllocator<N, Secondary::ElementAllocator>;
    type BitArrayAllocator = InlineAllocator<BIT_WORDS, Secondary::BitArrayAllocator>;
}

/// Sparse array confined to `N` element slots and `BIT_WORDS` bit-array words.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSparseArrayAllocator<const N: usize, const BIT_WORDS: usize>;

impl<const N: usize, const BIT_WORDS: usize> SparseArrayAllocatorConfig
    for FixedSparseArrayAllocator<N, BIT_WORDS>
{
    type ElementAllocator = FixedAllocator<N>;
    type BitArrayAllocator = FixedAllocator<BIT_WORDS>;
}

/// Default set allocation: the bucket count scales with the element count
/// once at least `MIN_HASHED` elements are stored.
///
/// `buckets(n) = next_power_of_two(n / AVERAGE_PER_BUCKET + BASE_BUCKETS)`
/// for `n >= MIN_HASHED`, and `1` below that.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAllocator<
    SparseArray: SparseArrayAllocatorConfig = SparseArrayAllocator,
    Hash: AllocatorPolicy = InlineAllocator<1>,
    const AVERAGE_PER_BUCKET: usize = 2,
    const BASE_BUCKETS: usize = 8,
    const MIN_HASHED: usize = 4,
>(PhantomData<(SparseArray, Hash)>);

impl<
    SparseArray: SparseArrayAllocatorConfig,
    Hash: AllocatorPolicy,
    const AVERAGE_PER_BUCKET: usize,
    const BASE_BUCKETS: usize,
    const MIN_HASHED: usize,
> SetAllocatorConfig
    for SetAllocator<SparseArray, Hash, AVERAGE_PER_BUCKET, BASE_BUCKETS, MIN_HASHED>
{
    type SparseArrayAllocator = SparseArray;
    type HashAllocator = Hash;

    fn num_hash_buckets(num_hashed_elements: SizeType) -> SizeType {
        const { assert!(AVERAGE_PER_BUCKET > 0, "average elements per bucket must be positive") };

        let count = num_hashed_elements.max(0) as usize;
        if count < MIN_HASHED {
            return 1;
        }
        (count / AVERAGE_PER_BUCKET)
            .saturating_add(BASE_BUCKETS)
            .checked_next_power_of_two()
            .map_or(MAX_HASH_BUCKETS, |buckets| {
                buckets.min(MAX_HASH_BUCKETS as usize) as SizeType
            })
    }
}

/// Set with inline storage for `N` elements, `BIT_WORDS` bit-array words and
/// `HASH_BUCKETS` buckets (see [`inline_hash_buckets`]). Above `N` elements
/// every part spills into the policies of `Secondary`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSetAllocator<
    const N: usize,
    const BIT_WORDS: usize,
    const HASH_BUCKETS: usize,
    Secondary: SetAllocatorConfig = SetAllocator,
>(PhantomData<Secondary>);

impl<const N: usize, const BIT_WORDS: usize, const HASH_BUCKETS: usize, Secondary>
    SetAllocatorConfig for InlineSetAllocator<N, BIT_WORDS, HASH_BUCKETS, Secondary>
where
    Secondary: SetAllocatorConfig,
{
    type SparseArrayAllocator =
        InlineSparseArrayAllocator<N, BIT_WORDS, Secondary::SparseArrayAllocator>;
    type HashAllocator = InlineAllocator<HASH_BUCKETS, Secondary::HashAllocator>;

    fn num_hash_buckets(num_hashed_elements: SizeType) -> SizeType {
        let inline_buckets = const { checked_bucket_count(HASH_BUCKETS) };
        if num_hashed_elements.max(0) as usize <= N {
            inline_buckets
        } else {
            Secondary::num_hash_buckets(num_hashed_elements)
        }
    }
}

/// Set confined to `N` elements, `BIT_WORDS` bit-array words and
/// `HASH_BUCKETS` buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSetAllocator<const N: usize, const BIT_WORDS: usize, const HASH_BUCKETS: usize>;

impl<const N: usize, const BIT_WORDS: usize, const HASH_BUCKETS: usize> SetAllocatorConfig
    for FixedSetAllocator<N, BIT_WORDS, HASH_BUCKETS>
{
    type SparseArrayAllocator = FixedSparseArrayAllocator<N, BIT_WORDS>;
    type HashAllocator = FixedAllocator<HASH_BUCKETS>;

    fn num_hash_buckets(_num_hashed_elements: SizeType) -> SizeType {
        const { checked_bucket_count(HASH_BUCKETS) }
    }
}

const fn checked_bucket_count(buckets: usize) -> SizeType {
    assert!(buckets.is_power_of_two(), "hash bucket count must be a power of two");
    assert!(buckets <= MAX_HASH_BUCKETS as usize, "too many hash buckets");
    buckets as SizeType
}

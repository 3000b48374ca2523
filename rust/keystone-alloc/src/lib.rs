//! Allocation policies for growable containers.
//!
//! Every dynamic container in keystone (arrays, sparse arrays, sets, maps) is
//! generic over an [`AllocatorPolicy`]. The container owns exactly one
//! per-element allocator (`A::ForElementType<T>`) and drives it through the
//! same small [`ElementAllocator`] interface regardless of where the storage
//! actually lives:
//!
//! 1. On every size change the container asks the allocator how many slots
//!    it should really hold (`calculate_slack_grow`, `calculate_slack_shrink`,
//!    `calculate_slack_reserve`). The default answers come from the
//!    [`GrowthPolicy`] slack calculator.
//! 2. If that number differs from the current capacity, the container calls
//!    `resize_allocation`, and the allocator decides whether to use inline
//!    storage, relocate into a heap block, or realloc the existing block.
//!
//! # Policies
//!
//! - [`HeapAllocator`]: every resize goes through a realloc of one heap block.
//! - [`AlignedHeapAllocator`]: same, with a caller-chosen minimum alignment.
//! - [`InlineAllocator`]: a fixed in-object buffer of `N` elements, switching
//!   to a secondary policy (heap by default) once more than `N` are needed,
//!   and relocating back when the count drops to `N` or below.
//! - [`FixedAllocator`]: inline storage only; requesting more than `N`
//!   elements is a contract violation.
//! - [`composite`]: element / bit-array / hash-bucket allocator bundles used
//!   by sparse arrays and sets.
//!
//! # Failure model
//!
//! Out-of-memory terminates the process. Contract violations by the owning
//! container (for example shrinking to a count that is not smaller than the
//! current capacity) are `debug_assert!`ed only. The one always-on guard is the
//! clamp of slack results to `SizeType::MAX` on 32-bit count overflow.
//!
//! No policy object is synchronized: an allocator is owned and mutated by a
//! single container, and any cross-thread coordination belongs to the caller.

pub mod composite;
pub mod fixed;
pub mod growth;
pub mod heap;
pub mod inline;
pub mod policy;
pub mod tracking;

pub use composite::{
    FixedSetAllocator, FixedSparseArrayAllocator, InlineSetAllocator, InlineSparseArrayAllocator,
    SetAllocator, SetAllocatorConfig, SparseArrayAllocator, SparseArrayAllocatorConfig,
};
pub use fixed::{FixedAllocator, FixedStorage};
pub use growth::{
    GrowthPolicy, calculate_slack_grow, calculate_slack_reserve, calculate_slack_shrink,
};
pub use heap::{AlignedHeapAllocator, HeapAllocator, HeapStorage, RawHeapBlock};
pub use inline::{InlineAllocator, InlineStorage};
pub use policy::{AllocatorPolicy, ElementAllocator, SizeType};

/// The policy containers use when none is specified.
pub type DefaultAllocator = HeapAllocator;

//! A contiguous growable array whose storage strategy is a type parameter.
//!
//! [`Array`] is the reference consumer of the keystone allocator policies:
//! all of its sizing decisions go through the policy's slack calculations,
//! so the same container code behaves like a `Vec`, a small-buffer vector or
//! a fixed-capacity vector depending on the chosen [`AllocatorPolicy`].
//!
//! ```
//! use keystone_alloc::InlineAllocator;
//! use keystone_array::Array;
//!
//! let mut small = Array::<u32, InlineAllocator<4>>::new();
//! small.extend_from_slice(&[1, 2, 3]);
//! assert!(!small.has_allocation());
//! small.extend_from_slice(&[4, 5]);
//! assert!(small.has_allocation());
//! ```

mod array;

pub use array::Array;
pub use keystone_alloc::{AllocatorPolicy, DefaultAllocator, SizeType};

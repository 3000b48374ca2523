//! Raw memory primitives consumed by the keystone allocator policies.
//!
//! Two capabilities are exposed through the [`Malloc`] trait: a realloc-style
//! resize of a raw block (allocate, grow, shrink and free in one call), and a
//! size quantization query that reports how many bytes the allocator would
//! actually commit for a request. Out-of-memory is never reported back to the
//! caller; it terminates the process through `std::alloc::handle_alloc_error`.

pub mod align;
pub mod binned;
pub mod malloc;

pub use binned::BinnedMalloc;
pub use malloc::{DEFAULT_ALIGNMENT, Malloc, SystemMalloc};

#[cfg(test)]
mod tests;

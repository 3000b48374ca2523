//! Core definitions (error types and argument verification), relied upon by all keystone-* crates.

pub mod error;
pub mod result;

pub use result::Result;

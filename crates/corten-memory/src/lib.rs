//! Composable memory allocation strategies behind one contract
//!
//! This crate provides a family of allocators that all implement the same
//! [`Allocator`] trait, so they can back one another and be swapped freely:
//!
//! - [`SystemAllocator`]: the process heap
//! - [`VirtualAllocator`]: one OS mapping per allocation, with a trailing
//!   guard page that turns buffer overruns into immediate faults
//! - [`ArenaAllocator`]: growable bump allocation, freed all at once
//! - [`StackAllocator`]: growable LIFO allocation with O(1) unwind
//! - [`PoolAllocator`]: fixed-size chunks, freed in any order
//! - [`StaticAllocator`]: a single caller-provided buffer
//! - [`NullAllocator`]: refuses everything, for must-not-grow setups
//!
//! The [`TypedAllocator`] extension layers typed helpers on top of the raw
//! byte interface of any allocator.
//!
//! # Errors and misuse
//!
//! Conditions a caller can recover from come back as [`AllocError`]:
//! exhaustion, rejected constructor parameters, invalid layouts and
//! operating system failures. Violating an allocator's contract, such as
//! freeing a pointer it never produced, unwinding a stack out of order or
//! calling an operation a strategy does not support, is a bug in the caller
//! and panics with a message naming the allocator.
//!
//! # Features
//!
//! - `logging`: emit `tracing` events when allocators grow, reset or map
//!   memory. Off by default; the allocators are silent without it.
//!
//! # Example
//!
//! ```
//! use corten_memory::allocator::{ArenaAllocator, TypedAllocator};
//!
//! fn main() -> Result<(), corten_memory::AllocError> {
//!     let arena = ArenaAllocator::new(4096)?;
//!
//!     // SAFETY: the arena outlives the reference and reclaims the value
//!     // when it is dropped.
//!     let value = unsafe { arena.alloc_init(42u64)? };
//!     assert_eq!(unsafe { *value.as_ref() }, 42);
//!     Ok(())
//! }
//! ```
//!
//! [`Allocator`]: allocator::Allocator
//! [`TypedAllocator`]: allocator::TypedAllocator
//! [`SystemAllocator`]: allocator::SystemAllocator
//! [`VirtualAllocator`]: allocator::VirtualAllocator
//! [`ArenaAllocator`]: allocator::ArenaAllocator
//! [`StackAllocator`]: allocator::StackAllocator
//! [`PoolAllocator`]: allocator::PoolAllocator
//! [`StaticAllocator`]: allocator::StaticAllocator
//! [`NullAllocator`]: allocator::NullAllocator

#![warn(missing_docs)]

// Core modules
pub mod allocator;
pub mod error;
pub mod platform;
pub mod prelude;
pub mod utils;

// Re-export common types for convenience
pub use allocator::{Allocator, TypedAllocator};
pub use error::{AllocError, AllocResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

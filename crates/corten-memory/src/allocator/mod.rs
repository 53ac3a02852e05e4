//! Allocation strategies behind one [`Allocator`] contract.
//!
//! Every allocator here speaks the same [`Layout`]-based interface, so the
//! strategies compose: an arena can draw its nodes from the system heap,
//! from a guarded [`VirtualAllocator`], or from any other implementation.
//!
//! | Allocator           | Free          | Resize        | Pattern                      |
//! |---------------------|---------------|---------------|------------------------------|
//! | [`SystemAllocator`] | any order     | yes           | general purpose              |
//! | [`VirtualAllocator`]| any order     | yes           | guarded, page granular       |
//! | [`ArenaAllocator`]  | all at once   | latest only   | bump, grows in nodes         |
//! | [`StackAllocator`]  | LIFO          | latest only   | scoped scratch space         |
//! | [`PoolAllocator`]   | any order     | no            | fixed-size chunks            |
//! | [`StaticAllocator`] | no            | no            | one caller-provided buffer   |
//! | [`NullAllocator`]   | rejects       | rejects       | backing for fixed-only use   |
//!
//! [`Layout`]: core::alloc::Layout

pub mod arena;
pub mod null;
pub mod pool;
pub mod stack;
pub mod static_buf;
pub mod system;
pub mod traits;
pub mod virtual_mem;

pub use arena::{ArenaAllocator, ArenaConfig};
pub use null::NullAllocator;
pub use pool::PoolAllocator;
pub use stack::{StackAllocator, StackConfig};
pub use static_buf::StaticAllocator;
pub use system::SystemAllocator;
pub use traits::{Allocator, TypedAllocator};
pub use virtual_mem::VirtualAllocator;

/// Alignment used for backing buffers and as the constructor default:
/// two pointers, which satisfies every primitive type including `u128`.
pub const DEFAULT_ALIGNMENT: usize = 2 * size_of::<*const ()>();

/// Initial node size for [`ArenaAllocator`] when none is given.
pub const DEFAULT_ARENA_CAPACITY: usize = 16 * 1024;

/// Initial node size for [`StackAllocator`] when none is given.
pub const DEFAULT_STACK_CAPACITY: usize = 16 * 1024;

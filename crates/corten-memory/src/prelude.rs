//! Convenience re-exports for the common case.
//!
//! ```
//! use corten_memory::prelude::*;
//!
//! let arena = ArenaAllocator::new(1024)?;
//! let layout = std::alloc::Layout::new::<[u8; 64]>();
//! let block = unsafe { arena.allocate(layout)? };
//! # let _ = block;
//! # Ok::<(), AllocError>(())
//! ```

pub use crate::allocator::{
    Allocator, ArenaAllocator, ArenaConfig, NullAllocator, PoolAllocator, StackAllocator,
    StackConfig, StaticAllocator, SystemAllocator, TypedAllocator, VirtualAllocator,
};
pub use crate::error::{AllocError, AllocResult};

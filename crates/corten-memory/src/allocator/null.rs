//! Allocator that refuses every request.
//!
//! Useful as a placeholder backing store and for exercising out-of-memory
//! paths in tests without exhausting real memory.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};

use super::Allocator;

/// Allocator with no memory at all.
///
/// Every allocation attempt, including zero-sized ones, reports
/// [`AllocError::OutOfMemory`]. Since nothing is ever handed out,
/// `deallocate` can only be called with a foreign pointer and panics;
/// `deallocate_all` trivially succeeds as a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullAllocator;

impl NullAllocator {
    /// Creates the allocator.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        NullAllocator
    }
}

unsafe impl Allocator for NullAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::out_of_memory(layout))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        panic!("null allocator: deallocate called on a pointer it cannot have allocated");
    }

    #[inline]
    unsafe fn allocate_all(&self, align: usize) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::out_of_memory_sized(0, align))
    }

    unsafe fn deallocate_all(&self) {}

    #[inline]
    unsafe fn reallocate(
        &self,
        _ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::out_of_memory(new_layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_allocation_fails() {
        let alloc = NullAllocator::new();
        unsafe {
            let err = alloc.allocate(Layout::new::<u64>()).unwrap_err();
            assert!(err.is_out_of_memory());

            // Zero-sized requests fail too; this allocator owns nothing.
            assert!(alloc.allocate(Layout::new::<()>()).is_err());
            assert!(alloc.allocate_all(16).is_err());
        }
    }

    #[test]
    fn test_resize_fails() {
        let alloc = NullAllocator;
        let layout = Layout::new::<u32>();
        unsafe {
            assert!(alloc.resize(None, layout, layout).is_err());
        }
    }

    #[test]
    #[should_panic(expected = "null allocator")]
    fn test_deallocate_panics() {
        let alloc = NullAllocator;
        unsafe { alloc.deallocate(NonNull::dangling(), Layout::new::<u8>()) };
    }

    #[test]
    fn test_deallocate_all_is_noop() {
        let alloc = NullAllocator;
        unsafe { alloc.deallocate_all() };
    }
}

//! General-purpose allocator backed by the operating system heap.
//!
//! [`SystemAllocator`] forwards every request to [`std::alloc::System`].
//! It is the baseline strategy and the default backing store for the
//! region-style allocators in this crate.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use crate::error::{AllocError, AllocResult};
use crate::utils::dangling_slice;

use super::Allocator;

/// Allocator that delegates to the platform heap.
///
/// The struct is a zero-sized handle; copies all refer to the same global
/// heap, so there is no state to manage and the allocator is freely `Send`
/// and `Sync`.
///
/// Individual `deallocate` works as usual. The whole-allocator operations
/// (`allocate_all`, `deallocate_all`) have no meaning for a shared heap and
/// keep their panicking defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new handle to the system heap.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        SystemAllocator
    }
}

impl Default for SystemAllocator {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Allocator for SystemAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(dangling_slice(layout.align()));
        }

        // SAFETY: layout.size() != 0, checked above.
        let ptr = unsafe { System.alloc(layout) };
        NonNull::new(ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or_else(|| AllocError::out_of_memory(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: ptr was produced by System.alloc with this layout (caller
        // contract); zero-sized pointers never reach here.
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
    }

    #[inline]
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(dangling_slice(layout.align()));
        }

        // SAFETY: layout.size() != 0, checked above. The heap zeroes the
        // block itself, which is cheaper than allocate + write_bytes when
        // the OS can hand over pre-zeroed pages.
        let ptr = unsafe { System.alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or_else(|| AllocError::out_of_memory(layout))
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if new_layout.size() == 0 {
            // SAFETY: ptr is live with old_layout (caller contract); the
            // zero-size guard inside deallocate handles a dangling old ptr.
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling_slice(new_layout.align()));
        }

        if old_layout.size() == 0 {
            return unsafe { self.allocate(new_layout) };
        }

        // The heap realloc moves data itself, but only understands size
        // changes under an unchanged alignment.
        if old_layout.align() == new_layout.align() {
            // SAFETY: ptr is live with old_layout (caller contract); both
            // sizes are non-zero, checked above.
            let moved = unsafe { System.realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
            if let Some(moved) = NonNull::new(moved) {
                return Ok(NonNull::slice_from_raw_parts(moved, new_layout.size()));
            }
            return Err(AllocError::out_of_memory(new_layout));
        }

        // Alignment change: fresh block, copy the surviving prefix.
        // SAFETY: new_layout is non-zero, validated by Layout itself.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let preserved = old_layout.size().min(new_layout.size());
        // SAFETY: distinct heap blocks cannot overlap; preserved bytes fit
        // in both; old_layout matches the original allocation.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), preserved);
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }
}

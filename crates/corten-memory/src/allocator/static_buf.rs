//! One-shot allocator over a caller-provided buffer.
//!
//! [`StaticAllocator`] wraps a fixed `&mut [u8]` and hands the whole buffer
//! out exactly once. It exists for embedded-style setups where a component
//! receives its working memory up front and must not allocate anywhere
//! else.

use core::alloc::Layout;
use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::is_aligned_ptr;

use super::Allocator;

/// Hands out one fixed buffer, once.
///
/// The only supported operation is a single `allocate` whose size equals
/// the buffer length; a second attempt reports
/// [`AllocError::OutOfMemory`]. Everything else (`deallocate`,
/// `deallocate_all`, `reallocate`, `allocate_all`) is a caller bug and
/// panics.
///
/// The borrow of the buffer lives as long as the allocator, so the caller
/// cannot touch the memory through the original slice while an allocation
/// may be outstanding.
///
/// # Examples
/// ```
/// use corten_memory::allocator::{Allocator, StaticAllocator};
/// use std::alloc::Layout;
///
/// let mut buf = [0u8; 64];
/// let alloc = StaticAllocator::new(&mut buf);
///
/// let block = unsafe { alloc.allocate(Layout::from_size_align(64, 1)?)? };
/// assert_eq!(block.len(), 64);
///
/// // The buffer is gone now.
/// assert!(unsafe { alloc.allocate(Layout::from_size_align(64, 1)?) }.is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct StaticAllocator<'buf> {
    base: NonNull<u8>,
    len: usize,
    used: Cell<bool>,
    _buf: PhantomData<&'buf mut [u8]>,
}

impl<'buf> StaticAllocator<'buf> {
    /// Wraps `buf` as the allocator's entire capacity.
    #[must_use]
    pub fn new(buf: &'buf mut [u8]) -> Self {
        StaticAllocator {
            // A slice pointer is never null, even for an empty slice.
            base: NonNull::new(buf.as_mut_ptr()).unwrap_or(NonNull::dangling()),
            len: buf.len(),
            used: Cell::new(false),
            _buf: PhantomData,
        }
    }

    /// Total capacity in bytes, taken or not.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Whether the buffer has already been handed out.
    #[inline]
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used.get()
    }
}

impl core::fmt::Debug for StaticAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticAllocator")
            .field("len", &self.len)
            .field("used", &self.used.get())
            .finish()
    }
}

// SAFETY: The allocator owns the exclusive borrow of the buffer; moving it
// to another thread moves that exclusivity with it. The Cell keeps it
// !Sync, which matches the single-threaded contract.
unsafe impl Send for StaticAllocator<'_> {}

unsafe impl Allocator for StaticAllocator<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        assert!(
            layout.size() == self.len,
            "static allocator: requested {} bytes from a {}-byte buffer",
            layout.size(),
            self.len,
        );
        assert!(
            is_aligned_ptr(self.base.as_ptr(), layout.align()),
            "static allocator: buffer does not satisfy alignment {}",
            layout.align(),
        );

        if self.used.replace(true) {
            return Err(AllocError::out_of_memory(layout));
        }
        Ok(NonNull::slice_from_raw_parts(self.base, self.len))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        panic!("static allocator: unsupported operation");
    }

    unsafe fn deallocate_all(&self) {
        panic!("static allocator: unsupported operation");
    }

    unsafe fn reallocate(
        &self,
        _ptr: NonNull<u8>,
        _old_layout: Layout,
        _new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        panic!("static allocator: unsupported operation");
    }
}

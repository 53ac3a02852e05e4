//! Fixed-chunk pool allocator.
//!
//! One buffer divided into equally sized, equally aligned chunks, with the
//! free chunks threaded into an intrusive singly linked list. Allocation
//! pops the head, deallocation pushes the chunk back, both in O(1) and in
//! any order. The trade-off is that every request must match the chunk
//! layout exactly.
//!
//! ```text
//! head ---.    .--------------.   .---------.
//!         v    |              v   |         v
//! | chunk 0 | chunk 1 | chunk 2 | chunk 3 | chunk 4 |
//!      |         ^                   |
//!      '---------'                   '--> null
//! ```
//!
//! Free chunks store the address of the next free chunk in their first
//! bytes, so chunks must be at least pointer-sized.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::align_forward;

use super::{Allocator, SystemAllocator, DEFAULT_ALIGNMENT};

/// Pool of `chunk_count` chunks, each `chunk_size` bytes at `chunk_align`.
///
/// Only requests whose layout is exactly `(chunk_size, chunk_align)` are
/// valid; anything else, including zero-sized layouts, is a caller bug and
/// panics. An empty pool reports [`AllocError::OutOfMemory`].
///
/// # Examples
/// ```
/// use corten_memory::allocator::{Allocator, PoolAllocator};
/// use std::alloc::Layout;
///
/// let pool = PoolAllocator::new(64, 16)?;
/// let layout = Layout::from_size_align(64, pool.chunk_align())?;
///
/// let chunk = unsafe { pool.allocate(layout)? };
/// unsafe { pool.deallocate(chunk.cast(), layout) };
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PoolAllocator<B: Allocator = SystemAllocator> {
    backing: B,
    buf: NonNull<u8>,
    buf_size: usize,
    stride: usize,
    chunk_size: usize,
    chunk_align: usize,
    chunk_count: usize,
    head: Cell<*mut u8>,
}

impl PoolAllocator<SystemAllocator> {
    /// Creates a pool over the system heap with chunks aligned to
    /// [`DEFAULT_ALIGNMENT`].
    pub fn new(chunk_size: usize, chunk_count: usize) -> AllocResult<Self> {
        Self::with_backing(SystemAllocator, chunk_size, DEFAULT_ALIGNMENT, chunk_count)
    }

    /// Creates a pool with an explicit chunk alignment.
    pub fn with_align(
        chunk_size: usize,
        chunk_align: usize,
        chunk_count: usize,
    ) -> AllocResult<Self> {
        Self::with_backing(SystemAllocator, chunk_size, chunk_align, chunk_count)
    }

    /// Creates a pool whose chunk layout matches `T`, for use with the
    /// typed allocation helpers. `T` must be at least pointer-sized.
    pub fn for_type<T>(chunk_count: usize) -> AllocResult<Self> {
        Self::with_backing(SystemAllocator, size_of::<T>(), align_of::<T>(), chunk_count)
    }
}

impl<B: Allocator> PoolAllocator<B> {
    /// Creates a pool whose buffer comes from `backing`.
    pub fn with_backing(
        backing: B,
        chunk_size: usize,
        chunk_align: usize,
        chunk_count: usize,
    ) -> AllocResult<Self> {
        if chunk_size < size_of::<*mut u8>() {
            return Err(AllocError::invalid_config("chunk size must hold at least a pointer"));
        }
        if !chunk_align.is_power_of_two() {
            return Err(AllocError::invalid_config("chunk alignment must be a power of two"));
        }
        if chunk_count == 0 {
            return Err(AllocError::invalid_config("chunk count must be nonzero"));
        }

        // Rounding the stride up to the alignment keeps every chunk start
        // aligned once the buffer itself is.
        let stride = align_forward(chunk_size, chunk_align);
        let buf_size = stride
            .checked_mul(chunk_count)
            .ok_or_else(|| AllocError::invalid_config("pool buffer size overflows"))?;
        let layout = Layout::from_size_align(buf_size, chunk_align)
            .map_err(|_| AllocError::invalid_layout(buf_size, chunk_align))?;
        // SAFETY: layout constructed and checked above.
        let buf = unsafe { backing.allocate(layout)? }.cast::<u8>();

        #[cfg(feature = "logging")]
        tracing::debug!(chunk_size, chunk_align, chunk_count, "pool created");

        let pool = PoolAllocator {
            backing,
            buf,
            buf_size,
            stride,
            chunk_size,
            chunk_align,
            chunk_count,
            head: Cell::new(core::ptr::null_mut()),
        };
        pool.thread_free_list();
        Ok(pool)
    }

    /// Chunk size in bytes.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk alignment in bytes.
    #[inline]
    pub fn chunk_align(&self) -> usize {
        self.chunk_align
    }

    /// Total number of chunks.
    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_count
    }

    /// Number of chunks currently free, counted by walking the list.
    pub fn free_chunks(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.get();
        while let Some(chunk) = NonNull::new(cursor) {
            count += 1;
            // SAFETY: the list only ever holds chunk addresses threaded by
            // this pool, each with a next pointer in its first bytes.
            cursor = unsafe { chunk.as_ptr().cast::<*mut u8>().read_unaligned() };
        }
        count
    }

    /// Links every chunk into the free list, lowest address on top.
    fn thread_free_list(&self) {
        let base = self.buf.as_ptr();
        for index in 0..self.chunk_count {
            // SAFETY: index * stride < buf_size, so both the chunk address
            // and its pointer-sized first bytes are inside the buffer.
            unsafe {
                let chunk = base.add(index * self.stride);
                let next = if index + 1 < self.chunk_count {
                    base.add((index + 1) * self.stride)
                } else {
                    core::ptr::null_mut()
                };
                chunk.cast::<*mut u8>().write_unaligned(next);
            }
        }
        self.head.set(base);
    }
}

impl<B: Allocator> core::fmt::Debug for PoolAllocator<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_align", &self.chunk_align)
            .field("chunk_count", &self.chunk_count)
            .field("free", &self.free_chunks())
            .finish()
    }
}

// SAFETY: The pool owns its buffer and the Cell keeps it !Sync; sending it
// to another thread moves ownership of the buffer along with it.
unsafe impl<B: Allocator + Send> Send for PoolAllocator<B> {}

impl<B: Allocator> Drop for PoolAllocator<B> {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::from_size_align(self.buf_size, self.chunk_align) {
            // SAFETY: buf came from backing.allocate with this exact layout.
            unsafe { self.backing.deallocate(self.buf, layout) };
        }
    }
}

unsafe impl<B: Allocator> Allocator for PoolAllocator<B> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        assert!(
            layout.size() == self.chunk_size && layout.align() == self.chunk_align,
            "pool allocator: layout does not match the chunk size and alignment",
        );

        let Some(chunk) = NonNull::new(self.head.get()) else {
            return Err(AllocError::out_of_memory(layout));
        };
        // SAFETY: every free chunk stores the next free chunk's address in
        // its first bytes.
        let next = unsafe { chunk.as_ptr().cast::<*mut u8>().read_unaligned() };
        self.head.set(next);

        Ok(NonNull::slice_from_raw_parts(chunk, self.chunk_size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        let addr = ptr.as_ptr() as usize;
        let base = self.buf.as_ptr() as usize;
        assert!(
            addr >= base && addr < base + self.buf_size,
            "pool allocator: out-of-bounds pointer",
        );

        // Push the chunk back on the free list.
        // SAFETY: ptr is inside the buffer, checked above, and chunks are
        // at least pointer-sized.
        unsafe { ptr.as_ptr().cast::<*mut u8>().write_unaligned(self.head.get()) };
        self.head.set(ptr.as_ptr());
    }

    unsafe fn deallocate_all(&self) {
        self.thread_free_list();
    }

    unsafe fn reallocate(
        &self,
        _ptr: NonNull<u8>,
        _old_layout: Layout,
        _new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        panic!("pool allocator: chunks cannot be resized");
    }
}

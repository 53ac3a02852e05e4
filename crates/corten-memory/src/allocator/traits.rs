//! The uniform allocation contract shared by every strategy in this crate.
//!
//! Two traits make up the surface:
//! - [`Allocator`]: raw, layout-driven allocation with optional bulk and
//!   resize operations
//! - [`TypedAllocator`]: type-safe helpers layered on top, implemented for
//!   every [`Allocator`] via a blanket impl
//!
//! Strategies differ in which operations they support. `allocate` and
//! `deallocate` always work (even if `deallocate` is a no-op, as in the
//! arena). `allocate_all` and `deallocate_all` are whole-allocator
//! operations that only region-style strategies provide; the defaults panic
//! so that an unsupported call fails loudly instead of corrupting state.
//!
//! # Safety
//!
//! Implementors of [`Allocator`] guarantee:
//! - Returned pointers are non-null, aligned to `layout.align()`, and refer
//!   to `layout.size()` usable bytes owned by no other live allocation
//! - Zero-sized requests return a dangling pointer that must not be read or
//!   written
//! - A pointer stays valid until it is passed to `deallocate`/`reallocate`
//!   or a whole-allocator operation (`deallocate_all`, drop) retires it
//!
//! Callers uphold the usual raw-allocation obligations: layouts passed to
//! `deallocate` and `reallocate` must match the allocation they refer to,
//! and no pointer is used after it has been released.
//!
//! The blanket impl for `&T` only forwards; it introduces no unsafe
//! operations of its own, so the underlying allocator's contract carries
//! over unchanged.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::dangling_slice;

/// Rejects layouts no allocator in this crate can honor.
///
/// `Layout` already guarantees a power-of-two alignment; the remaining
/// hazard is a size that overflows when rounded up to that alignment.
#[inline]
fn validate_layout(layout: Layout) -> AllocResult<()> {
    if layout.size() > isize::MAX as usize - (layout.align() - 1) {
        return Err(AllocError::invalid_layout(layout.size(), layout.align()));
    }
    Ok(())
}

/// Raw allocation interface implemented by every strategy.
///
/// # Safety
///
/// Implementors must uphold the contract documented at the module level:
/// valid, aligned, exclusive pointers; dangling results for zero-sized
/// requests; pointers stay usable until explicitly released.
pub unsafe trait Allocator {
    /// Allocates a block described by `layout`.
    ///
    /// The returned slice pointer covers at least `layout.size()` bytes of
    /// uninitialized memory.
    ///
    /// # Safety
    /// The returned memory must be initialized before it is read.
    ///
    /// # Errors
    /// Returns [`AllocError::OutOfMemory`] when the strategy cannot satisfy
    /// the request from its remaining space.
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Releases a block previously returned by this allocator.
    ///
    /// Strategies that cannot free individual blocks either ignore the call
    /// (arena) or panic (static buffer); each documents its behavior.
    ///
    /// # Safety
    /// - `ptr` must come from this allocator and still be live
    /// - `layout` must match the layout the block was allocated with
    /// - `ptr` must not be used after this call
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocates a block and fills it with zero bytes.
    ///
    /// # Safety
    /// Same contract as [`allocate`](Self::allocate); the returned memory is
    /// initialized to zero.
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as allocate; forwarded unchanged.
        let ptr = unsafe { self.allocate(layout)? };
        // SAFETY: Zeroing freshly allocated memory.
        // - ptr is valid for writes of ptr.len() bytes (just allocated)
        // - u8 has no alignment requirement
        unsafe { ptr.cast::<u8>().as_ptr().write_bytes(0, ptr.len()) };
        Ok(ptr)
    }

    /// Hands out all remaining space in one block aligned to `align`.
    ///
    /// Only region-style strategies (arena, stack) support this; the
    /// default panics.
    ///
    /// # Safety
    /// Same contract as [`allocate`](Self::allocate). `align` must be a
    /// power of two.
    unsafe fn allocate_all(&self, align: usize) -> AllocResult<NonNull<[u8]>> {
        let _ = align;
        panic!("allocate_all is not supported by this allocator");
    }

    /// Releases every outstanding allocation at once.
    ///
    /// Supported by the arena, stack, and pool strategies; the default
    /// panics.
    ///
    /// # Safety
    /// Every pointer previously returned by this allocator becomes invalid.
    unsafe fn deallocate_all(&self) {
        panic!("deallocate_all is not supported by this allocator");
    }

    /// Changes the size or alignment of an existing block.
    ///
    /// The default implementation defines the portable semantics every
    /// strategy refines:
    /// - a zero-sized `new_layout` frees the block and returns a dangling
    ///   pointer
    /// - a zero-sized `old_layout` is a plain allocation
    /// - shrinking without a stricter alignment keeps the block in place
    /// - anything else moves the data to a fresh block
    ///
    /// Bytes beyond `min(old, new)` sizes are unspecified after the call.
    ///
    /// # Safety
    /// - `ptr` must come from this allocator and still be live
    /// - `old_layout` must match the layout the block was allocated with
    /// - On success the old pointer is retired; only the returned pointer
    ///   may be used
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        validate_layout(new_layout)?;

        if new_layout.size() == 0 {
            if old_layout.size() != 0 {
                // SAFETY: Releasing the old block.
                // - ptr is live and owned by this allocator (caller contract)
                // - old_layout matches the original allocation (caller contract)
                unsafe { self.deallocate(ptr, old_layout) };
            }
            return Ok(dangling_slice(new_layout.align()));
        }

        if old_layout.size() == 0 {
            // Nothing to preserve; the old pointer was dangling.
            return unsafe { self.allocate(new_layout) };
        }

        if new_layout.size() <= old_layout.size() && new_layout.align() <= old_layout.align() {
            // The existing block already satisfies the new layout.
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        // SAFETY: Allocating the replacement block.
        // - new_layout validated above
        let new_ptr = unsafe { self.allocate(new_layout)? };

        let preserved = old_layout.size().min(new_layout.size());
        // SAFETY: Moving the surviving prefix and retiring the old block.
        // - ptr is valid for reads of old_layout.size() >= preserved bytes
        // - new_ptr is valid for writes of new_layout.size() >= preserved bytes
        // - the regions are distinct allocations, so they cannot overlap
        // - deallocate runs after the copy, with the matching old_layout
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.cast::<u8>().as_ptr(),
                preserved,
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }

    /// Resize entry point that also covers first-time allocation.
    ///
    /// `None` (or a zero-sized `old_layout`) means there is no existing
    /// block and the call behaves as [`allocate`](Self::allocate); otherwise
    /// it behaves as [`reallocate`](Self::reallocate).
    ///
    /// # Safety
    /// When `ptr` is `Some`, the [`reallocate`](Self::reallocate) contract
    /// applies.
    unsafe fn resize(
        &self,
        ptr: Option<NonNull<u8>>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        match ptr {
            // SAFETY: ptr is live with old_layout (caller contract).
            Some(ptr) if old_layout.size() != 0 => unsafe {
                self.reallocate(ptr, old_layout, new_layout)
            },
            // SAFETY: No live block to preserve; plain allocation.
            _ => unsafe { self.allocate(new_layout) },
        }
    }

    /// Allocates a block aligned to `align` and fills it with `src`.
    ///
    /// # Safety
    /// Same contract as [`allocate`](Self::allocate); the returned memory
    /// holds a copy of `src`.
    ///
    /// # Errors
    /// Returns [`AllocError::InvalidLayout`] when `src.len()` and `align`
    /// do not form a valid layout.
    unsafe fn allocate_copy(&self, src: &[u8], align: usize) -> AllocResult<NonNull<[u8]>> {
        let layout = Layout::from_size_align(src.len(), align)
            .map_err(|_| AllocError::invalid_layout(src.len(), align))?;
        // SAFETY: layout constructed and validated above.
        let ptr = unsafe { self.allocate(layout)? };
        if !src.is_empty() {
            // SAFETY: Filling the fresh block.
            // - src is valid for reads of src.len() bytes
            // - ptr is valid for writes of layout.size() == src.len() bytes
            // - a fresh allocation cannot overlap a live slice
            unsafe {
                core::ptr::copy_nonoverlapping(src.as_ptr(), ptr.cast::<u8>().as_ptr(), src.len());
            }
        }
        Ok(ptr)
    }
}

// SAFETY: Every method forwards to the underlying T: Allocator through
// `**self`, so its guarantees carry over unchanged and no new unsafe
// operations are introduced.
unsafe impl<T: Allocator + ?Sized> Allocator for &T {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::allocate.
        unsafe { (**self).allocate(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Same contract as T::deallocate.
        unsafe { (**self).deallocate(ptr, layout) }
    }

    #[inline]
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::allocate_zeroed.
        unsafe { (**self).allocate_zeroed(layout) }
    }

    #[inline]
    unsafe fn allocate_all(&self, align: usize) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::allocate_all.
        unsafe { (**self).allocate_all(align) }
    }

    #[inline]
    unsafe fn deallocate_all(&self) {
        // SAFETY: Same contract as T::deallocate_all.
        unsafe { (**self).deallocate_all() }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::reallocate.
        unsafe { (**self).reallocate(ptr, old_layout, new_layout) }
    }

    #[inline]
    unsafe fn resize(
        &self,
        ptr: Option<NonNull<u8>>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::resize.
        unsafe { (**self).resize(ptr, old_layout, new_layout) }
    }

    #[inline]
    unsafe fn allocate_copy(&self, src: &[u8], align: usize) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Same contract as T::allocate_copy.
        unsafe { (**self).allocate_copy(src, align) }
    }
}

/// Type-safe helpers derived from any [`Allocator`].
///
/// Layouts are computed from `T`, which removes the most common mistakes
/// with hand-built layouts. Available on every allocator through the
/// blanket impl.
///
/// # Examples
/// ```
/// use corten_memory::allocator::{SystemAllocator, TypedAllocator};
///
/// let alloc = SystemAllocator;
/// let ptr = unsafe { alloc.alloc_init(42u64)? };
/// unsafe {
///     assert_eq!(ptr.as_ptr().read(), 42);
///     alloc.dealloc_typed(ptr);
/// }
/// # Ok::<(), corten_memory::AllocError>(())
/// ```
pub trait TypedAllocator: Allocator {
    /// Allocates uninitialized storage for one `T`.
    ///
    /// # Safety
    /// The memory must be initialized before it is read and released with
    /// [`dealloc_typed`](Self::dealloc_typed).
    #[inline]
    unsafe fn alloc_uninit<T>(&self) -> AllocResult<NonNull<T>> {
        // SAFETY: Layout::new::<T>() is always valid.
        let ptr = unsafe { self.allocate(Layout::new::<T>())? };
        Ok(ptr.cast::<T>())
    }

    /// Allocates storage for one `T` and moves `value` into it.
    ///
    /// # Safety
    /// The result must be released with [`dealloc_typed`](Self::dealloc_typed);
    /// if `T` has a destructor the caller runs it first.
    #[inline]
    unsafe fn alloc_init<T>(&self, value: T) -> AllocResult<NonNull<T>> {
        // SAFETY: Fresh, aligned storage for a T.
        let ptr = unsafe { self.alloc_uninit::<T>()? };
        // SAFETY: ptr is valid for writes and aligned for T; write moves
        // value in without reading the uninitialized destination.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocates uninitialized storage for `count` values of `T`.
    ///
    /// A zero count returns a dangling, aligned pointer without touching the
    /// allocator.
    ///
    /// # Safety
    /// - Elements must be initialized before they are read
    /// - Release with [`dealloc_array`](Self::dealloc_array) using the same
    ///   `count`
    #[inline]
    unsafe fn alloc_array_uninit<T>(&self, count: usize) -> AllocResult<NonNull<T>> {
        if count == 0 {
            return Ok(NonNull::dangling());
        }
        let layout = Layout::array::<T>(count).map_err(|_| {
            AllocError::invalid_layout(size_of::<T>().saturating_mul(count), align_of::<T>())
        })?;
        // SAFETY: layout checked for overflow by Layout::array.
        let ptr = unsafe { self.allocate(layout)? };
        Ok(ptr.cast::<T>())
    }

    /// Allocates an array of `count` elements, each a clone of `value`.
    ///
    /// # Safety
    /// Release with [`dealloc_array`](Self::dealloc_array) using the same
    /// `count`; run destructors first if `T` has one.
    #[inline]
    unsafe fn alloc_array_with<T: Clone>(&self, count: usize, value: T) -> AllocResult<NonNull<T>> {
        // SAFETY: Uninitialized array storage, initialized element by
        // element below before any element is read.
        let ptr = unsafe { self.alloc_array_uninit::<T>(count)? };
        for i in 0..count {
            // SAFETY: i < count, so add(i) stays inside the allocation.
            unsafe { ptr.as_ptr().add(i).write(value.clone()) };
        }
        Ok(ptr)
    }

    /// Releases storage obtained from [`alloc_uninit`](Self::alloc_uninit)
    /// or [`alloc_init`](Self::alloc_init).
    ///
    /// # Safety
    /// - `ptr` must come from this allocator's typed single-value methods
    /// - `ptr` must not be used after this call
    #[inline]
    unsafe fn dealloc_typed<T>(&self, ptr: NonNull<T>) {
        // SAFETY: The layout is derived from T exactly as at allocation.
        unsafe { self.deallocate(ptr.cast(), Layout::new::<T>()) }
    }

    /// Releases an array obtained from the typed array methods.
    ///
    /// # Safety
    /// - `ptr` and `count` must match the original allocation
    /// - `ptr` must not be used after this call
    #[inline]
    unsafe fn dealloc_array<T>(&self, ptr: NonNull<T>, count: usize) {
        if count == 0 {
            return;
        }
        // A count that produced a successful allocation always forms a
        // valid layout again.
        let layout = Layout::array::<T>(count).expect("array layout must match the allocation");
        // SAFETY: ptr and layout match the original allocation (caller
        // contract); cast only erases the element type.
        unsafe { self.deallocate(ptr.cast(), layout) }
    }
}

impl<A: Allocator + ?Sized> TypedAllocator for A {}

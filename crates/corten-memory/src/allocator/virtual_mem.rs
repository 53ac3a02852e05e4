//! Page-granular allocator with trailing guard pages.
//!
//! Every allocation gets its own virtual-memory mapping. The block is
//! placed as close to the end of the mapping as its alignment allows, and
//! the final page is protected no-access, so writing past the block faults
//! within `align` bytes instead of corrupting neighbours.
//!
//! ```text
//! region                header   data          data+size      guard
//! |                     |        |             |              |
//! v                     v        v             v              v
//! +----------- slack ---+--------+--- block ---+- slack<align +- page -+
//! |<------------------------- total ------------------------------->|
//! ```
//!
//! A header just below the block records the mapping base and total size,
//! which is everything `deallocate` needs to hand the region back.
//!
//! The cost is a syscall and at least two pages per allocation. This is a
//! debugging and isolation tool, not a general-purpose heap; put an arena
//! or pool on top when allocations are small or frequent.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::platform::{self, syscalls, Protection};
use crate::utils::{align_down, align_forward, dangling_slice, is_aligned};

use super::Allocator;

/// Mapping metadata stored immediately before every block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct VmHeader {
    /// Base address of the mapping.
    region: usize,
    /// Total mapped bytes, guard page included.
    total: usize,
}

const HEADER_SIZE: usize = size_of::<VmHeader>();

/// Allocator backed directly by OS virtual memory.
///
/// Supports allocate, deallocate and reallocate. Shrinking keeps the block
/// in place and returns whole tail pages to the OS, which then fault on
/// access like the guard page; growing moves the block only when it no
/// longer fits below its guard page.
///
/// # Examples
/// ```
/// use corten_memory::allocator::{Allocator, VirtualAllocator};
/// use std::alloc::Layout;
///
/// let vm = VirtualAllocator::new();
/// let layout = Layout::from_size_align(10_000, 64)?;
///
/// let block = unsafe { vm.allocate(layout)? };
/// assert_eq!(block.len(), 10_000);
/// unsafe { vm.deallocate(block.cast(), layout) };
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualAllocator;

impl VirtualAllocator {
    /// Creates a virtual-memory allocator. The allocator is stateless; all
    /// bookkeeping lives in the per-allocation headers.
    #[must_use]
    pub const fn new() -> Self {
        VirtualAllocator
    }

    /// Reads the header below a live allocation.
    ///
    /// # Safety
    /// `ptr` must point at the data of an allocation made by this
    /// allocator.
    unsafe fn read_header(ptr: NonNull<u8>) -> VmHeader {
        // SAFETY: allocate wrote the header at ptr - HEADER_SIZE and the
        // slot is aligned for VmHeader.
        unsafe { ptr.as_ptr().cast::<VmHeader>().sub(1).read() }
    }
}

unsafe impl Allocator for VirtualAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let size = layout.size();
        if size == 0 {
            return Ok(dangling_slice(layout.align()));
        }
        let align = layout.align().max(align_of::<VmHeader>());
        let page = platform::page_size();

        // Rounding up by align - 1 guarantees the header still fits below
        // the block after the block is aligned downwards.
        let usable = size
            .checked_add(HEADER_SIZE + align - 1)
            .ok_or_else(|| AllocError::invalid_layout(size, align))?;
        if usable > isize::MAX as usize - 2 * page {
            return Err(AllocError::invalid_layout(size, align));
        }
        let total = align_forward(usable, page) + page;

        let region = syscalls::map(total)?;
        let base = region.as_ptr() as usize;

        // Highest aligned placement that keeps the block below the guard.
        let guard_start = base + total - page;
        let data = align_down(guard_start - size, align);

        // SAFETY: the guard page is the last page of the mapping created
        // above.
        let guard = unsafe { NonNull::new_unchecked(guard_start as *mut u8) };
        if let Err(err) = syscalls::protect(guard, page, Protection::NoAccess) {
            let _ = syscalls::unmap(region, total);
            return Err(err.into());
        }

        #[cfg(feature = "logging")]
        tracing::trace!(size, align, total, "virtual allocation mapped");

        // SAFETY: data - HEADER_SIZE >= base by the usable computation, and
        // data is aligned to at least align_of::<VmHeader>().
        unsafe {
            (data as *mut u8).cast::<VmHeader>().sub(1).write(VmHeader { region: base, total });
        }

        // SAFETY: data lies inside the mapping; mappings are never placed
        // at address zero.
        let ptr = unsafe { NonNull::new_unchecked(data as *mut u8) };
        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // SAFETY: ptr is a live allocation (caller contract), so a header
        // precedes it.
        let header = unsafe { Self::read_header(ptr) };
        let Some(region) = NonNull::new(header.region as *mut u8) else {
            panic!("virtual allocator: corrupted allocation header");
        };

        #[cfg(feature = "logging")]
        tracing::trace!(total = header.total, "virtual allocation unmapped");

        if let Err(err) = syscalls::unmap(region, header.total) {
            panic!("virtual allocator: failed to release region: {err}");
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        let (old_size, new_size) = (old_layout.size(), new_layout.size());
        if new_size == 0 {
            // SAFETY: ptr is live with old_layout (caller contract).
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling_slice(new_layout.align()));
        }
        if old_size == 0 {
            return unsafe { self.allocate(new_layout) };
        }

        let addr = ptr.as_ptr() as usize;
        // SAFETY: ptr is a live allocation with a header below it.
        let header = unsafe { Self::read_header(ptr) };
        let page = platform::page_size();
        let guard_start = header.region + header.total - page;

        let fits_in_place = is_aligned(addr, new_layout.align())
            && addr.checked_add(new_size).is_some_and(|end| end <= guard_start);
        if fits_in_place {
            if new_size < old_size {
                // Hand tail pages back to the OS; the reservation survives
                // so a later grow can reuse them.
                let keep_end = align_forward(addr + new_size, page);
                if guard_start > keep_end {
                    // SAFETY: keep_end is page-aligned and inside the
                    // mapping recorded in the header.
                    let tail = unsafe { NonNull::new_unchecked(keep_end as *mut u8) };
                    syscalls::decommit(tail, guard_start - keep_end)?;
                }
            } else if new_size > old_size {
                // Pages past the old end may have been decommitted by an
                // earlier shrink; committing them again is idempotent.
                let commit_from = align_down(addr + old_size, page);
                let commit_to = align_forward(addr + new_size, page);
                if commit_to > commit_from {
                    // SAFETY: the range is page-aligned and ends at or
                    // before the guard page.
                    let first = unsafe { NonNull::new_unchecked(commit_from as *mut u8) };
                    syscalls::commit(first, commit_to - commit_from)?;
                }
            }
            return Ok(NonNull::slice_from_raw_parts(ptr, new_size));
        }

        // The block no longer fits below its guard page; move it to a
        // fresh mapping. The old mapping is released only after the copy.
        let new_block = unsafe { self.allocate(new_layout)? };
        let preserved = old_size.min(new_size);
        // SAFETY: distinct mappings cannot overlap and both cover
        // preserved bytes.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                preserved,
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_block)
    }
}

//! Alignment and padding arithmetic shared by every allocator.
//!
//! All functions here are pure integer math over addresses represented as
//! `usize`. Allocators call them on raw addresses before any pointer is
//! materialized, which keeps the unsafe surface confined to the allocators
//! themselves.

/// Aligns an address up to the nearest multiple of `align`.
///
/// `align` must be a power of two.
///
/// # Examples
/// ```
/// use corten_memory::utils::align_forward;
///
/// assert_eq!(align_forward(7, 8), 8);
/// assert_eq!(align_forward(8, 8), 8);
/// assert_eq!(align_forward(9, 8), 16);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_forward(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (addr + align - 1) & !(align - 1)
}

/// Aligns an address down to the nearest multiple of `align`.
///
/// `align` must be a power of two.
///
/// # Examples
/// ```
/// use corten_memory::utils::align_down;
///
/// assert_eq!(align_down(7, 8), 0);
/// assert_eq!(align_down(8, 8), 8);
/// assert_eq!(align_down(15, 8), 8);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    addr & !(align - 1)
}

/// Checks whether an address is a multiple of `align`.
///
/// `align` must be a power of two.
///
/// # Examples
/// ```
/// use corten_memory::utils::is_aligned;
///
/// assert!(is_aligned(16, 8));
/// assert!(is_aligned(0, 64));
/// assert!(!is_aligned(17, 8));
/// ```
#[inline(always)]
#[must_use]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    addr & (align - 1) == 0
}

/// Computes the padding needed at `addr` so that an allocation header of
/// `header_size` bytes fits immediately before an address aligned to `align`.
///
/// The returned padding is measured from `addr`; the allocation's data starts
/// at `addr + padding` and the header occupies the `header_size` bytes just
/// below it. The padding is always at least `header_size`.
///
/// `align` must be a power of two.
///
/// # Examples
/// ```
/// use corten_memory::utils::header_padding;
///
/// // Aligned address still needs room for the header.
/// assert_eq!(header_padding(0, 16, 16), 16);
/// // Misaligned address pays alignment slack plus header space.
/// assert_eq!(header_padding(8, 16, 16), 24);
/// assert_eq!(header_padding(16, 8, 16), 16);
/// ```
#[inline]
#[must_use]
pub const fn header_padding(addr: usize, align: usize, header_size: usize) -> usize {
    debug_assert!(align.is_power_of_two());

    let misalign = addr & (align - 1);
    let mut padding = if misalign != 0 { align - misalign } else { 0 };
    if padding < header_size {
        let needed = header_size - padding;
        if needed & (align - 1) != 0 {
            padding += align * (1 + needed / align);
        } else {
            padding += align * (needed / align);
        }
    }
    padding
}

/// Checks whether a pointer satisfies `align`.
#[inline(always)]
pub fn is_aligned_ptr<T>(ptr: *const T, align: usize) -> bool {
    is_aligned(ptr as usize, align)
}

/// Returns the zero-length allocation result: a dangling pointer that
/// satisfies `align` but must never be dereferenced.
///
/// `align` must be a power of two.
#[inline(always)]
#[must_use]
pub fn dangling_slice(align: usize) -> core::ptr::NonNull<[u8]> {
    debug_assert!(align.is_power_of_two());
    // SAFETY: align is a power of two, so it is never zero.
    let ptr = unsafe { core::ptr::NonNull::new_unchecked(align as *mut u8) };
    core::ptr::NonNull::slice_from_raw_parts(ptr, 0)
}

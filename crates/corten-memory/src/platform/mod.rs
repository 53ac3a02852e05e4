//! Platform facilities: virtual-memory syscalls and the cached page size.

use once_cell::sync::Lazy;

pub mod syscalls;

pub use syscalls::Protection;

static PAGE_SIZE: Lazy<usize> = Lazy::new(syscalls::query_page_size);

/// Returns the operating system page size in bytes.
///
/// The value is queried once per process and cached.
///
/// # Examples
/// ```
/// let page = corten_memory::platform::page_size();
/// assert!(page.is_power_of_two());
/// ```
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE
}

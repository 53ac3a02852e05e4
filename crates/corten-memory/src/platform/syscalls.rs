//! Thin wrappers over OS virtual-memory primitives.
//!
//! Each function forwards to the platform facility and reports failures as
//! [`io::Error`] values taken from the OS:
//! - **Unix**: `mmap`, `munmap`, `mprotect`, `madvise`, `sysconf`
//! - **Windows**: `VirtualAlloc`, `VirtualFree`, `VirtualProtect`,
//!   `GetSystemInfo`
//!
//! # Safety
//!
//! The functions themselves are safe to call; the OS validates parameters
//! and reports errors for invalid ones. Memory safety obligations live with
//! the caller:
//! 1. Addresses passed to `unmap`, `protect`, `commit` and `decommit` must
//!    refer to a region obtained from [`map`].
//! 2. Regions are unmapped exactly once.
//! 3. Access to mapped memory respects the protection in force.

use core::ptr::NonNull;
use std::io;

use cfg_if::cfg_if;

/// Page protection applied via [`protect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Any access faults. Used for guard pages.
    NoAccess,
    /// Normal read/write data pages.
    ReadWrite,
}

cfg_if! {
    if #[cfg(unix)] {
        impl Protection {
            fn to_os_flags(self) -> libc::c_int {
                match self {
                    Self::NoAccess => libc::PROT_NONE,
                    Self::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
                }
            }
        }
    } else if #[cfg(windows)] {
        impl Protection {
            fn to_os_flags(self) -> u32 {
                use winapi::um::winnt::{PAGE_NOACCESS, PAGE_READWRITE};
                match self {
                    Self::NoAccess => PAGE_NOACCESS,
                    Self::ReadWrite => PAGE_READWRITE,
                }
            }
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn unsupported<T>(what: &str) -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::Unsupported, what.to_string()))
}

/// Maps `size` bytes of zero-initialized, private, read-write memory.
///
/// The region is both reserved and committed; use [`decommit`] to return
/// pages to the OS while keeping the reservation.
pub fn map(size: usize) -> io::Result<NonNull<u8>> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to mmap for an anonymous private mapping.
        // - addr null lets the OS pick the placement
        // - fd -1 / offset 0 select no file backing
        // - the OS validates size and returns MAP_FAILED on error
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            NonNull::new(ptr.cast::<u8>())
                .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "mmap returned null"))
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

        // SAFETY: FFI call to VirtualAlloc reserving and committing in one
        // step. Null base address lets the OS pick the placement; the OS
        // validates size and returns null on error.
        let ptr = unsafe {
            VirtualAlloc(core::ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE)
        };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = size;
        unsupported("virtual memory mapping is not supported on this platform")
    }
}

/// Releases a region obtained from [`map`].
///
/// `size` must match the size passed to [`map`].
pub fn unmap(addr: NonNull<u8>, size: usize) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to munmap. Caller guarantees addr/size came from
        // map; the OS rejects anything else with EINVAL.
        let rc = unsafe { libc::munmap(addr.as_ptr().cast::<libc::c_void>(), size) };
        if rc == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;

        let _ = size; // MEM_RELEASE frees the whole reservation, size must be 0.

        // SAFETY: FFI call to VirtualFree. Caller guarantees addr is the base
        // returned by VirtualAlloc.
        let rc =
            unsafe { VirtualFree(addr.as_ptr().cast::<winapi::ctypes::c_void>(), 0, MEM_RELEASE) };
        if rc == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (addr, size);
        unsupported("virtual memory mapping is not supported on this platform")
    }
}

/// Changes the protection of whole pages inside a mapped region.
///
/// `addr` must be page-aligned.
pub fn protect(addr: NonNull<u8>, size: usize, protection: Protection) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to mprotect over pages the caller owns.
        let rc = unsafe {
            libc::mprotect(addr.as_ptr().cast::<libc::c_void>(), size, protection.to_os_flags())
        };
        if rc == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualProtect;

        let mut old = 0u32;
        // SAFETY: FFI call to VirtualProtect over pages the caller owns; old
        // receives the previous protection and is otherwise unused.
        let rc = unsafe {
            VirtualProtect(
                addr.as_ptr().cast::<winapi::ctypes::c_void>(),
                size,
                protection.to_os_flags(),
                &raw mut old,
            )
        };
        if rc == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (addr, size, protection);
        unsupported("memory protection is not supported on this platform")
    }
}

/// Makes previously decommitted or guarded pages usable again as read-write
/// data pages.
pub fn commit(addr: NonNull<u8>, size: usize) -> io::Result<()> {
    #[cfg(unix)]
    {
        // Unix mappings stay committed; restoring PROT_READ|PROT_WRITE is all
        // that is needed after protect(NoAccess).
        protect(addr, size, Protection::ReadWrite)
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, PAGE_READWRITE};

        // SAFETY: FFI call to VirtualAlloc with MEM_COMMIT inside an existing
        // reservation; committing already-committed pages also resets their
        // protection, which covers the old guard page.
        let ptr = unsafe {
            VirtualAlloc(
                addr.as_ptr().cast::<winapi::ctypes::c_void>(),
                size,
                MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if ptr.is_null() { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (addr, size);
        unsupported("memory commit is not supported on this platform")
    }
}

/// Returns whole pages to the OS while keeping the reservation.
///
/// Decommitted pages fault on access until [`commit`] makes them usable
/// again, at which point they read back as zero.
pub fn decommit(addr: NonNull<u8>, size: usize) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to madvise with MADV_DONTNEED; the kernel drops
        // the backing pages and lazily re-zeroes them on touch.
        let rc = unsafe {
            libc::madvise(addr.as_ptr().cast::<libc::c_void>(), size, libc::MADV_DONTNEED)
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        // Windows decommitted pages fault on access; madvise alone leaves
        // them readable, so the protection change supplies the same
        // behavior here.
        protect(addr, size, Protection::NoAccess)
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_DECOMMIT;

        // SAFETY: FFI call to VirtualFree with MEM_DECOMMIT; the reservation
        // survives and the pages can be re-committed later.
        let rc = unsafe {
            VirtualFree(addr.as_ptr().cast::<winapi::ctypes::c_void>(), size, MEM_DECOMMIT)
        };
        if rc == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (addr, size);
        unsupported("memory decommit is not supported on this platform")
    }
}

/// Queries the OS page size. Prefer [`crate::platform::page_size`], which
/// caches the result.
pub fn query_page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to sysconf with a valid parameter; the result is a
        // positive page size on every supported Unix.
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    #[cfg(windows)]
    {
        use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

        // SAFETY: FFI call to GetSystemInfo filling a zeroed SYSTEM_INFO;
        // all-zero bytes are a valid initial state for the struct.
        unsafe {
            let mut info: SYSTEM_INFO = core::mem::zeroed();
            GetSystemInfo(&raw mut info);
            info.dwPageSize as usize
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_write_unmap() {
        let size = query_page_size() * 4;
        let ptr = map(size).unwrap();

        // SAFETY: ptr covers size freshly mapped read-write bytes.
        unsafe {
            ptr.as_ptr().write(0xAB);
            ptr.as_ptr().add(size - 1).write(0xCD);
            assert_eq!(ptr.as_ptr().read(), 0xAB);
        }

        unmap(ptr, size).unwrap();
    }

    #[test]
    fn test_protect_roundtrip() {
        let page = query_page_size();
        let ptr = map(page * 2).unwrap();

        // Second page becomes a guard, then a data page again.
        // SAFETY: guard lies inside the mapping created above.
        let guard = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(page)) };
        protect(guard, page, Protection::NoAccess).unwrap();
        commit(guard, page).unwrap();

        // SAFETY: the page is read-write again.
        unsafe {
            guard.as_ptr().write(1);
            assert_eq!(guard.as_ptr().read(), 1);
        }

        unmap(ptr, page * 2).unwrap();
    }

    #[test]
    fn test_decommit_keeps_reservation() {
        let page = query_page_size();
        let ptr = map(page * 4).unwrap();

        // SAFETY: tail pages lie inside the mapping.
        let tail = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(page)) };
        decommit(tail, page * 3).unwrap();
        commit(tail, page * 3).unwrap();

        // SAFETY: decommitted pages come back zeroed and writable.
        unsafe {
            assert_eq!(tail.as_ptr().read(), 0);
            tail.as_ptr().write(7);
        }

        unmap(ptr, page * 4).unwrap();
    }
}

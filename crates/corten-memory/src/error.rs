//! Error types for allocation operations.

use core::alloc::Layout;
use std::io;

use thiserror::Error;

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors reported by allocators.
///
/// Only recoverable conditions are represented here: resource exhaustion,
/// rejected construction parameters, and operating system failures. Contract
/// misuse (out-of-bounds pointers, out-of-order stack operations, operations
/// an allocator does not support) panics instead; see the crate-level
/// documentation for the full policy.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The backing resource cannot satisfy the request.
    #[error("out of memory: requested {size} bytes with alignment {align}")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// A size/alignment pair does not form a valid layout.
    #[error("invalid layout: size {size}, alignment {align}")]
    InvalidLayout {
        /// Rejected size in bytes.
        size: usize,
        /// Rejected alignment in bytes.
        align: usize,
    },

    /// An allocator constructor rejected its parameters.
    #[error("invalid allocator configuration: {reason}")]
    InvalidConfig {
        /// Human-readable rejection reason.
        reason: &'static str,
    },

    /// An operating system memory primitive failed.
    #[error("system memory operation failed")]
    System {
        /// The underlying OS error.
        #[from]
        source: io::Error,
    },
}

impl AllocError {
    /// Creates an out-of-memory error for the given layout.
    #[inline]
    pub fn out_of_memory(layout: Layout) -> Self {
        Self::OutOfMemory { size: layout.size(), align: layout.align() }
    }

    /// Creates an out-of-memory error from raw size and alignment.
    #[inline]
    pub fn out_of_memory_sized(size: usize, align: usize) -> Self {
        Self::OutOfMemory { size, align }
    }

    /// Creates an invalid-layout error from raw size and alignment.
    #[inline]
    pub fn invalid_layout(size: usize, align: usize) -> Self {
        Self::InvalidLayout { size, align }
    }

    /// Creates a configuration error with a static reason.
    #[inline]
    pub fn invalid_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }

    /// Returns true if this is an out-of-memory error.
    #[inline]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Returns true if this is a configuration error.
    #[inline]
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Returns true if this error wraps an operating system failure.
    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_predicates() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        let oom = AllocError::out_of_memory(layout);
        assert!(oom.is_out_of_memory());
        assert!(!oom.is_invalid_config());

        let cfg = AllocError::invalid_config("chunk size too small");
        assert!(cfg.is_invalid_config());

        let sys: AllocError = io::Error::from_raw_os_error(12).into();
        assert!(sys.is_system());
    }

    #[test]
    fn test_display_carries_request() {
        let err = AllocError::out_of_memory_sized(100, 16);
        let text = err.to_string();
        assert!(text.contains("100"));
        assert!(text.contains("16"));
    }
}

//! Integration tests for the arena allocator
//!
//! Covers the bump sequence, node growth, reset semantics and composition
//! with other backing allocators, all through the public API.

use corten_memory::allocator::{
    Allocator, ArenaAllocator, ArenaConfig, SystemAllocator, TypedAllocator,
};
use proptest::prelude::*;
use std::alloc::Layout;

/// Bump, in-place shrink, reset, reuse: the full arena lifecycle.
#[test]
fn test_bump_shrink_reset_cycle() {
    let arena = ArenaAllocator::new(4096).expect("arena creation failed");
    let layout = Layout::from_size_align(100, 16).unwrap();

    unsafe {
        let p1 = arena.allocate(layout).expect("first allocation failed").cast::<u8>();
        let p2 = arena.allocate(layout).expect("second allocation failed").cast::<u8>();

        // The second block starts at the first's end, rounded up to its
        // alignment: 100 -> 112.
        assert_eq!(p2.as_ptr() as usize - p1.as_ptr() as usize, 112);
        assert_eq!(arena.used(), 212);

        // Shrinking the latest allocation gives the tail back.
        let small = Layout::from_size_align(10, 16).unwrap();
        let shrunk = arena.reallocate(p2, layout, small).expect("shrink failed");
        assert_eq!(shrunk.cast::<u8>(), p2, "shrink of the latest block stays in place");
        assert_eq!(arena.used(), 122);

        arena.deallocate_all();
        assert_eq!(arena.used(), 0);

        // A reset arena starts handing out the same addresses again.
        let again = arena.allocate(layout).expect("post-reset allocation failed").cast::<u8>();
        assert_eq!(again, p1);
    }
}

#[test]
fn test_many_allocations_are_disjoint() {
    let arena = ArenaAllocator::new(4096).expect("arena creation failed");
    let layout = Layout::from_size_align(32, 8).unwrap();

    unsafe {
        let mut blocks = Vec::new();
        for fill in 0..16u8 {
            let block = arena.allocate(layout).expect("allocation failed").cast::<u8>();
            std::ptr::write_bytes(block.as_ptr(), fill, 32);
            blocks.push((block, fill));
        }

        // Every block still holds its own pattern.
        for (block, fill) in blocks {
            let bytes = std::slice::from_raw_parts(block.as_ptr(), 32);
            assert!(bytes.iter().all(|&b| b == fill));
        }
    }
}

#[test]
fn test_growth_is_transparent() {
    let arena = ArenaAllocator::new(128).expect("arena creation failed");
    let layout = Layout::from_size_align(100, 8).unwrap();

    unsafe {
        let a = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        std::ptr::write_bytes(a.as_ptr(), 0x1A, 100);

        // The second allocation does not fit in the 128-byte node; the
        // arena grows instead of failing.
        let b = arena.allocate(layout).expect("growth allocation failed").cast::<u8>();
        std::ptr::write_bytes(b.as_ptr(), 0x2B, 100);
        assert!(arena.node_count() >= 2);
        assert!(arena.capacity() > 128);

        let a_bytes = std::slice::from_raw_parts(a.as_ptr(), 100);
        let b_bytes = std::slice::from_raw_parts(b.as_ptr(), 100);
        assert!(a_bytes.iter().all(|&v| v == 0x1A), "grown arena must not move old blocks");
        assert!(b_bytes.iter().all(|&v| v == 0x2B));
    }
}

#[test]
fn test_small_request_backfills_older_node() {
    let arena = ArenaAllocator::new(128).expect("arena creation failed");

    unsafe {
        // Leave a gap in the first node, then force growth.
        let first = arena
            .allocate(Layout::from_size_align(64, 8).unwrap())
            .expect("allocation failed")
            .cast::<u8>();
        let _big = arena
            .allocate(Layout::from_size_align(256, 8).unwrap())
            .expect("growth allocation failed");
        assert_eq!(arena.node_count(), 2);

        // Fill the head node completely so the next request must fall back.
        let head_free = arena.capacity() - 128 - 256;
        if head_free > 0 {
            let _ = arena
                .allocate(Layout::from_size_align(head_free, 1).unwrap())
                .expect("fill allocation failed");
        }

        // A request that fits the first node's gap reuses it instead of
        // growing again.
        let small = arena
            .allocate(Layout::from_size_align(32, 8).unwrap())
            .expect("backfill allocation failed")
            .cast::<u8>();
        assert_eq!(arena.node_count(), 2);
        assert_eq!(small.as_ptr() as usize, first.as_ptr() as usize + 64);
    }
}

#[test]
fn test_reset_is_idempotent_and_reusable() {
    let arena = ArenaAllocator::new(256).expect("arena creation failed");
    let layout = Layout::from_size_align(64, 8).unwrap();

    unsafe {
        for _ in 0..8 {
            let block = arena.allocate(layout).expect("allocation failed");
            std::ptr::write_bytes(block.cast::<u8>().as_ptr(), 0xEE, 64);
            arena.deallocate_all();
            assert_eq!(arena.used(), 0);
        }
        // Back-to-back resets with nothing allocated are fine too.
        arena.deallocate_all();
        arena.deallocate_all();
        assert_eq!(arena.used(), 0);
    }
}

#[test]
fn test_reset_zeroes_survivor_by_default() {
    let arena = ArenaAllocator::new(256).expect("arena creation failed");
    let layout = Layout::from_size_align(128, 8).unwrap();

    unsafe {
        let block = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        std::ptr::write_bytes(block.as_ptr(), 0xFF, 128);

        arena.deallocate_all();

        let reused = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        assert_eq!(reused, block);
        let bytes = std::slice::from_raw_parts(reused.as_ptr(), 128);
        assert!(bytes.iter().all(|&b| b == 0), "default config zeroes on reset");
    }
}

#[test]
fn test_reset_can_skip_zeroing() {
    let config = ArenaConfig::default().zero_on_reset(false);
    let arena = ArenaAllocator::with_config(SystemAllocator, 256, config)
        .expect("arena creation failed");
    let layout = Layout::from_size_align(64, 8).unwrap();

    unsafe {
        let block = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        std::ptr::write_bytes(block.as_ptr(), 0xFF, 64);

        arena.deallocate_all();

        let reused = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        assert_eq!(reused, block);
        let bytes = std::slice::from_raw_parts(reused.as_ptr(), 64);
        assert!(bytes.iter().all(|&b| b == 0xFF), "old bytes survive with zeroing off");
    }
}

#[test]
fn test_resize_of_stale_block_copies() {
    let arena = ArenaAllocator::new(1024).expect("arena creation failed");
    let layout = Layout::from_size_align(40, 8).unwrap();

    unsafe {
        let stale = arena.allocate(layout).expect("allocation failed").cast::<u8>();
        std::ptr::write_bytes(stale.as_ptr(), 0xAB, 40);
        let _latest = arena.allocate(layout).expect("allocation failed");

        // Only the latest block can change in place; older ones relocate.
        let bigger = Layout::from_size_align(80, 8).unwrap();
        let moved = arena.reallocate(stale, layout, bigger).expect("resize failed");
        assert_ne!(moved.cast::<u8>(), stale);

        let bytes = std::slice::from_raw_parts(moved.cast::<u8>().as_ptr(), 40);
        assert!(bytes.iter().all(|&b| b == 0xAB));
    }
}

#[test]
fn test_typed_values_in_arena() {
    let arena = ArenaAllocator::new(1024).expect("arena creation failed");

    unsafe {
        let a = arena.alloc_init(31u64).expect("alloc_init failed");
        let b = arena.alloc_init([1.5f64; 4]).expect("alloc_init failed");
        assert_eq!(*a.as_ref(), 31);
        assert_eq!(b.as_ref()[3], 1.5);
        // No typed dealloc needed: the arena reclaims everything on drop.
    }
}

proptest! {
    /// Any size/alignment mix yields aligned, writable, in-bounds blocks.
    #[test]
    fn prop_allocations_aligned_and_writable(
        sizes in prop::collection::vec(1usize..256, 1..24),
        align_shift in 0u32..7,
    ) {
        let align = 1usize << align_shift;
        let arena = ArenaAllocator::new(512).expect("arena creation failed");

        for size in sizes {
            let layout = Layout::from_size_align(size, align).unwrap();
            // SAFETY: blocks are written only within their size.
            unsafe {
                let block = arena.allocate(layout).expect("allocation failed");
                let ptr = block.cast::<u8>();
                prop_assert_eq!(ptr.as_ptr() as usize % align, 0);
                prop_assert_eq!(block.len(), size);
                ptr.as_ptr().write_bytes(0x77, size);
                prop_assert_eq!(ptr.as_ptr().add(size - 1).read(), 0x77);
            }
        }
        prop_assert!(arena.used() <= arena.capacity());
    }
}

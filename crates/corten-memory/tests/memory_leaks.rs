//! Lifecycle and composition tests
//!
//! Verifies that allocators hand their backing memory back on drop and
//! reset, and that the strategies compose through the common trait: any
//! allocator can serve as another's backing store.

use corten_memory::allocator::{
    Allocator, ArenaAllocator, PoolAllocator, StackAllocator, SystemAllocator, VirtualAllocator,
};
use corten_memory::platform;
use std::alloc::Layout;

/// Repeated create/use/drop cycles must not accumulate state.
#[test]
fn test_arena_create_drop_cycles() {
    for _ in 0..64 {
        let arena = ArenaAllocator::new(8192).expect("arena creation failed");
        unsafe {
            let layout = Layout::from_size_align(1024, 16).unwrap();
            for _ in 0..16 {
                // Forces growth past the first node on every cycle.
                let block = arena.allocate(layout).expect("allocation failed");
                std::ptr::write_bytes(block.cast::<u8>().as_ptr(), 0x6E, 1024);
            }
        }
        // Drop releases every node through the backing allocator.
    }
}

#[test]
fn test_reset_returns_usage_to_zero() {
    let arena = ArenaAllocator::new(512).expect("arena creation failed");
    let stack = StackAllocator::new(512).expect("stack creation failed");

    unsafe {
        let layout = Layout::from_size_align(200, 8).unwrap();
        for _ in 0..4 {
            let _ = arena.allocate(layout).expect("arena allocation failed");
            let _ = stack.allocate(layout).expect("stack allocation failed");
        }
        assert!(arena.used() > 0);
        assert!(stack.used() > 0);

        arena.deallocate_all();
        stack.deallocate_all();
        assert_eq!(arena.used(), 0);
        assert_eq!(stack.used(), 0);
    }
}

/// An arena whose nodes are individual guarded mappings.
#[test]
fn test_arena_over_virtual_memory() {
    let arena = ArenaAllocator::with_backing(VirtualAllocator::new(), 8192)
        .expect("arena creation failed");

    unsafe {
        let layout = Layout::from_size_align(512, 32).unwrap();
        let mut blocks = Vec::new();
        for fill in 0..24u8 {
            let block = arena.allocate(layout).expect("allocation failed").cast::<u8>();
            std::ptr::write_bytes(block.as_ptr(), fill, 512);
            blocks.push((block, fill));
        }

        for (block, fill) in blocks {
            let bytes = std::slice::from_raw_parts(block.as_ptr(), 512);
            assert!(bytes.iter().all(|&b| b == fill));
        }

        arena.deallocate_all();
        assert_eq!(arena.used(), 0);
    }
    // Drop unmaps the surviving node.
}

/// A stack borrowing its backing allocator instead of owning it.
#[test]
fn test_stack_over_borrowed_system() {
    let system = SystemAllocator::new();
    let stack = StackAllocator::with_backing(&system, 256).expect("stack creation failed");

    unsafe {
        let layout = Layout::from_size_align(600, 8).unwrap();
        // Growth goes through the borrowed reference.
        let block = stack.allocate(layout).expect("allocation failed");
        assert_eq!(block.len(), 600);
        assert_eq!(stack.node_count(), 2);
    }

    drop(stack);
    // The owner is free again once the borrower is gone.
    let _ = system;
}

/// A pool carved out of an arena node: the pool's buffer is arena memory,
/// so dropping the pool is enough even though arenas ignore deallocate.
#[test]
fn test_pool_over_arena() {
    let arena = ArenaAllocator::new(8192).expect("arena creation failed");
    let pool =
        PoolAllocator::with_backing(&arena, 64, 16, 32).expect("pool creation failed");
    let layout = Layout::from_size_align(64, 16).unwrap();

    unsafe {
        let mut chunks = Vec::new();
        for _ in 0..32 {
            chunks.push(pool.allocate(layout).expect("allocation failed").cast::<u8>());
        }
        assert!(pool.allocate(layout).unwrap_err().is_out_of_memory());
        for chunk in chunks {
            pool.deallocate(chunk, layout);
        }
    }

    drop(pool);
    assert!(arena.used() >= 32 * 64, "the pool buffer came from the arena");
}

#[test]
fn test_virtual_memory_alloc_free_loop() {
    let vm = VirtualAllocator::new();
    let page = platform::page_size();

    unsafe {
        for round in 0..32 {
            let size = (round + 1) * 100;
            let layout = Layout::from_size_align(size, 16).unwrap();
            let block = vm.allocate(layout).expect("allocation failed");

            let ptr = block.cast::<u8>();
            ptr.as_ptr().write(round as u8);
            ptr.as_ptr().add(size - 1).write(round as u8);

            vm.deallocate(ptr, layout);
        }

        // Page-sized churn as well, to cover multi-page mappings.
        let layout = Layout::from_size_align(page * 8, 64).unwrap();
        let block = vm.allocate(layout).expect("allocation failed");
        std::ptr::write_bytes(block.cast::<u8>().as_ptr(), 0x55, page * 8);
        vm.deallocate(block.cast(), layout);
    }
}

#[test]
fn test_stack_drop_mid_use() {
    // Dropping with live allocations must still release every node.
    for _ in 0..32 {
        let stack = StackAllocator::new(256).expect("stack creation failed");
        unsafe {
            let _a = stack.allocate(Layout::from_size_align(100, 8).unwrap());
            let _b = stack.allocate(Layout::from_size_align(700, 8).unwrap());
            assert_eq!(stack.node_count(), 2);
        }
    }
}

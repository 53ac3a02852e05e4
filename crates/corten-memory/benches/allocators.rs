//! Allocator strategy benchmarks
//!
//! Compares the strategies on the patterns they are built for: short
//! alloc/free churn, per-frame reset, and mixed random sizes.

use std::alloc::Layout;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::RngExt;

use corten_memory::allocator::{
    Allocator, ArenaAllocator, ArenaConfig, PoolAllocator, StackAllocator, SystemAllocator,
};

/// Reset without the memset so the benches measure allocation, not zeroing.
fn bench_arena(capacity: usize) -> ArenaAllocator {
    let config = ArenaConfig::default().zero_on_reset(false);
    ArenaAllocator::with_config(SystemAllocator, capacity, config).unwrap()
}

/// One fixed-size allocation, one free, per iteration.
fn bench_request_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_cycle");
    group.throughput(Throughput::Elements(1));
    let layout = Layout::from_size_align(256, 16).unwrap();

    group.bench_function("system", |b| {
        let alloc = SystemAllocator::new();
        b.iter(|| unsafe {
            let block = alloc.allocate(layout).unwrap();
            black_box(block.cast::<u8>().as_ptr());
            alloc.deallocate(block.cast(), layout);
        });
    });

    group.bench_function("pool", |b| {
        let pool = PoolAllocator::with_align(256, 16, 1024).unwrap();
        b.iter(|| unsafe {
            let block = pool.allocate(layout).unwrap();
            black_box(block.cast::<u8>().as_ptr());
            pool.deallocate(block.cast(), layout);
        });
    });

    group.bench_function("stack", |b| {
        let stack = StackAllocator::new(64 * 1024).unwrap();
        b.iter(|| unsafe {
            let block = stack.allocate(layout).unwrap();
            black_box(block.cast::<u8>().as_ptr());
            stack.deallocate(block.cast(), layout);
        });
    });

    group.finish();
}

/// Burst of allocations followed by one bulk reset, the frame pattern
/// arenas are made for.
fn bench_frame_reset(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_reset");
    group.throughput(Throughput::Elements(64));
    let layout = Layout::from_size_align(192, 16).unwrap();

    group.bench_function("arena", |b| {
        let arena = bench_arena(64 * 1024);
        b.iter(|| unsafe {
            for _ in 0..64 {
                let block = arena.allocate(layout).unwrap();
                black_box(block.cast::<u8>().as_ptr());
            }
            arena.deallocate_all();
        });
    });

    group.bench_function("system", |b| {
        let alloc = SystemAllocator::new();
        let mut blocks = Vec::with_capacity(64);
        b.iter(|| unsafe {
            for _ in 0..64 {
                let block = alloc.allocate(layout).unwrap();
                black_box(block.cast::<u8>().as_ptr());
                blocks.push(block);
            }
            for block in blocks.drain(..) {
                alloc.deallocate(block.cast(), layout);
            }
        });
    });

    group.finish();
}

/// Mixed sizes drawn once up front, replayed against arena and system.
fn bench_random_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_sizes");
    let mut rng = rand::rng();
    let sizes: Vec<usize> = (0..128).map(|_| rng.random_range(8..512)).collect();
    group.throughput(Throughput::Elements(sizes.len() as u64));

    group.bench_function("arena", |b| {
        let arena = bench_arena(256 * 1024);
        b.iter(|| unsafe {
            for &size in &sizes {
                let layout = Layout::from_size_align(size, 16).unwrap();
                let block = arena.allocate(layout).unwrap();
                black_box(block.cast::<u8>().as_ptr());
            }
            arena.deallocate_all();
        });
    });

    group.bench_function("system", |b| {
        let alloc = SystemAllocator::new();
        let mut blocks = Vec::with_capacity(sizes.len());
        b.iter(|| unsafe {
            for &size in &sizes {
                let layout = Layout::from_size_align(size, 16).unwrap();
                let block = alloc.allocate(layout).unwrap();
                black_box(block.cast::<u8>().as_ptr());
                blocks.push((block, layout));
            }
            for (block, layout) in blocks.drain(..) {
                alloc.deallocate(block.cast(), layout);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_request_cycle, bench_frame_reset, bench_random_sizes);
criterion_main!(benches);

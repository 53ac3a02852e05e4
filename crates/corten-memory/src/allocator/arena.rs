//! Growable bump (arena) allocator.
//!
//! An arena hands out memory by advancing an offset through a node buffer.
//! Individual frees do not exist; memory comes back all at once through
//! `deallocate_all` or when the arena is dropped. When a node fills up the
//! arena grows by appending a fresh node obtained from its backing
//! allocator, so allocation never fails until the backing does.
//!
//! Memory layout of a node:
//!
//! ```text
//! buf                                      buf + size
//! |----------------|===========|...........|
//! ^ allocations    ^ latest    ^ free
//!                  prev_offset offset
//! ```

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::{align_forward, dangling_slice};

use super::{Allocator, SystemAllocator, DEFAULT_ALIGNMENT, DEFAULT_ARENA_CAPACITY};

/// Tuning knobs for [`ArenaAllocator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaConfig {
    /// Multiplier applied to the largest node size when growing. Must be
    /// greater than 1.
    pub growth_factor: f64,
    /// Zero the surviving node's contents on `deallocate_all`.
    pub zero_on_reset: bool,
    /// Turn `deallocate` of a single block into a panic instead of the
    /// default no-op, for catching callers that assume real frees.
    pub strict_free: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig { growth_factor: 2.0, zero_on_reset: true, strict_free: false }
    }
}

impl ArenaConfig {
    /// Sets the growth multiplier.
    #[must_use]
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Sets whether `deallocate_all` zeroes the surviving node.
    #[must_use]
    pub fn zero_on_reset(mut self, zero: bool) -> Self {
        self.zero_on_reset = zero;
        self
    }

    /// Sets whether individual `deallocate` calls panic.
    #[must_use]
    pub fn strict_free(mut self, strict: bool) -> Self {
        self.strict_free = strict;
        self
    }
}

/// One backing region. `offset` is the first free byte; `prev_offset` is
/// where the most recent allocation in this node starts.
struct ArenaNode {
    buf: NonNull<u8>,
    size: usize,
    offset: usize,
    prev_offset: usize,
}

impl ArenaNode {
    #[inline]
    fn start(&self) -> usize {
        self.buf.as_ptr() as usize
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.start() + self.size
    }

    /// Bumps the node's offset for a `size`/`align` request, or reports
    /// that the node is full.
    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let aligned = align_forward(self.start() + self.offset, align) - self.start();
        let end = aligned.checked_add(size)?;
        if end > self.size {
            return None;
        }
        self.prev_offset = aligned;
        self.offset = end;
        // SAFETY: aligned < self.size, so the sum stays inside the buffer
        // and cannot be null.
        Some(unsafe { NonNull::new_unchecked(self.buf.as_ptr().add(aligned)) })
    }
}

/// Monotonic allocator over a growable list of nodes.
///
/// Allocation is a pointer bump in the newest node; when that node is full
/// the arena first looks for space in older nodes (oldest first) and only
/// then grows. Growing appends a node sized
/// `max(largest_node * growth_factor, size + align)` obtained from the
/// backing allocator `B`.
///
/// `deallocate` is accepted and ignored (see [`ArenaConfig::strict_free`]);
/// `deallocate_all` keeps only the newest node and resets it, so a reset
/// arena retains its largest region for reuse.
///
/// # Examples
/// ```
/// use corten_memory::allocator::{Allocator, ArenaAllocator};
/// use std::alloc::Layout;
///
/// let arena = ArenaAllocator::new(4096)?;
/// let a = unsafe { arena.allocate(Layout::from_size_align(100, 16)?)? };
/// let b = unsafe { arena.allocate(Layout::from_size_align(100, 16)?)? };
/// assert_ne!(a.cast::<u8>(), b.cast::<u8>());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ArenaAllocator<B: Allocator = SystemAllocator> {
    backing: B,
    nodes: RefCell<Vec<ArenaNode>>,
    config: ArenaConfig,
}

impl ArenaAllocator<SystemAllocator> {
    /// Creates an arena over the system heap with one eager node of
    /// `capacity` bytes (0 selects [`DEFAULT_ARENA_CAPACITY`]).
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_backing(SystemAllocator, capacity)
    }
}

impl<B: Allocator> ArenaAllocator<B> {
    /// Creates an arena whose nodes come from `backing`.
    pub fn with_backing(backing: B, capacity: usize) -> AllocResult<Self> {
        Self::with_config(backing, capacity, ArenaConfig::default())
    }

    /// Creates an arena with explicit tuning.
    pub fn with_config(backing: B, capacity: usize, config: ArenaConfig) -> AllocResult<Self> {
        if config.growth_factor.is_nan() || config.growth_factor <= 1.0 {
            return Err(AllocError::invalid_config("growth factor must be greater than 1"));
        }
        let capacity = if capacity == 0 { DEFAULT_ARENA_CAPACITY } else { capacity };
        let arena = ArenaAllocator { backing, nodes: RefCell::new(Vec::new()), config };
        arena.push_node(capacity)?;
        Ok(arena)
    }

    /// Total bytes across all nodes.
    pub fn capacity(&self) -> usize {
        self.nodes.borrow().iter().map(|node| node.size).sum()
    }

    /// Bytes currently claimed, including alignment slack.
    pub fn used(&self) -> usize {
        self.nodes.borrow().iter().map(|node| node.offset).sum()
    }

    /// Bytes still free across all nodes.
    pub fn available(&self) -> usize {
        self.nodes.borrow().iter().map(|node| node.size - node.offset).sum()
    }

    /// Number of backing nodes currently held.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Allocates a fresh node from the backing allocator and appends it as
    /// the new head.
    fn push_node(&self, size: usize) -> AllocResult<()> {
        let layout = Layout::from_size_align(size, DEFAULT_ALIGNMENT)
            .map_err(|_| AllocError::invalid_layout(size, DEFAULT_ALIGNMENT))?;
        // SAFETY: layout constructed and checked above.
        let buf = unsafe { self.backing.allocate(layout)? }.cast::<u8>();

        #[cfg(feature = "logging")]
        tracing::debug!(size, nodes = self.nodes.borrow().len() + 1, "arena node added");

        self.nodes.borrow_mut().push(ArenaNode { buf, size, offset: 0, prev_offset: 0 });
        Ok(())
    }

    fn release_node(backing: &B, node: &ArenaNode) {
        if let Ok(layout) = Layout::from_size_align(node.size, DEFAULT_ALIGNMENT) {
            // SAFETY: node.buf came from backing.allocate with this exact
            // layout in push_node.
            unsafe { backing.deallocate(node.buf, layout) };
        }
    }
}

impl<B: Allocator> core::fmt::Debug for ArenaAllocator<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("nodes", &self.node_count())
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("config", &self.config)
            .finish()
    }
}

// SAFETY: The arena owns its nodes and the RefCell keeps it !Sync; sending
// the whole arena to another thread also moves ownership of every node
// buffer, which is sound as long as the backing allocator itself is Send.
unsafe impl<B: Allocator + Send> Send for ArenaAllocator<B> {}

impl<B: Allocator> Drop for ArenaAllocator<B> {
    fn drop(&mut self) {
        for node in self.nodes.borrow_mut().drain(..) {
            Self::release_node(&self.backing, &node);
        }
    }
}

unsafe impl<B: Allocator> Allocator for ArenaAllocator<B> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let (size, align) = (layout.size(), layout.align());
        if size == 0 {
            return Ok(dangling_slice(align));
        }

        {
            let mut nodes = self.nodes.borrow_mut();
            let head = nodes.len() - 1;
            if let Some(ptr) = nodes[head].bump(size, align) {
                return Ok(NonNull::slice_from_raw_parts(ptr, size));
            }
            // Head is full; older nodes may still have room.
            for node in nodes[..head].iter_mut() {
                if let Some(ptr) = node.bump(size, align) {
                    return Ok(NonNull::slice_from_raw_parts(ptr, size));
                }
            }
        }

        // Nothing fits; grow. The borrow is released so push_node can take
        // it again after calling the backing allocator.
        let largest = self.nodes.borrow().iter().map(|node| node.size).max().unwrap_or(0);
        let grown = (largest as f64 * self.config.growth_factor) as usize;
        self.push_node(grown.max(size + align))?;

        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        match nodes[head].bump(size, align) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, size)),
            // The fresh node was sized to fit the request.
            None => Err(AllocError::out_of_memory(layout)),
        }
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        if self.config.strict_free {
            panic!("arena allocator: individual deallocation is not supported");
        }
        // Default: accepted and ignored; the space comes back on reset.
    }

    unsafe fn allocate_all(&self, align: usize) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(align.is_power_of_two());

        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        let head = &mut nodes[head];
        let aligned = align_forward(head.start() + head.offset, align) - head.start();
        if aligned >= head.size {
            return Err(AllocError::out_of_memory_sized(0, align));
        }

        let remaining = head.size - aligned;
        head.prev_offset = aligned;
        head.offset = head.size;
        // SAFETY: aligned < head.size keeps the pointer inside the buffer.
        let ptr = unsafe { NonNull::new_unchecked(head.buf.as_ptr().add(aligned)) };
        Ok(NonNull::slice_from_raw_parts(ptr, remaining))
    }

    unsafe fn deallocate_all(&self) {
        let mut nodes = self.nodes.borrow_mut();

        // The newest node is the largest; keep it for reuse and return the
        // rest to the backing allocator.
        let mut head = match nodes.pop() {
            Some(head) => head,
            None => return,
        };

        #[cfg(feature = "logging")]
        tracing::debug!(dropped = nodes.len(), "arena reset");

        for node in nodes.drain(..) {
            Self::release_node(&self.backing, &node);
        }

        if self.config.zero_on_reset {
            // SAFETY: head.buf covers head.size bytes owned by this arena;
            // every allocation in it was retired by this call.
            unsafe { head.buf.as_ptr().write_bytes(0, head.size) };
        }
        head.offset = 0;
        head.prev_offset = 0;
        nodes.push(head);
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        let (old_size, new_size) = (old_layout.size(), new_layout.size());
        if new_size == 0 {
            // Frees are no-ops, so the old bytes are simply abandoned.
            return Ok(dangling_slice(new_layout.align()));
        }
        if old_size == 0 {
            return unsafe { self.allocate(new_layout) };
        }

        let addr = ptr.as_ptr() as usize;
        let in_place = {
            let nodes = self.nodes.borrow();
            let Some(idx) = nodes.iter().position(|node| node.contains(addr)) else {
                panic!("arena allocator: out-of-bounds reallocation");
            };
            let node = &nodes[idx];

            // Only the most recent allocation in its node can move the
            // offset; anything older relocates.
            let is_latest = node.start() + node.prev_offset == addr
                && node.offset - node.prev_offset == old_size;
            let fits = is_latest
                && new_layout.align() <= old_layout.align()
                && node.prev_offset + new_size <= node.size;
            fits.then_some(idx)
        };

        if let Some(idx) = in_place {
            let mut nodes = self.nodes.borrow_mut();
            let node = &mut nodes[idx];
            let new_end = node.prev_offset + new_size;
            if new_size < old_size {
                // SAFETY: the abandoned tail [new_end, old end) lies inside
                // the node buffer.
                unsafe {
                    node.buf.as_ptr().add(new_end).write_bytes(0, old_size - new_size);
                }
            }
            node.offset = new_end;
            return Ok(NonNull::slice_from_raw_parts(ptr, new_size));
        }

        // SAFETY: plain allocation; the old block stays where it is.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let preserved = old_size.min(new_size);
        // SAFETY: ptr is valid for old_size >= preserved reads (caller
        // contract) and new_ptr for new_size >= preserved writes; arena
        // allocations never overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), preserved);
        }
        Ok(new_ptr)
    }
}

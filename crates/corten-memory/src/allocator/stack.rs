//! LIFO stack allocator with per-allocation headers.
//!
//! Works like the arena but supports freeing and resizing the most recent
//! allocation in O(1). Each allocation is preceded by a small header that
//! records where the previous allocation started, which is all the state
//! needed to unwind in strict LIFO order.
//!
//! Memory layout around one allocation:
//!
//! ```text
//!          region_start          data                    offset
//! buf .....|<--- padding ------->|<------- size -------->|......
//!               |<--- header --->|
//!               prev_offset, padding
//! ```
//!
//! `padding` both aligns `data` and reserves the header slot, so the header
//! always sits directly below the pointer handed out.

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::utils::{dangling_slice, header_padding};

use super::{Allocator, SystemAllocator, DEFAULT_STACK_CAPACITY};

/// Bookkeeping stored immediately before every allocation.
///
/// `prev_offset` is where the allocation *below* this one starts in the
/// node (the node's previous `prev_offset`); `padding` is the distance from
/// this allocation's region start to its data pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct StackHeader {
    prev_offset: usize,
    padding: usize,
}

const HEADER_SIZE: usize = size_of::<StackHeader>();

/// Tuning knobs for [`StackAllocator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackConfig {
    /// Multiplier applied to the largest node size when growing. Must be
    /// greater than 1.
    pub growth_factor: f64,
    /// Zero the surviving node's contents on `deallocate_all`.
    pub zero_on_reset: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig { growth_factor: 2.0, zero_on_reset: true }
    }
}

impl StackConfig {
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
}

/// One backing region. `offset` is the first free byte; `prev_offset` is
/// the region start of the most recent allocation in this node.
struct StackNode {
    buf: NonNull<u8>,
    size: usize,
    offset: usize,
    prev_offset: usize,
}

impl StackNode {
    #[inline]
    fn start(&self) -> usize {
        self.buf.as_ptr() as usize
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.start() + self.size
    }

    /// Claims space for a `size`/`align` request and writes its header, or
    /// reports that the node is full. `align` must already include the
    /// header alignment floor.
    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let padding = header_padding(self.start() + self.offset, align, HEADER_SIZE);
        let region_start = self.offset;
        let data_offset = region_start.checked_add(padding)?;
        let end = data_offset.checked_add(size)?;
        if end > self.size {
            return None;
        }

        // SAFETY: padding >= HEADER_SIZE, so the header slot
        // [data_offset - HEADER_SIZE, data_offset) lies inside the buffer;
        // data is aligned to at least align_of::<StackHeader>(), keeping
        // the header write aligned.
        let data = unsafe { self.buf.as_ptr().add(data_offset) };
        unsafe {
            data.cast::<StackHeader>()
                .sub(1)
                .write(StackHeader { prev_offset: self.prev_offset, padding });
        }

        self.prev_offset = region_start;
        self.offset = end;
        NonNull::new(data)
    }
}

/// LIFO allocator over a growable list of nodes.
///
/// All allocation happens in the newest node; when it fills up a larger
/// node (`max(largest_node * growth_factor, align + header + size)` bytes)
/// is appended and becomes the only node allocations are served from.
///
/// `deallocate` and `reallocate` only accept the most recent allocation of
/// the newest node; anything else is a caller bug and panics. The one
/// tolerated exception is freeing a pointer that was already unwound, which
/// is a defined no-op.
///
/// # Examples
/// ```
/// use corten_memory::allocator::{Allocator, StackAllocator};
/// use std::alloc::Layout;
///
/// let stack = StackAllocator::new(1024)?;
/// let layout = Layout::from_size_align(64, 16)?;
///
/// let a = unsafe { stack.allocate(layout)? };
/// let b = unsafe { stack.allocate(layout)? };
/// unsafe {
///     stack.deallocate(b.cast(), layout);
///     stack.deallocate(a.cast(), layout);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct StackAllocator<B: Allocator = SystemAllocator> {
    backing: B,
    nodes: RefCell<Vec<StackNode>>,
    config: StackConfig,
}

impl StackAllocator<SystemAllocator> {
    /// Creates a stack over the system heap with one eager node of
    /// `capacity` bytes (0 selects [`DEFAULT_STACK_CAPACITY`]).
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_backing(SystemAllocator, capacity)
    }
}

impl<B: Allocator> StackAllocator<B> {
    /// Creates a stack whose nodes come from `backing`.
    pub fn with_backing(backing: B, capacity: usize) -> AllocResult<Self> {
        Self::with_config(backing, capacity, StackConfig::default())
    }

    /// Creates a stack with explicit tuning.
    pub fn with_config(backing: B, capacity: usize, config: StackConfig) -> AllocResult<Self> {
        if config.growth_factor.is_nan() || config.growth_factor <= 1.0 {
            return Err(AllocError::invalid_config("growth factor must be greater than 1"));
        }
        let capacity = if capacity == 0 { DEFAULT_STACK_CAPACITY } else { capacity };
        let stack = StackAllocator { backing, nodes: RefCell::new(Vec::new()), config };
        stack.push_node(capacity)?;
        Ok(stack)
    }

    /// Total bytes across all nodes.
    pub fn capacity(&self) -> usize {
        self.nodes.borrow().iter().map(|node| node.size).sum()
    }

    /// Bytes currently claimed, including headers and alignment slack.
    pub fn used(&self) -> usize {
        self.nodes.borrow().iter().map(|node| node.offset).sum()
    }

    /// Number of backing nodes currently held.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Alignment actually used inside nodes: at least the header alignment,
    /// so headers can be read and written directly.
    #[inline]
    fn effective_align(align: usize) -> usize {
        align.max(align_of::<StackHeader>())
    }

    fn grown_size(&self, requested: usize, align: usize) -> usize {
        let largest = self.nodes.borrow().iter().map(|node| node.size).max().unwrap_or(0);
        let grown = (largest as f64 * self.config.growth_factor) as usize;
        grown.max(align + HEADER_SIZE + requested)
    }

    fn push_node(&self, size: usize) -> AllocResult<()> {
        let layout = Layout::from_size_align(size, super::DEFAULT_ALIGNMENT)
            .map_err(|_| AllocError::invalid_layout(size, super::DEFAULT_ALIGNMENT))?;
        // SAFETY: layout constructed and checked above.
        let buf = unsafe { self.backing.allocate(layout)? }.cast::<u8>();

        #[cfg(feature = "logging")]
        tracing::debug!(size, nodes = self.nodes.borrow().len() + 1, "stack node added");

        self.nodes.borrow_mut().push(StackNode { buf, size, offset: 0, prev_offset: 0 });
        Ok(())
    }

    fn release_node(backing: &B, node: &StackNode) {
        if let Ok(layout) = Layout::from_size_align(node.size, super::DEFAULT_ALIGNMENT) {
            // SAFETY: node.buf came from backing.allocate with this exact
            // layout in push_node.
            unsafe { backing.deallocate(node.buf, layout) };
        }
    }

    /// Reads the header below a live allocation.
    ///
    /// # Safety
    /// `ptr` must point at the data of an allocation made by this stack.
    unsafe fn read_header(ptr: NonNull<u8>) -> StackHeader {
        // SAFETY: the header was written at ptr - HEADER_SIZE by bump and
        // the slot is aligned for StackHeader.
        unsafe { ptr.as_ptr().cast::<StackHeader>().sub(1).read() }
    }
}

impl<B: Allocator> core::fmt::Debug for StackAllocator<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("nodes", &self.node_count())
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("config", &self.config)
            .finish()
    }
}

// SAFETY: The stack owns its nodes and the RefCell keeps it !Sync; sending
// it to another thread moves ownership of every node buffer along with it.
unsafe impl<B: Allocator + Send> Send for StackAllocator<B> {}

impl<B: Allocator> Drop for StackAllocator<B> {
    fn drop(&mut self) {
        for node in self.nodes.borrow_mut().drain(..) {
            Self::release_node(&self.backing, &node);
        }
    }
}

unsafe impl<B: Allocator> Allocator for StackAllocator<B> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let size = layout.size();
        if size == 0 {
            return Ok(dangling_slice(layout.align()));
        }
        let align = Self::effective_align(layout.align());

        {
            let mut nodes = self.nodes.borrow_mut();
            let head = nodes.len() - 1;
            if let Some(ptr) = nodes[head].bump(size, align) {
                return Ok(NonNull::slice_from_raw_parts(ptr, size));
            }
        }

        // The head is full. Unlike the arena, older nodes are never
        // revisited; unwinding must stay unambiguous.
        self.push_node(self.grown_size(size, align))?;

        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        match nodes[head].bump(size, align) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, size)),
            // The fresh node was sized to fit the request.
            None => Err(AllocError::out_of_memory(layout)),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        let addr = ptr.as_ptr() as usize;
        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        let node = &mut nodes[head];

        assert!(node.contains(addr), "stack allocator: out-of-bounds pointer");
        if addr >= node.start() + node.offset {
            // Already unwound; freeing twice is a defined no-op.
            return;
        }

        // SAFETY: addr points below the current offset of the node, so it
        // is (or was) the data pointer of an allocation with a header.
        let header = unsafe { Self::read_header(ptr) };
        let region_start = (addr - node.start()) - header.padding;
        assert!(
            region_start == node.prev_offset,
            "stack allocator: out-of-order deallocation",
        );

        node.offset = region_start;
        node.prev_offset = header.prev_offset;
    }

    unsafe fn allocate_all(&self, align: usize) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(align.is_power_of_two());
        let align = Self::effective_align(align);

        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        let node = &mut nodes[head];

        let padding = header_padding(node.start() + node.offset, align, HEADER_SIZE);
        let data_offset = node.offset + padding;
        if data_offset >= node.size {
            return Err(AllocError::out_of_memory_sized(0, align));
        }
        let remaining = node.size - data_offset;

        // The drained block is a regular allocation: it carries a header
        // and can be released with deallocate like any other.
        let region_start = node.offset;
        // SAFETY: data_offset < node.size and padding >= HEADER_SIZE keep
        // both the header slot and the data inside the buffer.
        let data = unsafe { node.buf.as_ptr().add(data_offset) };
        unsafe {
            data.cast::<StackHeader>()
                .sub(1)
                .write(StackHeader { prev_offset: node.prev_offset, padding });
        }
        node.prev_offset = region_start;
        node.offset = node.size;

        // SAFETY: data points inside the node buffer, never null.
        Ok(NonNull::slice_from_raw_parts(unsafe { NonNull::new_unchecked(data) }, remaining))
    }

    unsafe fn deallocate_all(&self) {
        let mut nodes = self.nodes.borrow_mut();
        let mut head = match nodes.pop() {
            Some(head) => head,
            None => return,
        };

        #[cfg(feature = "logging")]
        tracing::debug!(dropped = nodes.len(), "stack reset");

        for node in nodes.drain(..) {
            Self::release_node(&self.backing, &node);
        }

        if self.config.zero_on_reset {
            // SAFETY: head.buf covers head.size bytes owned by this stack;
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
            // SAFETY: ptr is live with old_layout (caller contract).
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling_slice(new_layout.align()));
        }
        if old_size == 0 {
            return unsafe { self.allocate(new_layout) };
        }

        let addr = ptr.as_ptr() as usize;
        let align = Self::effective_align(new_layout.align());

        let (header, region_start) = {
            let mut nodes = self.nodes.borrow_mut();
            let head = nodes.len() - 1;
            let node = &mut nodes[head];

            assert!(node.contains(addr), "stack allocator: out-of-bounds reallocation");
            assert!(
                addr < node.start() + node.offset,
                "stack allocator: out-of-order reallocation",
            );

            // SAFETY: addr is a live data pointer in this node, checked
            // above, so a header precedes it.
            let header = unsafe { Self::read_header(ptr) };
            let region_start = (addr - node.start()) - header.padding;
            assert!(
                region_start == node.prev_offset,
                "stack allocator: out-of-order reallocation",
            );

            if new_size == old_size && new_layout.align() <= old_layout.align() {
                return Ok(NonNull::slice_from_raw_parts(ptr, new_size));
            }

            // The data pointer only stays put if the recomputed padding
            // matches; otherwise the block must move.
            let new_padding = header_padding(node.start() + region_start, align, HEADER_SIZE);
            let new_end = region_start + new_padding + new_size;
            if new_padding == header.padding && new_end <= node.size {
                node.offset = new_end;
                return Ok(NonNull::slice_from_raw_parts(ptr, new_size));
            }
            (header, region_start)
        };

        // Move to a fresh node. The old node's state is restored only after
        // the copy so the source stays intact.
        self.push_node(self.grown_size(new_size, align))?;

        let mut nodes = self.nodes.borrow_mut();
        let head = nodes.len() - 1;
        let new_ptr = match nodes[head].bump(new_size, align) {
            Some(new_ptr) => new_ptr,
            None => return Err(AllocError::out_of_memory(new_layout)),
        };

        let preserved = old_size.min(new_size);
        // SAFETY: the source lives in the previous node, the destination in
        // the fresh one; regions cannot overlap and both cover preserved
        // bytes.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), preserved);
        }

        // Unwind the relocated allocation from its old node, same as
        // deallocate but skipping the re-checks already done above.
        let old_node = &mut nodes[head - 1];
        old_node.offset = region_start;
        old_node.prev_offset = header.prev_offset;

        Ok(NonNull::slice_from_raw_parts(new_ptr, new_size))
    }
}

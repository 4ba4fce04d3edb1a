//! The process-wide heap on the program break.
//!
//! ```rust,ignore
//! use brkheap::SbrkAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: SbrkAllocator = SbrkAllocator;
//! ```

use std::{
  alloc::{GlobalAlloc, Layout},
  ptr::NonNull,
};

use crate::{config::Config, error::AllocResult, heap::Heap, source::Sbrk};

/// The single heap that owns the program break. Initialized on first use.
pub static HEAP: Heap<Sbrk> = Heap::with_config(Sbrk, Config::global());

/// Allocates `size` bytes from [`HEAP`].
pub fn allocate(size: usize) -> AllocResult<NonNull<u8>> {
  HEAP.allocate(size)
}

/// Returns a block to [`HEAP`].
///
/// # Safety
///
/// `ptr` must be null or a live allocation returned by [`allocate`].
pub unsafe fn release(ptr: *mut u8) {
  unsafe { HEAP.release(ptr) }
}

/// `#[global_allocator]` front for [`HEAP`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SbrkAllocator;

unsafe impl GlobalAlloc for SbrkAllocator {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    unsafe { HEAP.alloc(layout) }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    unsafe { HEAP.dealloc(ptr, layout) }
  }
}

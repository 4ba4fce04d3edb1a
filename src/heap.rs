use std::{
  alloc::{GlobalAlloc, Layout},
  ptr::{self, NonNull},
};

use log::debug;
use parking_lot::{Mutex, const_mutex};

use crate::{
  align::{WORD, align_up},
  block::{BlockInfo, HEADER_SIZE},
  config::Config,
  error::{AllocError, AllocResult, InvariantError},
  region::Region,
  source::HeapSource,
  state::HeapState,
};

/// Largest request accepted. Keeps `HEADER_SIZE + align!(size)` and the
/// source increment within `isize::MAX`.
pub const MAX_REQUEST: usize = isize::MAX as usize - HEADER_SIZE - WORD;

/// Summary of the block directory produced by [`Heap::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes between heap start and heap end, headers included.
  pub heap_bytes: usize,
  pub blocks: usize,
  pub used_blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes held by used blocks.
  pub used_bytes: usize,
  /// Payload bytes held by free blocks.
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// A heap carved into header-prefixed blocks, grown from a [`HeapSource`] and
/// guarded by a single lock.
///
/// ```rust
/// use brkheap::{Arena, Heap};
///
/// let heap = Heap::new(Arena::with_capacity(4096));
///
/// let a = heap.allocate(100).unwrap();
/// let b = heap.allocate(50).unwrap();
/// assert_ne!(a, b);
///
/// unsafe {
///     heap.release(a.as_ptr());
///     heap.release(b.as_ptr());
/// }
/// assert_eq!(heap.verify().unwrap().blocks, 1);
/// ```
pub struct Heap<S> {
  state: Mutex<HeapState<S>>,
}

impl<S: HeapSource> Heap<S> {
  pub const fn new(source: S) -> Self {
    Self::with_config(source, Config::new())
  }

  pub const fn with_config(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      state: const_mutex(HeapState::new(source, config)),
    }
  }

  pub fn config(&self) -> Config {
    self.state.lock().config
  }

  /// Records the heap start. Runs implicitly on the first allocation.
  pub fn initialize(&self) -> AllocResult<()> {
    self.state.lock().ensure_initialized()
  }

  /// Current `(start, end)` of the heap, once initialized.
  pub fn bounds(&self) -> Option<(usize, usize)> {
    let state = self.state.lock();
    state.initialized.then(|| (state.region.start(), state.region.end()))
  }

  /// Allocates at least `size` bytes, word aligned.
  ///
  /// Reuses the first fitting free block in the configured scan order,
  /// splitting off any profitable remainder, or grows the heap when none
  /// fits. A failed growth fails only this request.
  pub fn allocate(
    &self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    if size > MAX_REQUEST {
      return Err(AllocError::TooLarge { size });
    }
    let request = align!(size.max(1));

    let mut state = self.state.lock();
    state.ensure_initialized()?;

    let at = match state.find_fit(request) {
      Some(at) => {
        state.split(at, request);
        unsafe { state.region.update(at, |h| h.set_in_use(true)) };
        at
      }
      None => state.grow(request)?,
    };
    state.last = Some(at);

    let payload = Region::payload(at);
    event!(state.config, trace, "allocated {request} bytes at {payload:#x}");

    // Payloads start past a header at a non-zero address.
    Ok(unsafe { NonNull::new_unchecked(payload as *mut u8) })
  }

  /// Releases a block and merges it with free neighbours. Null is ignored.
  ///
  /// A pointer this heap did not hand out, or one already released, is
  /// treated as corruption and handled per [`Config::on_corruption`].
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live allocation of this heap; the caller gives
  /// up every access to it.
  pub unsafe fn release(
    &self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }
    self.state.lock().release(ptr as usize);
  }

  /// Payload capacity of a live allocation, at least the size requested.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn usable_size(
    &self,
    ptr: *const u8,
  ) -> usize {
    self.state.lock().live_header(ptr as usize).size
  }

  /// Visits every block in address order while holding the heap lock.
  ///
  /// `f` must not allocate from this heap; for the heap behind the global
  /// allocator that rules out allocating at all.
  pub fn for_each_block(
    &self,
    mut f: impl FnMut(&BlockInfo),
  ) {
    let state = self.state.lock();
    if !state.initialized {
      return;
    }
    for (at, header) in unsafe { state.region.walk(state.region.start(), state.region.end()) } {
      f(&BlockInfo::new(at, &header));
    }
  }

  /// Snapshot of the block directory. Not for the global allocator's heap.
  pub fn blocks(&self) -> Vec<BlockInfo> {
    let mut blocks = Vec::new();
    self.for_each_block(|block| blocks.push(*block));
    blocks
  }

  /// Logs every block at debug level. Not for the global allocator's heap.
  pub fn dump(&self) {
    let state = self.state.lock();
    debug!("------ heap [{:#x}, {:#x}) ------", state.region.start(), state.region.end());
    if state.initialized {
      for (at, header) in unsafe { state.region.walk(state.region.start(), state.region.end()) } {
        debug!(
          "block {at:#x}: prev={:#x} next={:#x} size={} tag={:#06x} in_use={}",
          header.prev,
          header.next,
          header.size,
          header.magic,
          header.in_use()
        );
      }
    }
    debug!("------ end of heap ------");
  }

  /// Walks the whole directory checking links, coalescing, the terminal
  /// block and the next-fit cursor.
  pub fn verify(&self) -> Result<HeapStats, InvariantError> {
    let state = self.state.lock();
    let mut stats = HeapStats::default();
    if !state.initialized {
      return Ok(stats);
    }

    let (start, end) = (state.region.start(), state.region.end());
    let mut previous: Option<(usize, bool)> = None;
    let mut cursor_seen = state.last.is_none();

    for (at, header) in unsafe { state.region.walk(start, end) } {
      let expected_prev = previous.map(|(prev, _)| prev);
      if header.previous() != expected_prev {
        return Err(InvariantError::BackLink {
          header: at,
          expected: expected_prev.unwrap_or(0),
          found: header.prev,
        });
      }

      let expected_next = Region::payload(at) + header.size;
      if header.next != expected_next {
        return Err(InvariantError::ForwardLink {
          header: at,
          expected: expected_next,
          found: header.next,
        });
      }

      if let Some((prev, prev_in_use)) = previous {
        if !prev_in_use && !header.in_use() {
          return Err(InvariantError::AdjacentFree { first: prev, second: at });
        }
      }

      cursor_seen |= state.last == Some(at);
      stats.blocks += 1;
      if header.in_use() {
        stats.used_blocks += 1;
        stats.used_bytes += header.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += header.size;
        stats.largest_free = stats.largest_free.max(header.size);
      }
      previous = Some((at, header.in_use()));
    }

    let found = previous.map_or(0, |(at, _)| at);
    let recorded = state.tail.unwrap_or(0);
    if found != recorded {
      return Err(InvariantError::Tail { recorded, found });
    }
    if !cursor_seen {
      return Err(InvariantError::DanglingCursor {
        cursor: state.last.unwrap_or(0),
      });
    }

    stats.heap_bytes = end - start;
    Ok(stats)
  }

  /// Forgets every block so the heap starts over from the source's current
  /// top. Memory already obtained is not returned.
  ///
  /// # Safety
  ///
  /// No allocation of this heap may be used or released afterwards.
  pub unsafe fn reset(&self) {
    self.state.lock().reset();
  }

  pub fn into_source(self) -> S {
    self.state.into_inner().source
  }
}

impl<S: HeapSource + Default> Default for Heap<S> {
  fn default() -> Self {
    Self::new(S::default())
  }
}

/// Serves layouts aligned beyond one word by over-allocating and stashing the
/// block's payload address in the word before the aligned pointer.
///
/// Build the heap with [`CorruptionPolicy::Abort`](crate::CorruptionPolicy::Abort)
/// and event logging off before installing it: an allocator must not unwind,
/// and a logger that allocates would re-enter the heap lock.
unsafe impl<S: HeapSource + Send> GlobalAlloc for Heap<S> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() <= WORD {
      return self.allocate(layout.size()).map_or(ptr::null_mut(), NonNull::as_ptr);
    }

    let Some(padded) = layout.size().checked_add(layout.align()) else {
      return ptr::null_mut();
    };
    let Ok(base) = self.allocate(padded) else {
      return ptr::null_mut();
    };

    let base = base.as_ptr() as usize;
    let aligned = align_up(base + WORD, layout.align());
    unsafe { ((aligned - WORD) as *mut usize).write(base) };
    aligned as *mut u8
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    let base = if layout.align() <= WORD {
      ptr
    } else {
      unsafe { ((ptr as usize - WORD) as *const usize).read() as *mut u8 }
    };
    unsafe { self.release(base) };
  }
}

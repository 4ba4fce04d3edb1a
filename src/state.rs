//! Heap state and the block algorithms: initialization, fit search, split,
//! merge and growth. Everything here runs under the heap lock.

use crate::{
  align::WORD,
  block::{HEADER_SIZE, Header},
  config::{Config, FitStrategy},
  error::{AllocError, AllocResult},
  fatal::Corruption,
  region::Region,
  source::HeapSource,
};

pub(crate) struct HeapState<S> {
  pub source: S,
  pub config: Config,
  pub region: Region,
  pub initialized: bool,
  /// Most recently allocated block, where next-fit resumes.
  pub last: Option<usize>,
  /// Terminal block, whose `next` is the heap end.
  pub tail: Option<usize>,
}

impl<S: HeapSource> HeapState<S> {
  pub const fn new(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      source,
      config,
      region: Region::empty(config.on_corruption),
      initialized: false,
      last: None,
      tail: None,
    }
  }

  /// Forgets every block. The next request re-initializes from the source's
  /// current top.
  pub fn reset(&mut self) {
    self.region = Region::empty(self.config.on_corruption);
    self.initialized = false;
    self.last = None;
    self.tail = None;
  }

  pub fn ensure_initialized(&mut self) -> AllocResult<()> {
    if self.initialized {
      return Ok(());
    }

    let top = self.source.extend(0).map_err(AllocError::Init)?;
    let gap = align!(top) - top;
    if gap > 0 {
      let previous = self.source.extend(gap).map_err(AllocError::Init)?;
      if previous != top {
        return Err(AllocError::Discontiguous {
          expected: top,
          found: previous,
        });
      }
    }

    self.region = Region::at(top + gap, self.config.on_corruption);
    self.initialized = true;
    event!(self.config, debug, "heap initialized at {:#x} (skipped {} bytes)", top + gap, gap);
    Ok(())
  }

  pub fn find_fit(
    &self,
    request: usize,
  ) -> Option<usize> {
    let (start, end) = (self.region.start(), self.region.end());

    match (self.config.strategy, self.last) {
      (FitStrategy::NextFit, Some(last)) => self
        .scan(last, end, request)
        .or_else(|| self.scan(start, last, request)),
      _ => self.scan(start, end, request),
    }
  }

  fn scan(
    &self,
    from: usize,
    to: usize,
    request: usize,
  ) -> Option<usize> {
    unsafe { self.region.walk(from, to) }
      .find(|(_, header)| !header.in_use() && header.size >= request)
      .map(|(at, _)| at)
  }

  /// Shrinks the free block at `at` to `request` bytes, carving the rest into
  /// a new free block when it can hold a header and at least one word.
  pub fn split(
    &mut self,
    at: usize,
    request: usize,
  ) {
    let header = unsafe { self.region.load(at) };
    debug_assert!(header.size >= request);

    if header.size - request < HEADER_SIZE + WORD {
      return;
    }

    let remainder = Region::payload(at) + request;
    let remainder_size = header.size - request - HEADER_SIZE;
    let end = self.region.end();

    unsafe {
      self.region.store(remainder, Header::new(Some(at), header.next, remainder_size, false));
      if header.next != end {
        self.region.update(header.next, |h| h.prev = remainder);
      }
      self.region.update(at, |h| {
        h.next = remainder;
        h.size = request;
      });
    }

    if self.tail == Some(at) {
      self.tail = Some(remainder);
    }
    event!(
      self.config,
      trace,
      "split {at:#x}: kept {request} bytes, remainder {remainder:#x} holds {remainder_size} bytes"
    );
  }

  /// Absorbs `second` into `first` if both are free, returning the survivor.
  pub fn merge(
    &mut self,
    first: usize,
    second: usize,
  ) -> Option<usize> {
    let head = unsafe { self.region.load(first) };
    let absorbed = unsafe { self.region.load(second) };

    if head.in_use() || absorbed.in_use() {
      return None;
    }

    let end = self.region.end();
    unsafe {
      self.region.update(first, |h| {
        h.next = absorbed.next;
        h.size += HEADER_SIZE + absorbed.size;
      });
      if absorbed.next != end {
        self.region.update(absorbed.next, |h| h.prev = first);
      }
    }

    if self.tail == Some(second) {
      self.tail = Some(first);
    }
    if self.last == Some(second) {
      self.last = Some(first);
    }
    event!(self.config, trace, "merged {second:#x} into {first:#x}");
    Some(first)
  }

  /// Extends the heap and fabricates a used block of `request` bytes at the
  /// old end.
  pub fn grow(
    &mut self,
    request: usize,
  ) -> AllocResult<usize> {
    let increment = HEADER_SIZE + request;
    let at = self.region.end();

    let previous = self.source.extend(increment).map_err(|error| {
      event!(self.config, warn, "heap exhausted growing by {increment} bytes: {error}");
      AllocError::Grow(error)
    })?;
    if previous != at {
      event!(self.config, warn, "heap top moved from {at:#x} to {previous:#x}");
      return Err(AllocError::Discontiguous {
        expected: at,
        found: previous,
      });
    }

    let end = at + increment;
    self.region.grow_to(end);
    unsafe { self.region.store(at, Header::new(self.tail, end, request, true)) };
    self.tail = Some(at);

    event!(self.config, debug, "grew heap by {increment} bytes to {end:#x}");
    Ok(at)
  }

  /// Marks the block behind `payload` free and coalesces it with free
  /// neighbours, predecessor first.
  pub fn release(
    &mut self,
    payload: usize,
  ) {
    let at = self.region.header_for(payload);
    let header = unsafe { self.region.load(at) };
    if !header.in_use() {
      self.region.fatal(Corruption::DoubleRelease { header: at });
    }

    unsafe { self.region.update(at, |h| h.set_in_use(false)) };
    event!(self.config, trace, "released {} bytes at {payload:#x}", header.size);

    let mut current = at;
    if let Some(previous) = header.previous() {
      current = self.merge(previous, at).unwrap_or(at);
    }

    let next = unsafe { self.region.load(current) }.next;
    if next != self.region.end() {
      self.merge(current, next);
    }
  }

  /// Validated header of the live block behind `payload`.
  pub fn live_header(
    &self,
    payload: usize,
  ) -> Header {
    let at = self.region.header_for(payload);
    let header = unsafe { self.region.load(at) };
    if !header.in_use() {
      self.region.fatal(Corruption::NotLive { header: at });
    }
    header
  }
}

use std::{alloc, ptr::NonNull};

#[cfg(unix)]
use libc::{c_void, intptr_t, sbrk};

use crate::{align::WORD, error::SourceError};

/// The "extend by N bytes, return the old top" primitive a heap grows with.
///
/// # Safety
///
/// On success, `[previous_top, previous_top + increment)` must be valid for
/// reads and writes and owned by the caller until the source is dropped, and
/// returned tops must never decrease. `extend(0)` reports the current top
/// without handing out memory.
pub unsafe trait HeapSource {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, SourceError>;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Calls are serialized by the owning heap's lock; nothing stops another
/// `sbrk` user in the process from moving the break in between, which the
/// heap reports as [`AllocError::Discontiguous`](crate::AllocError::Discontiguous).
/// The heap end never matches the break again after that, so every later
/// growth fails the same way and only free blocks are reused.
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Sbrk;

#[cfg(unix)]
unsafe impl HeapSource for Sbrk {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, SourceError> {
    let delta = intptr_t::try_from(increment).map_err(|_| SourceError::TooLarge { increment })?;
    let previous = unsafe { sbrk(delta) };

    if previous == usize::MAX as *mut c_void {
      return Err(SourceError::Exhausted { increment });
    }

    Ok(previous as usize)
  }
}

/// Returns the current program break.
#[cfg(unix)]
pub fn program_break() -> *mut c_void {
  unsafe { sbrk(0) }
}

/// A fixed-capacity buffer handed out front to back, for heaps that must not
/// share the process break (tests, demos, embedded pools).
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  top: usize,
}

// The arena exclusively owns its buffer.
unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `capacity` zeroed, word-aligned bytes.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` exceeds `isize::MAX`.
  pub fn with_capacity(capacity: usize) -> Self {
    let layout = Self::layout(capacity);
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      capacity,
      top: 0,
    }
  }

  fn layout(capacity: usize) -> alloc::Layout {
    alloc::Layout::from_size_align(capacity.max(1), WORD).expect("arena capacity exceeds isize::MAX")
  }

  /// Address of the first byte of the buffer.
  pub fn base(&self) -> usize {
    self.base.as_ptr() as usize
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.top
  }
}

unsafe impl HeapSource for Arena {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, SourceError> {
    if increment > self.capacity - self.top {
      return Err(SourceError::Exhausted { increment });
    }

    let previous = self.base() + self.top;
    self.top += increment;
    Ok(previous)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_extends_monotonically() {
    let mut arena = Arena::with_capacity(256);
    let base = arena.base();

    assert_eq!(arena.extend(0), Ok(base));
    assert_eq!(arena.extend(64), Ok(base));
    assert_eq!(arena.extend(32), Ok(base + 64));
    assert_eq!(arena.extend(0), Ok(base + 96));
    assert_eq!(arena.used(), 96);
  }

  #[test]
  fn test_arena_exhaustion_keeps_top() {
    let mut arena = Arena::with_capacity(128);
    let base = arena.base();

    assert_eq!(arena.extend(100), Ok(base));
    assert_eq!(arena.extend(29), Err(SourceError::Exhausted { increment: 29 }));
    assert_eq!(arena.extend(28), Ok(base + 100));
    assert_eq!(arena.used(), arena.capacity());
  }

  #[test]
  fn test_arena_base_is_word_aligned() {
    let arena = Arena::with_capacity(WORD * 3);
    assert_eq!(arena.base() % WORD, 0);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_query_reports_break() {
    let mut source = Sbrk;
    let top = source.extend(0).unwrap();
    assert_ne!(top, usize::MAX);
    assert_ne!(top, 0);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_rejects_unrepresentable_increment() {
    let mut source = Sbrk;
    assert_eq!(
      source.extend(usize::MAX),
      Err(SourceError::TooLarge { increment: usize::MAX })
    );
  }
}

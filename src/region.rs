//! Typed access to the bytes between heap start and heap end.
//!
//! Every header read or write goes through [`Region`], which checks bounds,
//! alignment and the integrity tag first. Nothing else in the crate turns an
//! address into a pointer.

use std::ptr;

use crate::{
  align::is_word_aligned,
  block::{HEADER_SIZE, Header, MAGIC},
  config::CorruptionPolicy,
  fatal::{self, Corruption},
};

#[derive(Debug)]
pub(crate) struct Region {
  start: usize,
  end: usize,
  policy: CorruptionPolicy,
}

impl Region {
  /// A region with no bytes; every access is reported as out of bounds.
  pub const fn empty(policy: CorruptionPolicy) -> Self {
    Self {
      start: 0,
      end: 0,
      policy,
    }
  }

  pub fn at(
    start: usize,
    policy: CorruptionPolicy,
  ) -> Self {
    Self {
      start,
      end: start,
      policy,
    }
  }

  pub fn start(&self) -> usize {
    self.start
  }

  pub fn end(&self) -> usize {
    self.end
  }

  /// Takes ownership of `[end, new_end)`, which the heap source just handed out.
  pub fn grow_to(
    &mut self,
    new_end: usize,
  ) {
    debug_assert!(new_end >= self.end);
    self.end = new_end;
  }

  pub fn fatal(
    &self,
    corruption: Corruption,
  ) -> ! {
    fatal::report(self.policy, corruption)
  }

  fn check_header(
    &self,
    at: usize,
  ) {
    if !is_word_aligned(at) {
      self.fatal(Corruption::Misaligned { address: at });
    }
    let fits = at >= self.start && at.checked_add(HEADER_SIZE).is_some_and(|end| end <= self.end);
    if !fits {
      self.fatal(Corruption::OutOfBounds {
        header: at,
        start: self.start,
        end: self.end,
      });
    }
  }

  /// Reads the header at `at`.
  ///
  /// # Safety
  ///
  /// The region must only span memory obtained from the heap's source.
  pub unsafe fn load(
    &self,
    at: usize,
  ) -> Header {
    self.check_header(at);
    let header = unsafe { ptr::read(at as *const Header) };

    if header.magic != MAGIC {
      self.fatal(Corruption::BadTag {
        header: at,
        expected: MAGIC,
        found: header.magic,
      });
    }

    header
  }

  /// Writes `header` at `at`.
  ///
  /// # Safety
  ///
  /// As for [`Region::load`]; additionally `at` must not overlap a live payload.
  pub unsafe fn store(
    &mut self,
    at: usize,
    header: Header,
  ) {
    self.check_header(at);
    unsafe { ptr::write(at as *mut Header, header) };
  }

  /// Loads, modifies and stores the header at `at`, returning the new value.
  ///
  /// # Safety
  ///
  /// As for [`Region::load`].
  pub unsafe fn update(
    &mut self,
    at: usize,
    f: impl FnOnce(&mut Header),
  ) -> Header {
    let mut header = unsafe { self.load(at) };
    f(&mut header);
    unsafe { self.store(at, header) };
    header
  }

  pub fn payload(at: usize) -> usize {
    at + HEADER_SIZE
  }

  /// Maps a payload address back to its header address, rejecting anything
  /// that cannot have been returned by this heap.
  pub fn header_for(
    &self,
    payload: usize,
  ) -> usize {
    if payload < self.start + HEADER_SIZE || payload >= self.end {
      self.fatal(Corruption::ForeignPointer {
        address: payload,
        start: self.start,
        end: self.end,
      });
    }
    if !is_word_aligned(payload) {
      self.fatal(Corruption::Misaligned { address: payload });
    }
    payload - HEADER_SIZE
  }

  /// Walks headers from `from` up to (not including) `to`, stepping by
  /// header size plus payload size.
  ///
  /// # Safety
  ///
  /// As for [`Region::load`]; `from` must be a block header.
  pub unsafe fn walk(
    &self,
    from: usize,
    to: usize,
  ) -> Walk<'_> {
    Walk {
      region: self,
      at: from,
      to,
    }
  }
}

pub(crate) struct Walk<'a> {
  region: &'a Region,
  at: usize,
  to: usize,
}

impl Iterator for Walk<'_> {
  type Item = (usize, Header);

  fn next(&mut self) -> Option<Self::Item> {
    if self.at >= self.to {
      return None;
    }

    let at = self.at;
    // SAFETY: `Region::walk` requires the region to be backed by heap memory.
    let header = unsafe { self.region.load(at) };
    let next = at
      .checked_add(HEADER_SIZE)
      .and_then(|payload| payload.checked_add(header.size))
      .filter(|&next| next <= self.region.end);

    match next {
      Some(next) => self.at = next,
      None => self.region.fatal(Corruption::OutOfBounds {
        header: at,
        start: self.region.start,
        end: self.region.end,
      }),
    }

    Some((at, header))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    align::WORD,
    source::{Arena, HeapSource},
  };

  fn region_over(arena: &mut Arena) -> Region {
    let capacity = arena.capacity();
    let start = arena.extend(capacity).unwrap();
    let mut region = Region::at(start, CorruptionPolicy::Panic);
    region.grow_to(start + capacity);
    region
  }

  #[test]
  fn test_store_then_walk() {
    let mut arena = Arena::with_capacity(4 * HEADER_SIZE + 64);
    let mut region = region_over(&mut arena);
    let start = region.start();
    let second = start + HEADER_SIZE + 32;
    let end = region.end();

    unsafe {
      region.store(start, Header::new(None, second, 32, true));
      region.store(second, Header::new(Some(start), end, end - second - HEADER_SIZE, false));

      let blocks: Vec<_> = region.walk(start, end).map(|(at, h)| (at, h.in_use())).collect();
      assert_eq!(blocks, vec![(start, true), (second, false)]);
    }
  }

  #[test]
  fn test_update_returns_new_value() {
    let mut arena = Arena::with_capacity(HEADER_SIZE + WORD);
    let mut region = region_over(&mut arena);
    let start = region.start();
    let end = region.end();

    unsafe {
      region.store(start, Header::new(None, end, WORD, true));
      let header = region.update(start, |h| h.set_in_use(false));
      assert!(!header.in_use());
      assert!(!region.load(start).in_use());
    }
  }

  #[test]
  #[should_panic(expected = "integrity tag")]
  fn test_load_rejects_bad_tag() {
    let mut arena = Arena::with_capacity(HEADER_SIZE + WORD);
    let region = region_over(&mut arena);
    // Zeroed memory carries no tag.
    unsafe { region.load(region.start()) };
  }

  #[test]
  #[should_panic(expected = "outside the heap")]
  fn test_load_rejects_out_of_bounds() {
    let mut arena = Arena::with_capacity(HEADER_SIZE + WORD);
    let region = region_over(&mut arena);
    unsafe { region.load(region.end()) };
  }

  #[test]
  #[should_panic(expected = "outside the heap")]
  fn test_walk_rejects_size_past_end() {
    let mut arena = Arena::with_capacity(HEADER_SIZE + WORD);
    let mut region = region_over(&mut arena);
    let start = region.start();
    let end = region.end();

    unsafe {
      region.store(start, Header::new(None, end, 1024, false));
      region.walk(start, end).for_each(drop);
    }
  }

  #[test]
  #[should_panic(expected = "not handed out by this heap")]
  fn test_header_for_rejects_foreign_pointer() {
    let region = Region::empty(CorruptionPolicy::Panic);
    region.header_for(0x1000);
  }

  #[test]
  #[should_panic(expected = "not word aligned")]
  fn test_header_for_rejects_misaligned_pointer() {
    let mut arena = Arena::with_capacity(2 * HEADER_SIZE);
    let region = region_over(&mut arena);
    region.header_for(region.start() + HEADER_SIZE + 1);
  }
}

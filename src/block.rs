use std::mem;

use static_assertions::const_assert;

use crate::align::WORD;

/// Sentinel written into every header at creation and checked on every load.
pub const MAGIC: u16 = 0xB10C;

/// Bytes occupied by a block header in front of each payload.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const_assert!(HEADER_SIZE % WORD == 0);
const_assert!(mem::align_of::<Header>() <= WORD);

/// Address used in a header link for "no block".
pub(crate) const NIL: usize = 0;

const FREE: u16 = 0;
const USED: u16 = 1;

/// In-band metadata stored immediately before a block's payload.
///
/// `prev` and `next` are heap-address neighbours, not free-list links. The
/// terminal block's `next` equals the heap end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Header {
  pub prev: usize,
  pub next: usize,
  pub size: usize,
  pub magic: u16,
  pub state: u16,
}

impl Header {
  pub fn new(
    prev: Option<usize>,
    next: usize,
    size: usize,
    in_use: bool,
  ) -> Self {
    Self {
      prev: prev.unwrap_or(NIL),
      next,
      size,
      magic: MAGIC,
      state: if in_use { USED } else { FREE },
    }
  }

  pub fn previous(&self) -> Option<usize> {
    (self.prev != NIL).then_some(self.prev)
  }

  pub fn in_use(&self) -> bool {
    self.state != FREE
  }

  pub fn set_in_use(
    &mut self,
    in_use: bool,
  ) {
    self.state = if in_use { USED } else { FREE };
  }
}

/// Snapshot of one block of the heap, as seen by a directory walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the block header.
  pub header: usize,
  /// Address of the first payload byte.
  pub payload: usize,
  /// Payload capacity in bytes.
  pub size: usize,
  pub in_use: bool,
}

impl BlockInfo {
  pub(crate) fn new(
    at: usize,
    header: &Header,
  ) -> Self {
    Self {
      header: at,
      payload: at + HEADER_SIZE,
      size: header.size,
      in_use: header.in_use(),
    }
  }

  /// One past the last byte of this block.
  pub fn end(&self) -> usize {
    self.payload + self.size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE % WORD, 0);
    assert!(HEADER_SIZE >= 3 * WORD + 2 * mem::size_of::<u16>());
  }

  #[test]
  fn test_new_header() {
    let first = Header::new(None, 0x1040, 32, true);
    assert_eq!(first.previous(), None);
    assert_eq!(first.magic, MAGIC);
    assert!(first.in_use());

    let mut second = Header::new(Some(0x1000), 0x2000, 64, false);
    assert_eq!(second.previous(), Some(0x1000));
    assert!(!second.in_use());

    second.set_in_use(true);
    assert!(second.in_use());
  }

  #[test]
  fn test_block_info_span() {
    let header = Header::new(None, 0x1000 + HEADER_SIZE + 48, 48, false);
    let info = BlockInfo::new(0x1000, &header);
    assert_eq!(info.payload, 0x1000 + HEADER_SIZE);
    assert_eq!(info.end(), header.next);
  }
}

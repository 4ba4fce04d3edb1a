//! The unrecoverable path: the heap found its own metadata untrustworthy.

use std::fmt::{self, Write};

use log::error;
use thiserror::Error;

use crate::config::CorruptionPolicy;

/// Evidence that heap metadata was overwritten or that a caller broke the
/// release contract. Never returned as an error value; it ends the process
/// (or panics, depending on [`CorruptionPolicy`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Corruption {
  #[error("header {header:#x} has integrity tag {found:#06x}, expected {expected:#06x}")]
  BadTag {
    header: usize,
    expected: u16,
    found: u16,
  },

  #[error("header {header:#x} lies outside the heap [{start:#x}, {end:#x})")]
  OutOfBounds {
    header: usize,
    start: usize,
    end: usize,
  },

  #[error("address {address:#x} is not word aligned")]
  Misaligned { address: usize },

  #[error("pointer {address:#x} was not handed out by this heap [{start:#x}, {end:#x})")]
  ForeignPointer {
    address: usize,
    start: usize,
    end: usize,
  },

  #[error("block {header:#x} is already free")]
  DoubleRelease { header: usize },

  #[error("block {header:#x} is not a live allocation")]
  NotLive { header: usize },
}

const MESSAGE_CAPACITY: usize = 256;

/// Formats into a fixed stack buffer, silently truncating. The abort path
/// must not allocate: the allocator may be the one that is broken.
#[cfg_attr(not(unix), allow(dead_code))]
struct StackWriter {
  buf: [u8; MESSAGE_CAPACITY],
  len: usize,
}

#[cfg_attr(not(unix), allow(dead_code))]
impl StackWriter {
  fn new() -> Self {
    Self {
      buf: [0; MESSAGE_CAPACITY],
      len: 0,
    }
  }

  fn as_bytes(&self) -> &[u8] {
    &self.buf[..self.len]
  }
}

impl Write for StackWriter {
  fn write_str(
    &mut self,
    s: &str,
  ) -> fmt::Result {
    let n = s.len().min(MESSAGE_CAPACITY - self.len);
    self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
    self.len += n;
    Ok(())
  }
}

#[cfg(unix)]
fn write_stderr(corruption: Corruption) {
  let mut out = StackWriter::new();
  let _ = writeln!(out, "heap corruption: {corruption}");
  let bytes = out.as_bytes();
  unsafe {
    libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
  }
}

#[cfg(not(unix))]
fn write_stderr(_corruption: Corruption) {}

#[cold]
pub(crate) fn report(
  policy: CorruptionPolicy,
  corruption: Corruption,
) -> ! {
  match policy {
    CorruptionPolicy::Panic => {
      error!("heap corruption: {corruption}");
      panic!("heap corruption: {corruption}");
    }
    CorruptionPolicy::Abort => {
      write_stderr(corruption);
      std::process::abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_stack_writer_truncates() {
    let mut out = StackWriter::new();
    for _ in 0..100 {
      write!(out, "0123456789").unwrap();
    }
    assert_eq!(out.as_bytes().len(), MESSAGE_CAPACITY);
    assert_eq!(&out.as_bytes()[..10], b"0123456789");
  }

  #[test]
  fn test_diagnostic_names_header_and_tags() {
    let mut out = StackWriter::new();
    let corruption = Corruption::BadTag {
      header: 0x5000,
      expected: 0xB10C,
      found: 0xAAAA,
    };
    write!(out, "{corruption}").unwrap();
    let text = std::str::from_utf8(out.as_bytes()).unwrap();
    assert!(text.contains("0x5000"));
    assert!(text.contains("0xb10c"));
    assert!(text.contains("0xaaaa"));
  }

  #[test]
  #[should_panic(expected = "is already free")]
  fn test_panic_policy_panics() {
    report(CorruptionPolicy::Panic, Corruption::DoubleRelease { header: 0x10 });
  }
}

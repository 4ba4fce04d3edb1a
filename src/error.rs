use thiserror::Error;

/// Failure reported by a [`HeapSource`](crate::HeapSource).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SourceError {
  #[error("no address space left to extend by {increment} bytes")]
  Exhausted { increment: usize },

  #[error("an increment of {increment} bytes cannot be requested")]
  TooLarge { increment: usize },
}

/// Recoverable allocation failure. The heap stays usable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("heap could not be initialized: {0}")]
  Init(#[source] SourceError),

  #[error("heap could not grow: {0}")]
  Grow(#[source] SourceError),

  #[error("request of {size} bytes exceeds the largest supported block")]
  TooLarge { size: usize },

  /// The source top moved away from the heap end. Growth stays disabled for
  /// the rest of the heap's life; free blocks are still reused.
  #[error("heap source returned top {found:#x}, expected {expected:#x}")]
  Discontiguous { expected: usize, found: usize },
}

/// A consistency check failure found by [`Heap::verify`](crate::Heap::verify).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InvariantError {
  #[error("block {header:#x} links back to {found:#x}, expected {expected:#x}")]
  BackLink {
    header: usize,
    expected: usize,
    found: usize,
  },

  #[error("block {header:#x} links forward to {found:#x}, expected {expected:#x}")]
  ForwardLink {
    header: usize,
    expected: usize,
    found: usize,
  },

  #[error("adjacent blocks {first:#x} and {second:#x} are both free")]
  AdjacentFree { first: usize, second: usize },

  #[error("terminal block is {found:#x}, heap records {recorded:#x}")]
  Tail { recorded: usize, found: usize },

  #[error("next-fit cursor {cursor:#x} does not name a block")]
  DanglingCursor { cursor: usize },
}

pub type AllocResult<T> = Result<T, AllocError>;

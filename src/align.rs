use std::mem;

/// Machine word size. Every header and payload handed out by the heap starts
/// on a multiple of this.
pub const WORD: usize = mem::size_of::<usize>();

/// Rounds `value` up to the machine word size.
///
/// The caller is responsible for `value` being at least `WORD - 1` below
/// `usize::MAX`.
///
/// # Examples
///
/// ```rust
/// use brkheap::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::WORD - 1) & !($crate::align::WORD - 1)
  };
}

/// Rounds `value` up to `alignment`, which must be a power of two.
pub const fn align_up(
  value: usize,
  alignment: usize,
) -> usize {
  debug_assert!(alignment.is_power_of_two());
  (value + alignment - 1) & !(alignment - 1)
}

/// Returns whether `value` sits on a word boundary.
pub const fn is_word_aligned(value: usize) -> bool {
  value & (WORD - 1) == 0
}

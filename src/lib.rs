//! # brkheap - A Coalescing Heap Allocator on the Program Break
//!
//! This crate manages a process heap grown through the `sbrk`-style
//! "extend by N bytes, return the old top" primitive. Freed blocks are reused,
//! split and merged, so memory is never handed back to the OS but is recycled.
//!
//! ## Overview
//!
//! The heap is one contiguous range cut into blocks. Every block, free or in
//! use, starts with a header linking it to its address-order neighbours:
//!
//! ```text
//!   heap_start                                                    heap_end
//!   ▼                                                                   ▼
//!   ┌────────┬──────────┬────────┬──────┬────────┬───────────────────────┐
//!   │ header │ payload  │ header │ free │ header │       payload         │
//!   │ in use │          │  free  │      │ in use │                       │
//!   └────────┴──────────┴────────┴──────┴────────┴───────────────────────┘
//!       │ ▲               │ ▲               │
//!       └─┼──── next ────►┘ └─── prev ──────┘       next of the last block
//!         └──────────────── prev ───────────┘       is heap_end
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkheap
//!   ├── align      - Word alignment (align!, align_up)
//!   ├── block      - Header layout and block snapshots
//!   ├── region     - Checked header access over the heap bytes
//!   ├── source     - HeapSource trait, Sbrk and Arena sources
//!   ├── state      - Initialization, fit search, split, merge, growth
//!   ├── heap       - Heap: locking, allocate/release, diagnostics
//!   ├── global     - Process-wide heap and #[global_allocator] front
//!   ├── config     - Fit strategy and corruption policy
//!   ├── error      - Recoverable errors
//!   └── fatal      - Corruption reporting
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkheap::{Arena, Heap};
//!
//! let heap = Heap::new(Arena::with_capacity(64 * 1024));
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0xAB, 100);
//!     heap.release(ptr.as_ptr());
//! }
//! ```
//!
//! ## How It Works
//!
//! An allocation scans the blocks (first-fit, or next-fit resuming after the
//! last allocation), splits the winning block when the remainder can hold a
//! header plus a word, and grows the heap otherwise:
//!
//! ```text
//!   Split on reuse:
//!   ┌────────┬────────────────────────────┐      ┌────────┬──────┬────────┬────────┐
//!   │ header │        free (m)            │  ──► │ header │ n    │ header │ free   │
//!   └────────┴────────────────────────────┘      └────────┴──────┴────────┴────────┘
//!                                                              m - n - header
//! ```
//!
//! A release marks the block free and merges it with a free predecessor, then
//! with a free successor, so no two neighbours are ever both free.
//!
//! Every header carries an integrity tag checked before it is trusted. A bad
//! tag, a foreign pointer or a double release is corruption: the heap panics
//! or aborts (see [`CorruptionPolicy`]) instead of continuing.
//!
//! ## Limitations
//!
//! - **Never shrinks**: memory obtained from the source stays in the heap
//! - **Single lock**: all operations on one heap are serialized
//! - **Word alignment**: larger alignments only through `GlobalAlloc`
//! - **Shared break**: [`Sbrk`] assumes no other `sbrk` user grows the break
//!   between two heap growths

macro_rules! event {
  ($config:expr, $level:ident, $($arg:tt)+) => {
    if $config.log_events {
      ::log::$level!($($arg)+);
    }
  };
}

#[macro_use]
pub mod align;
mod block;
mod config;
mod error;
mod fatal;
#[cfg(unix)]
mod global;
mod heap;
mod region;
mod source;
mod state;

pub use block::{BlockInfo, HEADER_SIZE, MAGIC};
pub use config::{Config, CorruptionPolicy, FitStrategy};
pub use error::{AllocError, AllocResult, InvariantError, SourceError};
pub use fatal::Corruption;
#[cfg(unix)]
pub use global::{HEAP, SbrkAllocator, allocate, release};
pub use heap::{Heap, HeapStats, MAX_REQUEST};
pub use source::{Arena, HeapSource};
#[cfg(unix)]
pub use source::{Sbrk, program_break};

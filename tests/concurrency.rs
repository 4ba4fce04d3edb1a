use std::thread;

use brkheap::{Arena, Config, Heap};

const THREADS: usize = 8;
const ROUNDS: usize = 500;
const KEEP: usize = 16;

#[test]
fn parallel_allocate_release_keeps_heap_consistent() {
  let heap = Heap::with_config(Arena::with_capacity(4 << 20), Config::new().with_log_events(false));

  thread::scope(|scope| {
    for t in 0..THREADS {
      let heap = &heap;
      scope.spawn(move || {
        let fill = t as u8 + 1;
        let mut live = Vec::new();

        for i in 0..ROUNDS {
          let size = (i * 37 + t * 11) % 256 + 1;
          let ptr = heap.allocate(size).unwrap();
          unsafe { ptr.as_ptr().write_bytes(fill, size) };
          live.push((ptr, size));

          if live.len() > KEEP {
            let (ptr, size) = live.remove(i % live.len());
            let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == fill), "thread {t} saw foreign writes");
            unsafe { heap.release(ptr.as_ptr()) };
          }
        }

        for (ptr, size) in live {
          let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
          assert!(bytes.iter().all(|&b| b == fill), "thread {t} saw foreign writes");
          unsafe { heap.release(ptr.as_ptr()) };
        }
      });
    }
  });

  let stats = heap.verify().unwrap();
  assert_eq!(stats.used_blocks, 0);
  assert_eq!(stats.blocks, 1);
}

#[test]
fn concurrent_first_allocations_initialize_once() {
  let heap = Heap::with_config(Arena::with_capacity(1 << 16), Config::new().with_log_events(false));

  thread::scope(|scope| {
    for _ in 0..THREADS {
      scope.spawn(|| {
        heap.allocate(64).unwrap();
      });
    }
  });

  let stats = heap.verify().unwrap();
  assert_eq!(stats.used_blocks, THREADS);
  let (start, _) = heap.bounds().unwrap();
  assert_eq!(heap.blocks()[0].header, start);
}

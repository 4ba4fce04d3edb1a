use std::io::Read;

use brkheap::{Arena, Heap, HeapSource, program_break};

/// Waits until the user presses ENTER when running with `--step`.
/// Useful to inspect the process with `pmap` or `gdb` between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints every block of `heap` in address order.
fn print_blocks<S: HeapSource>(
  label: &str,
  heap: &Heap<S>,
) {
  println!("[{label}]");
  for block in heap.blocks() {
    println!(
      "  header {:#x}  payload {:#x}  size {:>5}  {}",
      block.header,
      block.payload,
      block.size,
      if block.in_use { "used" } else { "free" }
    );
  }
}

fn main() {
  env_logger::init();
  let step = std::env::args().any(|arg| arg == "--step");

  // An isolated heap on a private buffer, so the system allocator used by
  // this program never moves the memory under us.
  let heap = Heap::new(Arena::with_capacity(64 * 1024));

  // --------------------------------------------------------------------
  // 1) Two allocations on an empty heap: each grows the heap.
  // --------------------------------------------------------------------
  let a = heap.allocate(100).expect("allocate 100");
  let b = heap.allocate(50).expect("allocate 50");
  println!("\n[1] a = {:?}, b = {:?}", a, b);
  print_blocks("after two allocations", &heap);
  pause(step);

  // --------------------------------------------------------------------
  // 2) Release `a` and ask for less: the freed block is split and reused.
  // --------------------------------------------------------------------
  unsafe { heap.release(a.as_ptr()) };
  let c = heap.allocate(40).expect("allocate 40");
  println!("\n[2] c = {:?}, reused a? {}", c, c == a);
  print_blocks("after reuse", &heap);
  pause(step);

  // --------------------------------------------------------------------
  // 3) Nothing free is large enough: the heap grows again.
  // --------------------------------------------------------------------
  let d = heap.allocate(200).expect("allocate 200");
  println!("\n[3] d = {:?}", d);
  print_blocks("after growth", &heap);
  pause(step);

  // --------------------------------------------------------------------
  // 4) Release everything: neighbours coalesce into a single free block.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(b.as_ptr());
    heap.release(d.as_ptr());
    heap.release(c.as_ptr());
  }
  print_blocks("after releasing everything", &heap);
  println!("\n[4] {:?}", heap.verify().expect("consistent heap"));
  heap.dump();
  pause(step);

  // --------------------------------------------------------------------
  // 5) The process-wide heap on the program break.
  // --------------------------------------------------------------------
  println!("\n[5] program break before = {:?}", program_break());
  match brkheap::allocate(64 * 1024) {
    Ok(ptr) => {
      println!("[5] allocated 64 KiB at {:?}", ptr);
      println!("[5] program break after  = {:?}", program_break());
      unsafe { brkheap::release(ptr.as_ptr()) };
    }
    Err(error) => println!("[5] program break heap unavailable: {error}"),
  }

  println!("\n[6] End of walkthrough. Memory is never returned to the OS before exit.");
}

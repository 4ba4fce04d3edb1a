//! Runs without the test harness: the binary re-runs itself as a child that
//! corrupts a header on an abort-policy heap, and checks how the child died.

#[cfg(unix)]
mod abort {
  use std::{
    os::unix::process::ExitStatusExt,
    process::{Command, Output},
  };

  use brkheap::{Arena, Config, CorruptionPolicy, HEADER_SIZE, Heap};

  const CHILD: &str = "BRKHEAP_CORRUPT_CHILD";

  /// Overwrites a live block's header and releases it. Never returns.
  fn corrupt_and_release() {
    let heap = Heap::with_config(
      Arena::with_capacity(1024),
      Config::new()
        .with_corruption_policy(CorruptionPolicy::Abort)
        .with_log_events(false),
    );
    let ptr = heap.allocate(32).expect("allocate 32");
    let _fence = heap.allocate(32).expect("allocate fence");

    unsafe {
      ptr.as_ptr().sub(HEADER_SIZE).write_bytes(0xAA, HEADER_SIZE);
      heap.release(ptr.as_ptr());
    }

    eprintln!("release of a corrupted block returned");
  }

  fn spawn_child() -> Output {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
      .env(CHILD, "1")
      .output()
      .expect("spawn child")
  }

  pub fn run() {
    if std::env::var_os(CHILD).is_some() {
      corrupt_and_release();
      return;
    }

    let output = spawn_child();
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "child exited cleanly: {stderr}");
    assert_eq!(output.status.signal(), Some(libc::SIGABRT), "child stderr: {stderr}");
    assert!(stderr.contains("heap corruption"), "child stderr: {stderr}");
    assert!(stderr.contains("integrity tag"), "child stderr: {stderr}");
    assert!(!stderr.contains("panicked"), "abort policy unwound: {stderr}");

    println!("abort on corruption: ok");
  }
}

fn main() {
  #[cfg(unix)]
  abort::run();
}

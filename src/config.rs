/// Free-block search strategy. Fixed for the lifetime of a heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitStrategy {
  /// Scan from the heap start and take the first block that fits.
  FirstFit,
  /// Resume scanning from the most recently touched block, wrapping around
  /// to the heap start once.
  #[default]
  NextFit,
}

/// What to do once the heap's own metadata can no longer be trusted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorruptionPolicy {
  /// Log and panic. Suitable for heaps used through the `Heap` API.
  #[default]
  Panic,
  /// Write a diagnostic to stderr and abort the process. Required for a
  /// heap installed as the global allocator, which must never unwind.
  Abort,
}

/// Per-heap settings.
///
/// ```rust
/// use brkheap::{Config, CorruptionPolicy, FitStrategy};
///
/// const CONFIG: Config = Config::new()
///   .with_strategy(FitStrategy::FirstFit)
///   .with_corruption_policy(CorruptionPolicy::Abort);
///
/// assert_eq!(CONFIG.strategy, FitStrategy::FirstFit);
/// assert!(CONFIG.log_events);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
  pub strategy: FitStrategy,
  pub on_corruption: CorruptionPolicy,
  /// Emit `log` records for initialization, growth, split, merge and
  /// allocation events.
  pub log_events: bool,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      strategy: FitStrategy::NextFit,
      on_corruption: CorruptionPolicy::Panic,
      log_events: true,
    }
  }

  /// Settings for the process-wide heap backing the global allocator: no
  /// unwinding and no logging, since a logger may allocate.
  pub const fn global() -> Self {
    Self {
      strategy: FitStrategy::NextFit,
      on_corruption: CorruptionPolicy::Abort,
      log_events: false,
    }
  }

  pub const fn with_strategy(
    mut self,
    strategy: FitStrategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }

  pub const fn with_corruption_policy(
    mut self,
    policy: CorruptionPolicy,
  ) -> Self {
    self.on_corruption = policy;
    self
  }

  pub const fn with_log_events(
    mut self,
    enabled: bool,
  ) -> Self {
    self.log_events = enabled;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.strategy, FitStrategy::NextFit);
    assert_eq!(config.on_corruption, CorruptionPolicy::Panic);
    assert!(config.log_events);
  }

  #[test]
  fn test_global_never_unwinds_or_logs() {
    let config = Config::global();
    assert_eq!(config.on_corruption, CorruptionPolicy::Abort);
    assert!(!config.log_events);
  }

  #[test]
  fn test_builder() {
    let config = Config::new()
      .with_strategy(FitStrategy::FirstFit)
      .with_log_events(false);
    assert_eq!(config.strategy, FitStrategy::FirstFit);
    assert_eq!(config.on_corruption, CorruptionPolicy::Panic);
    assert!(!config.log_events);
  }
}

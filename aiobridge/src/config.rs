use std::{env, time::Duration};

/// Length of one sleep slice in the interruptible waits.
pub const DEFAULT_SLICE: Duration = Duration::from_millis(25);
/// Events a [`Monitor`](crate::events::Monitor) holds before dropping.
pub const DEFAULT_MONITOR_CAPACITY: usize = 64;
pub const DEFAULT_THREAD_NAME: &str = "aiobridge";

const ENV_SLICE_MS: &str = "AIOBRIDGE_SLICE_MS";
const ENV_MONITOR_CAPACITY: &str = "AIOBRIDGE_MONITOR_CAPACITY";
const ENV_THREAD_NAME: &str = "AIOBRIDGE_THREAD_NAME";

/// Runtime tuning knobs.
///
/// None of these affect correctness. The slice length only bounds how long
/// the host goes without processing its own events during a safe wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub slice: Duration,
  pub monitor_capacity: usize,
  /// Prefix for bridge and relay thread names.
  pub thread_name: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      slice: DEFAULT_SLICE,
      monitor_capacity: DEFAULT_MONITOR_CAPACITY,
      thread_name: DEFAULT_THREAD_NAME.to_owned(),
    }
  }
}

impl Config {
  /// Defaults overridden by `AIOBRIDGE_SLICE_MS`,
  /// `AIOBRIDGE_MONITOR_CAPACITY` and `AIOBRIDGE_THREAD_NAME`.
  ///
  /// Unparseable or zero values are logged and ignored.
  pub fn from_env() -> Self {
    Self::from_lookup(|var| env::var(var).ok())
  }

  /// Like [`Config::from_env`], reading variables through `get`.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(ms) = parse_positive(ENV_SLICE_MS, get(ENV_SLICE_MS)) {
      config.slice = Duration::from_millis(ms as u64);
    }
    let capacity = get(ENV_MONITOR_CAPACITY);
    if let Some(capacity) = parse_positive(ENV_MONITOR_CAPACITY, capacity) {
      config.monitor_capacity = capacity;
    }
    if let Some(name) = get(ENV_THREAD_NAME) {
      if name.trim().is_empty() {
        tracing::warn!(var = ENV_THREAD_NAME, "ignoring empty thread name");
      } else {
        config.thread_name = name.trim().to_owned();
      }
    }

    config
  }

  pub fn with_slice(mut self, slice: Duration) -> Self {
    assert!(!slice.is_zero(), "slice length must be non-zero");
    self.slice = slice;
    self
  }

  pub fn with_monitor_capacity(mut self, capacity: usize) -> Self {
    assert!(capacity > 0, "monitor capacity must be non-zero");
    self.monitor_capacity = capacity;
    self
  }

  pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = name.into();
    self
  }
}

fn parse_positive(var: &str, raw: Option<String>) -> Option<usize> {
  let raw = raw?;
  match raw.trim().parse::<usize>() {
    Ok(0) | Err(_) => {
      tracing::warn!(var, value = %raw, "ignoring invalid configuration value");
      None
    }
    Ok(value) => Some(value),
  }
}

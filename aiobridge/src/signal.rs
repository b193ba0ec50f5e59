//! Completion signals: a counter, a mutex and a condition variable.
//!
//! A [`CompletionSignal`] counts firings. Each successful wait consumes one
//! firing, so a wait only blocks when every firing so far has already been
//! consumed:
//!
//! ```text
//! fire()  ──> fired += 1, notify_all
//! wait()  ──> while fired == taken { sleep }; taken += 1
//! ```
//!
//! The predicate is re-checked under the same lock the firing side takes,
//! so it does not matter whether `fire()` runs before, during or after a
//! waiter goes to sleep.
//!
//! Signals are cheap handles. Cloning shares the underlying counter, which
//! is how native callbacks, bridge threads and the host all refer to the
//! same signal.

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use crate::{
  sync::{Condvar, Mutex},
  wait::{WaitOutcome, Waitable},
};

#[derive(Default)]
struct Counter {
  /// Firings since the last reset. Only reset lowers it.
  fired: u64,
  /// Firings consumed by completed waits. Never exceeds `fired`.
  taken: u64,
  flag: bool,
}

impl Counter {
  fn pending(&self) -> u64 {
    self.fired - self.taken
  }
}

struct Shared {
  counter: Mutex<Counter>,
  condvar: Condvar,
}

/// A counting wake-up primitive shared between native callbacks and waiters.
#[derive(Clone)]
pub struct CompletionSignal {
  shared: Arc<Shared>,
}

impl Default for CompletionSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for CompletionSignal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let counter = self.shared.counter.lock();
    f.debug_struct("CompletionSignal")
      .field("fired", &counter.fired)
      .field("pending", &counter.pending())
      .field("flag", &counter.flag)
      .finish()
  }
}

impl CompletionSignal {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        counter: Mutex::new(Counter::default()),
        condvar: Condvar::new(),
      }),
    }
  }

  /// Records one firing and wakes every waiter.
  ///
  /// Safe to call from any thread, including native completion callbacks.
  /// Only holds the internal lock for the increment; never allocates.
  pub fn fire(&self) {
    let mut counter = self.shared.counter.lock();
    counter.fired += 1;
    self.shared.condvar.notify_all();
  }

  /// Sets the flag, then fires.
  ///
  /// Used for session events that should make a waiter give up: the waiter
  /// wakes like for any firing and can tell why through [`is_flagged`].
  ///
  /// [`is_flagged`]: CompletionSignal::is_flagged
  pub fn raise_flag(&self) {
    let mut counter = self.shared.counter.lock();
    counter.flag = true;
    counter.fired += 1;
    self.shared.condvar.notify_all();
  }

  pub fn is_flagged(&self) -> bool {
    self.shared.counter.lock().flag
  }

  /// Whether the signal fired since it was created or last reset.
  pub fn value(&self) -> bool {
    self.shared.counter.lock().fired > 0
  }

  /// Firings since creation or the last reset.
  pub fn count(&self) -> u64 {
    self.shared.counter.lock().fired
  }

  /// Firings no wait has consumed yet.
  pub fn pending(&self) -> u64 {
    self.shared.counter.lock().pending()
  }

  /// Consumes a pending firing without blocking.
  pub fn try_wait(&self) -> bool {
    let mut counter = self.shared.counter.lock();
    if counter.pending() > 0 {
      counter.taken += 1;
      true
    } else {
      false
    }
  }

  /// Blocks until an unconsumed firing exists, then consumes it.
  ///
  /// Returns immediately if the signal already fired more often than it was
  /// waited on. Never yields to the host; see [`Runtime::wait_safe`] for the
  /// interruptible variant.
  ///
  /// [`Runtime::wait_safe`]: crate::Runtime::wait_safe
  pub fn wait(&self) {
    let mut counter = self.shared.counter.lock();
    while counter.pending() == 0 {
      self.shared.condvar.wait(&mut counter);
    }
    counter.taken += 1;
  }

  /// Like [`wait`](CompletionSignal::wait), bounded by `deadline`.
  ///
  /// A timed out wait consumes nothing.
  pub fn wait_until(&self, deadline: Instant) -> WaitOutcome {
    let mut counter = self.shared.counter.lock();
    loop {
      if counter.pending() > 0 {
        counter.taken += 1;
        return WaitOutcome::Completed;
      }
      // A firing that raced the deadline still counts.
      let sleep = self.shared.condvar.wait_until(&mut counter, deadline);
      if sleep.timed_out() && counter.pending() == 0 {
        return WaitOutcome::TimedOut;
      }
    }
  }

  /// Like [`wait`](CompletionSignal::wait), also returning once `cancel` is
  /// set. Returns whether a firing was consumed.
  ///
  /// Whoever sets `cancel` must call [`wake`](CompletionSignal::wake)
  /// afterwards.
  pub(crate) fn wait_cancellable(&self, cancel: &AtomicBool) -> bool {
    let mut counter = self.shared.counter.lock();
    loop {
      if cancel.load(Ordering::Acquire) {
        return false;
      }
      if counter.pending() > 0 {
        counter.taken += 1;
        return true;
      }
      self.shared.condvar.wait(&mut counter);
    }
  }

  /// Wakes every waiter without recording a firing. Waiters re-check their
  /// predicate and go back to sleep.
  pub(crate) fn wake(&self) {
    let _counter = self.shared.counter.lock();
    self.shared.condvar.notify_all();
  }

  /// Clears the counter and the flag so the signal can start a new round.
  ///
  /// No thread may be blocked on the signal while it is reset. This is not
  /// checked; a waiter caught by a reset keeps sleeping until the next
  /// firing.
  pub fn reset(&self) {
    let mut counter = self.shared.counter.lock();
    *counter = Counter::default();
  }

  /// Whether both handles refer to the same signal.
  pub fn same(&self, other: &CompletionSignal) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }
}

impl Waitable for CompletionSignal {
  fn poll(&self) -> bool {
    self.pending() > 0
  }

  fn wait(&self) {
    CompletionSignal::wait(self)
  }

  fn wait_until(&self, deadline: Instant) -> WaitOutcome {
    CompletionSignal::wait_until(self, deadline)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Barrier;
  use std::thread;
  use std::time::Duration;

  use proptest::prelude::*;

  #[test]
  fn test_fired_before_wait_returns_immediately() {
    let signal = CompletionSignal::new();

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let signal = signal.clone();
        thread::spawn(move || signal.fire())
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    let start = Instant::now();
    signal.wait();
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(signal.count(), 8);
    assert_eq!(signal.pending(), 7);
  }

  #[test]
  fn test_wait_until_past_deadline() {
    let signal = CompletionSignal::new();

    let start = Instant::now();
    let outcome = signal.wait_until(Instant::now() - Duration::from_secs(1));

    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(signal.pending(), 0);
  }

  #[test]
  fn test_wait_until_past_deadline_after_fire_completes() {
    let signal = CompletionSignal::new();
    signal.fire();

    let outcome = signal.wait_until(Instant::now() - Duration::from_secs(1));

    assert_eq!(outcome, WaitOutcome::Completed);
  }

  #[test]
  fn test_wait_blocks_until_fired() {
    let signal = CompletionSignal::new();
    let signal_clone = signal.clone();

    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(50));
      signal_clone.fire();
    });

    let start = Instant::now();
    signal.wait();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(45));
    assert!(elapsed < Duration::from_millis(500));
    handle.join().unwrap();
  }

  #[test]
  fn test_three_firers_one_waiter() {
    let signal = CompletionSignal::new();
    let barrier = Arc::new(Barrier::new(4));

    let waiter = {
      let signal = signal.clone();
      thread::spawn(move || {
        signal.wait();
        signal.count()
      })
    };

    // give the waiter time to block
    thread::sleep(Duration::from_millis(20));

    let firers: Vec<_> = (0..3)
      .map(|_| {
        let signal = signal.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
          barrier.wait();
          signal.fire();
        })
      })
      .collect();
    barrier.wait();

    for firer in firers {
      firer.join().unwrap();
    }
    assert!(waiter.join().unwrap() >= 1);

    // The single wait consumed exactly one firing.
    assert_eq!(signal.count(), 3);
    assert_eq!(signal.pending(), 2);
  }

  #[test]
  fn test_value_and_reset() {
    let signal = CompletionSignal::new();
    assert!(!signal.value());

    signal.fire();
    assert!(signal.value());
    signal.wait();
    // consumed, but it did fire this round
    assert!(signal.value());

    signal.reset();
    assert!(!signal.value());
    assert_eq!(signal.count(), 0);
    assert_eq!(
      signal.wait_until(Instant::now() + Duration::from_millis(10)),
      WaitOutcome::TimedOut
    );
  }

  #[test]
  fn test_flag_wakes_and_is_sticky_until_reset() {
    let signal = CompletionSignal::new();
    let signal_clone = signal.clone();

    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(10));
      signal_clone.raise_flag();
    });

    signal.wait();
    assert!(signal.is_flagged());
    handle.join().unwrap();

    signal.reset();
    assert!(!signal.is_flagged());
  }

  #[test]
  fn test_try_wait() {
    let signal = CompletionSignal::new();
    assert!(!signal.try_wait());
    signal.fire();
    assert!(signal.poll());
    assert!(signal.try_wait());
    assert!(!signal.poll());
    assert!(!signal.try_wait());
  }

  #[test]
  fn test_clones_share_state() {
    let a = CompletionSignal::new();
    let b = a.clone();
    let c = CompletionSignal::new();

    b.fire();
    assert!(a.same(&b));
    assert!(!a.same(&c));
    assert_eq!(a.count(), 1);
  }

  proptest! {
    #[test]
    fn prop_waits_never_exceed_firings(fires in 0u64..64, waits in 0u64..64) {
      let signal = CompletionSignal::new();
      for _ in 0..fires {
        signal.fire();
      }

      let mut completed = 0;
      for _ in 0..waits {
        if signal.wait_until(Instant::now()).is_completed() {
          completed += 1;
        }
      }

      prop_assert_eq!(completed, fires.min(waits));
      prop_assert_eq!(signal.count(), fires);
      prop_assert_eq!(signal.pending(), fires - fires.min(waits));
    }
  }
}

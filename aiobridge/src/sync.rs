//! Synchronization primitives that wrap both `parking_lot` and `std::sync`.
//!
//! This module provides a unified API for the lock and condition variable
//! every signal and operation is built on:
//! - Uses `parking_lot` when the `parking_lot` feature is enabled
//! - Falls back to `std::sync` when the feature is disabled
//! - Removes poisoning by unwrapping poisoned locks
//!
//! The std fallback mirrors the `parking_lot` surface: condition variables
//! wait on a `&mut MutexGuard` instead of consuming it.

#[cfg(feature = "parking_lot")]
pub use parking_lot::{Condvar, Mutex, MutexGuard, WaitTimeoutResult};

#[cfg(not(feature = "parking_lot"))]
pub use self::std_sync::*;

#[cfg(not(feature = "parking_lot"))]
mod std_sync {
  use std::sync as std_sync;
  use std::time::Instant;

  /// A mutual exclusion primitive that wraps `std::sync::Mutex`.
  ///
  /// Unlike `std::sync::Mutex`, this does not support poisoning.
  pub struct Mutex<T: ?Sized> {
    inner: std_sync::Mutex<T>,
  }

  impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    #[inline]
    pub const fn new(value: T) -> Self {
      Self { inner: std_sync::Mutex::new(value) }
    }
  }

  impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
      Self::new(T::default())
    }
  }

  impl<T: ?Sized> Mutex<T> {
    /// Acquires a mutex, blocking the current thread until it is able to do so.
    ///
    /// This function does not propagate poisoning, so it will always succeed.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
      MutexGuard {
        inner: Some(self.inner.lock().unwrap_or_else(|e| e.into_inner())),
      }
    }
  }

  /// An RAII implementation of a "scoped lock" of a mutex.
  ///
  /// When this structure is dropped (falls out of scope), the lock will be
  /// unlocked.
  pub struct MutexGuard<'a, T: ?Sized> {
    // Only `None` while a condvar owns the std guard.
    inner: Option<std_sync::MutexGuard<'a, T>>,
  }

  impl<T: ?Sized> std::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
      self
        .inner
        .as_deref()
        .expect("aiobridge internal error: guard taken by condvar")
    }
  }

  impl<T: ?Sized> std::ops::DerefMut for MutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
      self
        .inner
        .as_deref_mut()
        .expect("aiobridge internal error: guard taken by condvar")
    }
  }

  /// Whether a timed condvar wait returned because the deadline passed.
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct WaitTimeoutResult(bool);

  impl WaitTimeoutResult {
    #[inline]
    pub fn timed_out(&self) -> bool {
      self.0
    }
  }

  /// A condition variable that wraps `std::sync::Condvar`.
  ///
  /// Like the [`Mutex`] wrapper, poisoning is ignored.
  pub struct Condvar {
    inner: std_sync::Condvar,
  }

  impl Default for Condvar {
    fn default() -> Self {
      Self::new()
    }
  }

  impl Condvar {
    #[inline]
    pub const fn new() -> Self {
      Self { inner: std_sync::Condvar::new() }
    }

    /// Wakes every blocked waiter. The returned count is not tracked by std
    /// and is always reported as zero.
    #[inline]
    pub fn notify_all(&self) -> usize {
      self.inner.notify_all();
      0
    }

    /// Blocks until notified. Spurious wake-ups are possible, callers must
    /// re-check their predicate.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
      let std_guard = guard
        .inner
        .take()
        .expect("aiobridge internal error: guard taken by condvar");
      let std_guard =
        self.inner.wait(std_guard).unwrap_or_else(|e| e.into_inner());
      guard.inner = Some(std_guard);
    }

    /// Blocks until notified or until `deadline` passes.
    pub fn wait_until<T>(
      &self,
      guard: &mut MutexGuard<'_, T>,
      deadline: Instant,
    ) -> WaitTimeoutResult {
      let Some(remaining) = deadline.checked_duration_since(Instant::now())
      else {
        return WaitTimeoutResult(true);
      };

      let std_guard = guard
        .inner
        .take()
        .expect("aiobridge internal error: guard taken by condvar");
      let (std_guard, result) = self
        .inner
        .wait_timeout(std_guard, remaining)
        .unwrap_or_else(|e| e.into_inner());
      guard.inner = Some(std_guard);

      WaitTimeoutResult(result.timed_out())
    }
  }
}

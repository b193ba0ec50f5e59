//! Blocking, timed and interruptible waits over signals and operations.
//!
//! Every target implements [`Waitable`], which provides the three primitive
//! waits: a non-blocking poll, an unbounded wait, and a deadline-bounded
//! wait. The interruptible ("safe") variants in this module are built from
//! the bounded one:
//!
//! ```text
//! loop:
//!   wait_until(min(now + slice, deadline))  ──> Completed
//!   deadline passed?                        ──> TimedOut
//!   host.take_interrupt()?                  ──> Interrupted
//!   host.run_pending()
//! ```
//!
//! The non-safe waits sleep once and never call back into the host. They are
//! what bridge threads use, since those never run host code.

use std::time::{Duration, Instant};

use crate::host::Host;

/// Shortest slice the interruptible waits sleep for.
pub(crate) const MIN_SLICE: Duration = Duration::from_millis(1);

/// Result of a wait that did not produce a value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
  Completed,
  TimedOut,
  /// Only produced by the interruptible waits.
  Interrupted,
}

impl WaitOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, WaitOutcome::Completed)
  }
}

/// Something a thread can block on until it completes.
pub trait Waitable {
  /// Returns whether a wait would complete right now. O(1), never sleeps and
  /// never consumes anything.
  fn poll(&self) -> bool;

  /// Blocks until the target completes.
  fn wait(&self);

  /// Blocks until the target completes or `deadline` passes.
  ///
  /// Never returns [`WaitOutcome::Interrupted`]. A deadline in the past
  /// checks the target once and returns without sleeping.
  fn wait_until(&self, deadline: Instant) -> WaitOutcome;

  fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
    match Instant::now().checked_add(timeout) {
      Some(deadline) => self.wait_until(deadline),
      None => {
        self.wait();
        WaitOutcome::Completed
      }
    }
  }
}

impl<W: Waitable + ?Sized> Waitable for &W {
  fn poll(&self) -> bool {
    (**self).poll()
  }

  fn wait(&self) {
    (**self).wait()
  }

  fn wait_until(&self, deadline: Instant) -> WaitOutcome {
    (**self).wait_until(deadline)
  }
}

/// Interruptible, host-reentrant unbounded wait.
///
/// Returns [`WaitOutcome::Completed`] or [`WaitOutcome::Interrupted`].
pub fn wait_safe<W, H>(target: &W, host: &H, slice: Duration) -> WaitOutcome
where
  W: Waitable + ?Sized,
  H: Host + ?Sized,
{
  slice_loop(target, host, slice, None)
}

/// Interruptible, host-reentrant bounded wait.
pub fn wait_until_safe<W, H>(
  target: &W,
  host: &H,
  slice: Duration,
  deadline: Instant,
) -> WaitOutcome
where
  W: Waitable + ?Sized,
  H: Host + ?Sized,
{
  slice_loop(target, host, slice, Some(deadline))
}

fn slice_loop<W, H>(
  target: &W,
  host: &H,
  slice: Duration,
  deadline: Option<Instant>,
) -> WaitOutcome
where
  W: Waitable + ?Sized,
  H: Host + ?Sized,
{
  let slice = slice.max(MIN_SLICE);
  loop {
    let now = Instant::now();
    let slice_end = now.checked_add(slice).unwrap_or(now);
    let until = match deadline {
      Some(deadline) => deadline.min(slice_end),
      None => slice_end,
    };

    if target.wait_until(until).is_completed() {
      return WaitOutcome::Completed;
    }

    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      return WaitOutcome::TimedOut;
    }

    if host.take_interrupt() {
      tracing::trace!("safe wait interrupted by host");
      return WaitOutcome::Interrupted;
    }

    host.run_pending();
  }
}

//! Test utilities standing in for the native engine.
//!
//! Completions happen on freshly spawned threads, like native worker
//! callbacks would. Only meant for tests and examples.

use std::{
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use crate::{
  Completer, CompletionSignal, Error, NativeError, Operation, WaitOutcome,
};

/// Issues an operation the simulated engine completes with `result` after
/// `delay`.
///
/// A stop request before that completes it early with
/// [`NativeError::CANCELED`], the way a real engine reports cancellation.
#[doc(hidden)]
pub fn issue<T>(delay: Duration, result: Result<T, Error>) -> Operation<T>
where
  T: Send + Sync + 'static,
{
  let (op, completer) = Operation::new();
  run_native(completer, delay, result);
  op
}

/// Like [`issue`], firing `signal` when the operation completes.
#[doc(hidden)]
pub fn issue_with_signal<T>(
  signal: &CompletionSignal,
  delay: Duration,
  result: Result<T, Error>,
) -> Operation<T>
where
  T: Send + Sync + 'static,
{
  let (op, completer) = Operation::with_signal(signal);
  run_native(completer, delay, result);
  op
}

/// Fires `signal` from another thread after `delay`.
#[doc(hidden)]
pub fn fire_after(
  signal: &CompletionSignal,
  delay: Duration,
) -> JoinHandle<()> {
  let signal = signal.clone();
  thread::spawn(move || {
    thread::sleep(delay);
    signal.fire();
  })
}

fn run_native<T>(
  completer: Completer<T>,
  delay: Duration,
  result: Result<T, Error>,
) where
  T: Send + Sync + 'static,
{
  let stopped = CompletionSignal::new();
  {
    let stopped = stopped.clone();
    completer.on_stop(move || stopped.fire());
  }

  thread::spawn(move || {
    match stopped.wait_until(Instant::now() + delay) {
      WaitOutcome::Completed => completer.fail(NativeError::CANCELED),
      _ => completer.complete(result),
    }
  });
}

//! Operations: one asynchronous native action and its eventual result.
//!
//! An operation is created as a pair. The [`Operation`] stays with the host,
//! the [`Completer`] goes to the native engine, whose completion callback
//! may run on any worker thread:
//!
//! ```text
//!            Operation::new()
//!          ┌────────┴─────────┐
//!   Operation<T>          Completer<T> ──> native engine
//!   (host)                     │
//!     │ wait/collect/call       │ complete(result)   (any thread, once)
//!     └──────── shared state <──┘
//!              mutex + condvar + write-once result
//! ```
//!
//! The state moves from pending to done exactly once. The completing side
//! takes the same mutex waiters sleep on, so the result write happens-before
//! every read, and once done the result is immutable and read without
//! locking.
//!
//! # Dropping
//!
//! - Dropping the [`Completer`] without completing finishes the operation
//!   with [`Error::Closed`], so no waiter can hang on a vanished engine.
//! - Dropping the [`Operation`] while pending forwards a stop request. The
//!   shared state is released once both halves are gone, whether or not the
//!   result was ever collected.

use std::{
  fmt,
  sync::{Arc, OnceLock},
  time::Instant,
};

use crate::{
  error::{Error, NativeError},
  signal::CompletionSignal,
  sync::{Condvar, Mutex},
  wait::{WaitOutcome, Waitable},
};

type Callback<T> = Box<dyn FnOnce(&Result<T, Error>) + Send>;
type StopHook = Box<dyn FnOnce() + Send>;

struct State<T> {
  done: bool,
  callback: Option<Callback<T>>,
  stop_requested: bool,
  stop_hook: Option<StopHook>,
}

struct Shared<T> {
  state: Mutex<State<T>>,
  condvar: Condvar,
  // Written once, under `state`, right before `done` flips.
  result: OnceLock<Result<T, Error>>,
  signal: Option<CompletionSignal>,
}

impl<T> Shared<T> {
  fn new(signal: Option<CompletionSignal>) -> Self {
    Self {
      state: Mutex::new(State {
        done: false,
        callback: None,
        stop_requested: false,
        stop_hook: None,
      }),
      condvar: Condvar::new(),
      result: OnceLock::new(),
      signal,
    }
  }

  fn is_done(&self) -> bool {
    self.result.get().is_some()
  }

  /// Pending → done. Returns false if the operation was already done.
  fn finish(&self, result: Result<T, Error>) -> bool {
    let mut state = self.state.lock();
    if state.done {
      return false;
    }

    let stored = self.result.set(result).is_ok();
    debug_assert!(stored, "result written before done flag");
    state.done = true;
    let stop_hook = state.stop_hook.take();
    self.condvar.notify_all();
    drop(state);
    drop(stop_hook);

    if let Some(signal) = &self.signal {
      signal.fire();
    }
    true
  }

  fn wait(&self) {
    if self.is_done() {
      return;
    }
    let mut state = self.state.lock();
    while !state.done {
      self.condvar.wait(&mut state);
    }
  }

  fn wait_until(&self, deadline: Instant) -> WaitOutcome {
    if self.is_done() {
      return WaitOutcome::Completed;
    }
    let mut state = self.state.lock();
    loop {
      if state.done {
        return WaitOutcome::Completed;
      }
      let sleep = self.condvar.wait_until(&mut state, deadline);
      if sleep.timed_out() && !state.done {
        return WaitOutcome::TimedOut;
      }
    }
  }

  fn done_result(&self) -> &Result<T, Error> {
    self
      .result
      .get()
      .expect("aiobridge internal error: operation done without a result")
  }
}

/// Host handle to an asynchronous native action.
///
/// Not `Clone`: the issuing host owns it. Share it by reference once it is
/// done; `&Operation<T>` is `Sync` when `T` is.
pub struct Operation<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Operation<T> {
  /// Issues a new pending operation.
  ///
  /// Hand the [`Completer`] to the native engine; keep the operation.
  ///
  /// # Examples
  ///
  /// ```rust
  /// use aiobridge::Operation;
  /// use std::thread;
  ///
  /// let (op, completer) = Operation::<Vec<u8>>::new();
  /// thread::spawn(move || completer.succeed(b"hello".to_vec()));
  ///
  /// assert_eq!(op.collect().unwrap(), b"hello");
  /// ```
  pub fn new() -> (Operation<T>, Completer<T>) {
    Self::from_shared(Shared::new(None))
  }

  /// Like [`Operation::new`], additionally firing `signal` on completion.
  ///
  /// Attaching the same signal to several operations lets one thread wait
  /// for whichever completes next.
  pub fn with_signal(
    signal: &CompletionSignal,
  ) -> (Operation<T>, Completer<T>) {
    Self::from_shared(Shared::new(Some(signal.clone())))
  }

  /// An operation that is already done, for results known at issue time.
  pub fn ready(result: Result<T, Error>) -> Operation<T> {
    let (op, completer) = Self::new();
    completer.complete(result);
    op
  }

  fn from_shared(shared: Shared<T>) -> (Operation<T>, Completer<T>) {
    let shared = Arc::new(shared);
    (
      Operation { shared: Arc::clone(&shared) },
      Completer { shared },
    )
  }

  /// Whether the operation is done. Lock-free.
  pub fn is_resolved(&self) -> bool {
    self.shared.is_done()
  }

  /// The result if the operation is done, without blocking or locking.
  pub fn peek(&self) -> Option<Result<&T, Error>> {
    self.shared.result.get().map(as_ref_result)
  }

  /// Blocks until done and returns the result.
  ///
  /// Calling it again returns the same result immediately. Not
  /// interruptible; see [`Runtime::collect_safe`].
  ///
  /// [`Runtime::collect_safe`]: crate::Runtime::collect_safe
  pub fn collect(&self) -> Result<&T, Error> {
    self.shared.wait();
    as_ref_result(self.shared.done_result())
  }

  /// Attaches the callback [`call`](Operation::call) runs, replacing any
  /// previous one that has not run yet.
  pub fn set_callback<F>(&self, callback: F)
  where
    F: FnOnce(&Result<T, Error>) + Send + 'static,
  {
    self.shared.state.lock().callback = Some(Box::new(callback));
  }

  /// Blocks until done, runs the attached callback if it has not run yet,
  /// then returns the result.
  ///
  /// The callback runs on the calling thread, at most once over the life of
  /// the operation, and always after the result is stored.
  pub fn call(&self) -> Result<&T, Error> {
    self.shared.wait();
    let callback = self.shared.state.lock().callback.take();
    let result = self.shared.done_result();
    if let Some(callback) = callback {
      callback(result);
    }
    as_ref_result(result)
  }

  /// Asks the native engine to cancel the operation.
  ///
  /// Advisory: the operation still completes through its completer,
  /// typically with a cancellation error. Only the first request on a
  /// pending operation is forwarded; returns whether this call forwarded it.
  /// Never blocks.
  pub fn stop(&self) -> bool {
    let hook = {
      let mut state = self.shared.state.lock();
      if state.done || state.stop_requested {
        return false;
      }
      state.stop_requested = true;
      state.stop_hook.take()
    };

    tracing::trace!("forwarding stop request to native engine");
    if let Some(hook) = hook {
      hook();
    }
    true
  }

  /// The signal fired on completion, if any.
  pub fn signal(&self) -> Option<&CompletionSignal> {
    self.shared.signal.as_ref()
  }
}

fn as_ref_result<T>(result: &Result<T, Error>) -> Result<&T, Error> {
  result.as_ref().map_err(|err| *err)
}

impl<T> Waitable for Operation<T> {
  fn poll(&self) -> bool {
    self.is_resolved()
  }

  fn wait(&self) {
    self.shared.wait()
  }

  fn wait_until(&self, deadline: Instant) -> WaitOutcome {
    self.shared.wait_until(deadline)
  }
}

impl<T> Drop for Operation<T> {
  fn drop(&mut self) {
    if !self.shared.is_done() && self.stop() {
      tracing::debug!("operation dropped while pending, stop requested");
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Operation<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.shared.result.get() {
      Some(result) => {
        f.debug_struct("Operation").field("result", result).finish()
      }
      None => f.debug_struct("Operation").field("state", &"pending").finish(),
    }
  }
}

/// Native-side half of an [`Operation`].
///
/// Every completing method consumes the completer, so an operation can only
/// be completed once. Dropping it unfinished completes the operation with
/// [`Error::Closed`].
pub struct Completer<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Completer<T> {
  pub fn complete(self, result: Result<T, Error>) {
    self.shared.finish(result);
  }

  pub fn succeed(self, value: T) {
    self.complete(Ok(value))
  }

  /// Records a native error code verbatim.
  pub fn fail(self, error: NativeError) {
    self.complete(Err(Error::Native(error)))
  }

  pub fn cancel(self) {
    self.complete(Err(Error::Cancelled))
  }

  /// Whether the host called [`Operation::stop`] (or dropped the operation).
  pub fn is_stop_requested(&self) -> bool {
    self.shared.state.lock().stop_requested
  }

  /// Registers what a stop request should do on the native side.
  ///
  /// Runs on the thread calling [`Operation::stop`], outside any lock, so it
  /// may complete the operation itself. If a stop was already requested the
  /// hook runs immediately on this thread.
  pub fn on_stop<F>(&self, hook: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let mut state = self.shared.state.lock();
    if state.done {
      return;
    }
    if state.stop_requested {
      drop(state);
      hook();
    } else {
      state.stop_hook = Some(Box::new(hook));
    }
  }
}

impl<T> Drop for Completer<T> {
  fn drop(&mut self) {
    if !self.shared.is_done() && self.shared.finish(Err(Error::Closed)) {
      tracing::debug!("completer dropped without completing");
    }
  }
}

impl<T> fmt::Debug for Completer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completer").finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::thread;
  use std::time::Duration;

  #[test]
  fn test_collect_is_idempotent() {
    let (op, completer) = Operation::new();
    completer.succeed(42u32);

    let start = Instant::now();
    assert_eq!(op.collect(), Ok(&42));
    assert_eq!(op.collect(), Ok(&42));
    assert!(start.elapsed() < Duration::from_millis(50));
  }

  #[test]
  fn test_native_error_recorded_verbatim() {
    let (op, completer) = Operation::<()>::new();
    completer.fail(NativeError::CONNECTION_REFUSED);

    assert_eq!(
      op.collect(),
      Err(Error::Native(NativeError::CONNECTION_REFUSED))
    );
    assert!(op.collect().is_err());
  }

  #[test]
  fn test_collect_blocks_until_completed() {
    let (op, completer) = Operation::new();

    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(30));
      completer.succeed("done");
    });

    assert!(!op.is_resolved());
    assert_eq!(op.collect(), Ok(&"done"));
    assert!(op.is_resolved());
    handle.join().unwrap();
  }

  #[test]
  fn test_stop_then_completion_is_single_transition() {
    let (op, completer) = Operation::<u8>::new();
    let hook_runs = Arc::new(AtomicUsize::new(0));

    let hook_runs_clone = Arc::clone(&hook_runs);
    completer.on_stop(move || {
      hook_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(op.stop());
    assert!(!op.stop());
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    // stop never completes on its own
    assert!(!op.is_resolved());

    assert!(completer.is_stop_requested());
    completer.cancel();

    assert_eq!(op.collect(), Err(Error::Cancelled));
    assert!(!op.stop());
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_stop_hook_may_complete_inline() {
    let (op, completer) = Operation::<u8>::new();
    let slot = Arc::new(crate::sync::Mutex::new(Some(completer)));

    let slot_clone = Arc::clone(&slot);
    slot.lock().as_ref().unwrap().on_stop(move || {
      if let Some(completer) = slot_clone.lock().take() {
        completer.fail(NativeError::CANCELED);
      }
    });

    op.stop();
    assert!(op.collect().unwrap_err().is_cancelled());
  }

  #[test]
  fn test_on_stop_after_request_runs_immediately() {
    let (op, completer) = Operation::<u8>::new();
    op.stop();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    completer.on_stop(move || {
      ran_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(ran.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_dropped_completer_closes() {
    let (op, completer) = Operation::<u8>::new();
    drop(completer);
    assert_eq!(op.collect(), Err(Error::Closed));
  }

  #[test]
  fn test_dropped_operation_requests_stop() {
    let (op, completer) = Operation::<u8>::new();
    drop(op);
    assert!(completer.is_stop_requested());
    // completing after the host went away is harmless
    completer.succeed(1);
  }

  #[test]
  fn test_call_runs_callback_once() {
    let (op, completer) = Operation::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_clone = Arc::clone(&runs);
    op.set_callback(move |result: &Result<u32, Error>| {
      assert_eq!(result, &Ok(7));
      runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(10));
      completer.succeed(7);
    });

    assert_eq!(op.call(), Ok(&7));
    assert_eq!(op.call(), Ok(&7));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    handle.join().unwrap();
  }

  #[test]
  fn test_with_signal_fires_once_per_operation() {
    let signal = CompletionSignal::new();
    let (a, complete_a) = Operation::<u8>::with_signal(&signal);
    let (b, complete_b) = Operation::<u8>::with_signal(&signal);

    complete_b.succeed(2);
    signal.wait();
    assert!(b.is_resolved());
    assert!(!a.is_resolved());

    complete_a.succeed(1);
    signal.wait();
    assert_eq!(a.collect(), Ok(&1));
    assert_eq!(signal.count(), 2);
    assert!(a.signal().unwrap().same(&signal));
  }

  #[test]
  fn test_wait_until_leaves_pending_operation_untouched() {
    let (op, completer) = Operation::<u8>::new();

    let outcome = op.wait_until(Instant::now() - Duration::from_secs(1));
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(op.peek(), None);

    completer.succeed(3);
    assert_eq!(op.wait_until(Instant::now()), WaitOutcome::Completed);
    assert_eq!(op.peek(), Some(Ok(&3)));
  }

  #[test]
  fn test_concurrent_collectors_see_same_result() {
    let (op, completer) = Operation::new();
    let op = Arc::new(op);

    let readers: Vec<_> = (0..4)
      .map(|_| {
        let op = Arc::clone(&op);
        thread::spawn(move || *op.collect().unwrap())
      })
      .collect();

    thread::sleep(Duration::from_millis(10));
    completer.succeed(99u64);

    for reader in readers {
      assert_eq!(reader.join().unwrap(), 99);
    }
  }

  #[test]
  fn test_ready() {
    let op = Operation::ready(Ok(5u8));
    assert!(op.is_resolved());
    assert_eq!(op.collect(), Ok(&5));
  }
}

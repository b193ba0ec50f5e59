//! Threads that turn blocking waits into host notifications.
//!
//! A bridge is a disposable thread: it blocks on one target with the plain,
//! non-interruptible wait, then schedules a delivery closure onto the host
//! and exits.
//!
//! ```text
//! host thread           bridge thread                native thread
//!     │ spawn ────────────> target.wait() ...
//!     │ (keeps running)          │ <─────────────────── complete / fire
//!     │                    host.schedule(deliver) ──┐
//!     │ run_pending() <──────────────────────────────┘
//!     │   deliver(target)
//! ```
//!
//! Bridges deliver exactly once, never retry, and cannot be cancelled once
//! spawned. They share nothing with each other beyond their own targets.
//!
//! A relay is the long-lived counterpart: it forwards every firing of one
//! signal to another until the runtime shuts it down.

use std::{
  io,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  thread::{self, JoinHandle},
};

use crate::{host::Host, signal::CompletionSignal, wait::Waitable};

/// Counts bridges that have been spawned but have not delivered yet.
struct InFlight {
  active: Arc<AtomicUsize>,
}

impl InFlight {
  fn enter(active: &Arc<AtomicUsize>) -> Self {
    active.fetch_add(1, Ordering::AcqRel);
    Self { active: Arc::clone(active) }
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self.active.fetch_sub(1, Ordering::AcqRel);
  }
}

pub(crate) fn spawn<W, F>(
  name: String,
  host: Arc<dyn Host>,
  active: &Arc<AtomicUsize>,
  target: W,
  deliver: F,
) -> io::Result<()>
where
  W: Waitable + Send + 'static,
  F: FnOnce(W) + Send + 'static,
{
  let in_flight = InFlight::enter(active);

  thread::Builder::new().name(name).spawn(move || {
    target.wait();
    tracing::debug!("bridge target completed, scheduling delivery");
    host.schedule(Box::new(move || deliver(target)));
    drop(in_flight);
  })?;

  Ok(())
}

/// Forwards firings from one signal to another on a dedicated thread.
pub(crate) struct Relay {
  from: CompletionSignal,
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<u64>>,
}

impl Relay {
  pub(crate) fn spawn(
    name: String,
    from: CompletionSignal,
    to: CompletionSignal,
  ) -> io::Result<Self> {
    let stop = Arc::new(AtomicBool::new(false));

    let handle = {
      let from = from.clone();
      let stop = Arc::clone(&stop);
      thread::Builder::new().name(name).spawn(move || {
        let mut forwarded = 0;
        while from.wait_cancellable(&stop) {
          if from.is_flagged() {
            to.raise_flag();
          } else {
            to.fire();
          }
          forwarded += 1;
        }
        forwarded
      })?
    };

    tracing::debug!("relay started");
    Ok(Self { from, stop, handle: Some(handle) })
  }

  /// Stops forwarding and joins the thread.
  ///
  /// Wakes the source's waiters without firing it. Firings not yet forwarded
  /// stay pending on the source.
  pub(crate) fn shutdown(mut self) {
    self.stop_and_join();
  }

  fn stop_and_join(&mut self) {
    let Some(handle) = self.handle.take() else {
      return;
    };

    self.stop.store(true, Ordering::Release);
    self.from.wake();

    match handle.join() {
      Ok(forwarded) => tracing::debug!(forwarded, "relay stopped"),
      Err(_) => tracing::error!("relay thread panicked"),
    }
  }
}

impl Drop for Relay {
  fn drop(&mut self) {
    self.stop_and_join();
  }
}

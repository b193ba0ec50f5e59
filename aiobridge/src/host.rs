//! The host side of the bridge.
//!
//! A host runs one cooperative control thread. It exposes three things to
//! this crate:
//! - a way to ask whether the user requested an interrupt,
//! - a way to run its own pending event work from inside a long wait,
//! - an asynchronous delivery channel other threads can schedule work onto.
//!
//! [`EventLoop`] is a ready-made host for programs that do not bring their
//! own: a job queue drained on the control thread, plus an interrupt switch.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// Work scheduled onto the host's control thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Host: Send + Sync {
  /// Returns and clears a pending interrupt request.
  fn take_interrupt(&self) -> bool;

  /// Processes the host's own pending events. Called on the control thread
  /// between slices of an interruptible wait.
  fn run_pending(&self);

  /// Queues `task` to run on the control thread. Callable from any thread;
  /// must not block and must not run `task` inline.
  fn schedule(&self, task: Task);
}

impl<H: Host + ?Sized> Host for Arc<H> {
  fn take_interrupt(&self) -> bool {
    (**self).take_interrupt()
  }

  fn run_pending(&self) {
    (**self).run_pending()
  }

  fn schedule(&self, task: Task) {
    (**self).schedule(task)
  }
}

/// Requests an interrupt of the control thread's current safe wait.
///
/// Cheap to clone; may be triggered from any thread.
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
  requested: Arc<AtomicBool>,
}

impl Interrupter {
  pub fn interrupt(&self) {
    self.requested.store(true, Ordering::Release);
  }

  pub fn is_requested(&self) -> bool {
    self.requested.load(Ordering::Acquire)
  }

  fn take(&self) -> bool {
    self.requested.swap(false, Ordering::AcqRel)
  }
}

/// Sending half of an [`EventLoop`]'s job queue.
#[derive(Clone)]
pub struct Scheduler {
  tx: Sender<Task>,
}

impl Scheduler {
  /// Queues a task. Tasks sent after the loop is dropped are discarded.
  pub fn schedule(&self, task: Task) {
    if self.tx.send(task).is_err() {
      tracing::warn!("host event loop is gone, dropping scheduled task");
    }
  }
}

/// A minimal cooperative host: a job queue drained on the control thread.
pub struct EventLoop {
  tx: Sender<Task>,
  rx: Receiver<Task>,
  interrupter: Interrupter,
}

impl Default for EventLoop {
  fn default() -> Self {
    Self::new()
  }
}

impl EventLoop {
  pub fn new() -> Self {
    let (tx, rx) = crossbeam_channel::unbounded();
    Self { tx, rx, interrupter: Interrupter::default() }
  }

  pub fn interrupter(&self) -> Interrupter {
    self.interrupter.clone()
  }

  pub fn scheduler(&self) -> Scheduler {
    Scheduler { tx: self.tx.clone() }
  }

  /// Runs every task queued so far and returns how many ran.
  ///
  /// Tasks queued by the tasks themselves run in the same call.
  pub fn run_until_idle(&self) -> usize {
    let mut ran = 0;
    loop {
      match self.rx.try_recv() {
        Ok(task) => {
          task();
          ran += 1;
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
          return ran;
        }
      }
    }
  }

  /// Blocks until one task is available, runs it, then drains the rest.
  pub fn run_blocking(&self) -> usize {
    match self.rx.recv() {
      Ok(task) => {
        task();
        1 + self.run_until_idle()
      }
      // unreachable while `self.tx` is alive
      Err(_) => 0,
    }
  }

  /// Like [`EventLoop::run_blocking`], giving up after `timeout`.
  pub fn run_timeout(&self, timeout: Duration) -> usize {
    match self.rx.recv_timeout(timeout) {
      Ok(task) => {
        task();
        1 + self.run_until_idle()
      }
      Err(_) => 0,
    }
  }

  pub fn pending(&self) -> usize {
    self.rx.len()
  }
}

impl Host for EventLoop {
  fn take_interrupt(&self) -> bool {
    self.interrupter.take()
  }

  fn run_pending(&self) {
    self.run_until_idle();
  }

  fn schedule(&self, task: Task) {
    // Both ends live in `self`, so the send cannot fail.
    let _ = self.tx.send(task);
  }
}

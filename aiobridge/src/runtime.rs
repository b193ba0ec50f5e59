use std::{
  fmt, io,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use crate::{
  bridge::{self, Relay},
  config::Config,
  error::Error,
  events::Monitor,
  host::Host,
  operation::Operation,
  signal::CompletionSignal,
  sync::Mutex,
  wait::{self, MIN_SLICE, WaitOutcome, Waitable},
};

/// Registry tying the waits and bridges to one host.
///
/// Holds the configuration, the host, and every long-lived thread this crate
/// starts. Create one per host and pass it to whatever needs to wait
/// interruptibly or bridge a wait. [`Runtime::shutdown`] (also run on drop)
/// stops relays; bridges already spawned still deliver.
pub struct Runtime {
  config: Config,
  host: Arc<dyn Host>,
  active_bridges: Arc<AtomicUsize>,
  next_thread: AtomicU64,
  relays: Mutex<Vec<Relay>>,
  shut_down: AtomicBool,
}

impl Runtime {
  /// A zero slice or monitor capacity is raised to the smallest usable value.
  ///
  /// # Example
  ///
  /// ```rust
  /// use aiobridge::{Config, EventLoop, Operation, Runtime};
  /// use std::{sync::Arc, thread};
  ///
  /// let host = Arc::new(EventLoop::new());
  /// let runtime = Runtime::new(Config::default(), host.clone());
  ///
  /// let (op, completer) = Operation::<u32>::new();
  /// thread::spawn(move || completer.succeed(7));
  ///
  /// assert_eq!(runtime.collect_safe(&op), Ok(&7));
  /// ```
  pub fn new(mut config: Config, host: Arc<dyn Host>) -> Self {
    if config.slice < MIN_SLICE {
      tracing::warn!(slice = ?config.slice, "slice too short, using 1ms");
      config.slice = MIN_SLICE;
    }
    if config.monitor_capacity == 0 {
      tracing::warn!("monitor capacity is zero, using 1");
      config.monitor_capacity = 1;
    }
    tracing::debug!(?config, "runtime initialised");
    Self {
      config,
      host,
      active_bridges: Arc::new(AtomicUsize::new(0)),
      next_thread: AtomicU64::new(0),
      relays: Mutex::new(Vec::new()),
      shut_down: AtomicBool::new(false),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn host(&self) -> &Arc<dyn Host> {
    &self.host
  }

  pub fn signal(&self) -> CompletionSignal {
    CompletionSignal::new()
  }

  /// A monitor sized by [`Config::monitor_capacity`].
  pub fn monitor(&self) -> Monitor {
    Monitor::new(self.config.monitor_capacity)
  }

  /// Interruptible wait: sleeps in slices, runs host work in between, and
  /// returns [`WaitOutcome::Interrupted`] when the host requests it.
  pub fn wait_safe<W>(&self, target: &W) -> WaitOutcome
  where
    W: Waitable + ?Sized,
  {
    wait::wait_safe(target, &*self.host, self.config.slice)
  }

  pub fn wait_until_safe<W>(
    &self,
    target: &W,
    deadline: Instant,
  ) -> WaitOutcome
  where
    W: Waitable + ?Sized,
  {
    wait::wait_until_safe(target, &*self.host, self.config.slice, deadline)
  }

  /// Interruptible [`Operation::collect`].
  ///
  /// On interrupt returns `Err(Error::Interrupted)` and the operation stays
  /// pending; collecting again resumes the wait.
  pub fn collect_safe<'op, T>(
    &self,
    op: &'op Operation<T>,
  ) -> Result<&'op T, Error> {
    match self.wait_safe(op) {
      WaitOutcome::Completed => op.collect(),
      WaitOutcome::Interrupted => Err(Error::Interrupted),
      WaitOutcome::TimedOut => {
        unreachable!("unbounded wait cannot time out")
      }
    }
  }

  /// Sleeps on the control thread while keeping the host responsive.
  ///
  /// Returns [`WaitOutcome::TimedOut`] after the full duration, or
  /// [`WaitOutcome::Interrupted`] early.
  pub fn sleep_safe(&self, duration: Duration) -> WaitOutcome {
    let Some(deadline) = Instant::now().checked_add(duration) else {
      return self.wait_safe(&CompletionSignal::new());
    };
    self.wait_until_safe(&CompletionSignal::new(), deadline)
  }

  /// Waits for `target` on a new thread, then schedules `deliver(target)`
  /// onto the host.
  ///
  /// Returns as soon as the thread is spawned. The delivery happens exactly
  /// once, on the host's control thread, the next time it processes its
  /// events.
  pub fn spawn_bridge<W, F>(&self, target: W, deliver: F) -> io::Result<()>
  where
    W: Waitable + Send + 'static,
    F: FnOnce(W) + Send + 'static,
  {
    self.ensure_running()?;
    let name = self.thread_name("bridge");
    tracing::debug!(thread = %name, "spawning bridge");
    bridge::spawn(
      name,
      Arc::clone(&self.host),
      &self.active_bridges,
      target,
      deliver,
    )
  }

  /// Bridges still waiting on their target.
  pub fn active_bridges(&self) -> usize {
    self.active_bridges.load(Ordering::Acquire)
  }

  /// Forwards every firing of `from` to `to` until shutdown.
  ///
  /// The relay consumes firings of `from`; other waiters on `from` compete
  /// with it.
  pub fn relay(
    &self,
    from: &CompletionSignal,
    to: &CompletionSignal,
  ) -> io::Result<()> {
    self.ensure_running()?;
    let relay =
      Relay::spawn(self.thread_name("relay"), from.clone(), to.clone())?;
    self.relays.lock().push(relay);
    Ok(())
  }

  /// Stops and joins every relay. Further bridges and relays are refused.
  ///
  /// Idempotent.
  pub fn shutdown(&self) {
    if self.shut_down.swap(true, Ordering::AcqRel) {
      return;
    }
    let relays = std::mem::take(&mut *self.relays.lock());
    tracing::debug!(
      relays = relays.len(),
      bridges = self.active_bridges(),
      "runtime shutting down"
    );
    for relay in relays {
      relay.shutdown();
    }
  }

  pub fn is_shut_down(&self) -> bool {
    self.shut_down.load(Ordering::Acquire)
  }

  fn ensure_running(&self) -> io::Result<()> {
    if self.is_shut_down() {
      return Err(io::Error::other("aiobridge runtime is shut down"));
    }
    Ok(())
  }

  fn thread_name(&self, role: &str) -> String {
    let n = self.next_thread.fetch_add(1, Ordering::Relaxed);
    format!("{}-{role}-{n}", self.config.thread_name)
  }
}

impl Drop for Runtime {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl fmt::Debug for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Runtime")
      .field("config", &self.config)
      .field("active_bridges", &self.active_bridges())
      .field("relays", &self.relays.lock().len())
      .field("shut_down", &self.is_shut_down())
      .finish()
  }
}

//! Session lifecycle events.
//!
//! The native engine owns an [`EventHub`] and calls [`EventHub::raise`] from
//! whichever worker thread observed the event. Subscribers pick how they
//! want to hear about it:
//!
//! - [`EventTarget::Callback`] runs inline on the raising thread. A panic in
//!   the callback is caught and logged; it never reaches the engine.
//! - [`EventTarget::Signal`] fires a [`CompletionSignal`], optionally
//!   raising its flag so a waiter can tell the session went away.
//! - [`EventTarget::Monitor`] records the event in a bounded [`Monitor`]
//!   queue for later collection and fires the monitor's signal.
//!
//! Raises are dispatched one at a time, so every subscriber sees events in
//! the order the engine raised them. Nothing is coalesced.

use std::{
  fmt,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::{signal::CompletionSignal, sync::Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// A session (pipe) was established with a peer.
  Established,
  /// A peer was refused before the session was established.
  Denied,
  /// An established session closed.
  Disconnected,
}

impl EventKind {
  pub const ALL: [EventKind; 3] =
    [EventKind::Established, EventKind::Denied, EventKind::Disconnected];

  fn bit(self) -> u8 {
    match self {
      EventKind::Established => 0b001,
      EventKind::Denied => 0b010,
      EventKind::Disconnected => 0b100,
    }
  }
}

/// A set of [`EventKind`]s a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventKinds(u8);

impl EventKinds {
  pub const fn none() -> Self {
    Self(0)
  }

  pub fn all() -> Self {
    EventKind::ALL.into_iter().collect()
  }

  pub fn with(mut self, kind: EventKind) -> Self {
    self.0 |= kind.bit();
    self
  }

  pub fn contains(&self, kind: EventKind) -> bool {
    self.0 & kind.bit() != 0
  }
}

impl From<EventKind> for EventKinds {
  fn from(kind: EventKind) -> Self {
    EventKinds::none().with(kind)
  }
}

impl FromIterator<EventKind> for EventKinds {
  fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
    iter.into_iter().fold(EventKinds::none(), EventKinds::with)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionEvent {
  pub session: SessionId,
  pub kind: EventKind,
}

impl SessionEvent {
  pub fn new(session: SessionId, kind: EventKind) -> Self {
    Self { session, kind }
  }
}

pub type EventCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Where a subscription delivers events.
pub enum EventTarget {
  Callback(EventCallback),
  Signal {
    signal: CompletionSignal,
    /// Raise the signal's flag instead of a plain firing.
    flag: bool,
  },
  Monitor(Monitor),
}

impl EventTarget {
  pub fn callback<F>(callback: F) -> Self
  where
    F: Fn(SessionEvent) + Send + Sync + 'static,
  {
    EventTarget::Callback(Box::new(callback))
  }

  pub fn signal(signal: &CompletionSignal) -> Self {
    EventTarget::Signal { signal: signal.clone(), flag: false }
  }

  pub fn flagging(signal: &CompletionSignal) -> Self {
    EventTarget::Signal { signal: signal.clone(), flag: true }
  }

  fn deliver(&self, event: SessionEvent) {
    match self {
      EventTarget::Callback(callback) => {
        let outcome =
          panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
        if let Err(payload) = outcome {
          tracing::error!(
            session = event.session.0,
            kind = ?event.kind,
            panic = panic_message(payload.as_ref()),
            "session event callback panicked"
          );
        }
      }
      EventTarget::Signal { signal, flag: true } => signal.raise_flag(),
      EventTarget::Signal { signal, flag: false } => signal.fire(),
      EventTarget::Monitor(monitor) => monitor.record(event),
    }
  }
}

impl fmt::Debug for EventTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventTarget::Callback(_) => f.write_str("Callback(..)"),
      EventTarget::Signal { flag, .. } => {
        f.debug_struct("Signal").field("flag", flag).finish_non_exhaustive()
      }
      EventTarget::Monitor(monitor) => {
        f.debug_tuple("Monitor").field(monitor).finish()
      }
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.as_str()
  } else {
    "non-string panic payload"
  }
}

/// Bounded record of session events, filled by the native side and drained
/// by the host.
///
/// Clones share the same queue. When the queue is full new events are
/// dropped and counted.
#[derive(Clone)]
pub struct Monitor {
  tx: Sender<SessionEvent>,
  rx: Receiver<SessionEvent>,
  signal: CompletionSignal,
  dropped: Arc<AtomicU64>,
}

impl Monitor {
  pub fn new(capacity: usize) -> Self {
    Self::with_signal(capacity, CompletionSignal::new())
  }

  /// A monitor that fires `signal` once per recorded event.
  ///
  /// Holds at least one event, whatever `capacity` says.
  pub fn with_signal(capacity: usize, signal: CompletionSignal) -> Self {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    Self { tx, rx, signal, dropped: Arc::new(AtomicU64::new(0)) }
  }

  pub fn signal(&self) -> &CompletionSignal {
    &self.signal
  }

  fn record(&self, event: SessionEvent) {
    match self.tx.try_send(event) {
      Ok(()) => self.signal.fire(),
      Err(TrySendError::Full(event)) => {
        let dropped = self.dropped.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::warn!(
          session = event.session.0,
          kind = ?event.kind,
          dropped,
          "monitor full, dropping session event"
        );
      }
      // both ends live in `self`
      Err(TrySendError::Disconnected(_)) => {}
    }
  }

  /// Drains every recorded event, oldest first.
  pub fn read(&self) -> Vec<SessionEvent> {
    self.rx.try_iter().collect()
  }

  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }

  /// Events lost because the queue was full.
  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Acquire)
  }
}

impl fmt::Debug for Monitor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Monitor")
      .field("queued", &self.rx.len())
      .field("dropped", &self.dropped())
      .finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
  id: SubscriptionId,
  kinds: EventKinds,
  target: EventTarget,
}

/// Fan-out point for session events raised by the native engine.
#[derive(Default)]
pub struct EventHub {
  subscriptions: Mutex<Vec<Arc<Subscription>>>,
  // Held for the whole dispatch of one event; orders concurrent raises.
  dispatch: Mutex<()>,
  next_id: AtomicU64,
}

impl EventHub {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(
    &self,
    kinds: impl Into<EventKinds>,
    target: EventTarget,
  ) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let kinds = kinds.into();
    tracing::debug!(id = id.0, ?kinds, ?target, "session event subscription");
    let subscription = Arc::new(Subscription { id, kinds, target });
    self.subscriptions.lock().push(subscription);
    id
  }

  /// Removes a subscription. Returns whether it existed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut subscriptions = self.subscriptions.lock();
    let before = subscriptions.len();
    subscriptions.retain(|subscription| subscription.id != id);
    before != subscriptions.len()
  }

  pub fn subscribers(&self) -> usize {
    self.subscriptions.lock().len()
  }

  /// Delivers `event` to every matching subscriber, on the calling thread.
  ///
  /// Callbacks must not raise events on the same hub; dispatch is serialized
  /// and a nested raise would deadlock. Subscribing and unsubscribing from a
  /// callback is fine and takes effect from the next event.
  pub fn raise(&self, event: SessionEvent) {
    let _ordered = self.dispatch.lock();
    let subscriptions: Vec<_> = self
      .subscriptions
      .lock()
      .iter()
      .filter(|subscription| subscription.kinds.contains(event.kind))
      .cloned()
      .collect();

    tracing::trace!(
      session = event.session.0,
      kind = ?event.kind,
      subscribers = subscriptions.len(),
      "session event"
    );
    for subscription in subscriptions {
      subscription.target.deliver(event);
    }
  }
}

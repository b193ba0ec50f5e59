#![cfg_attr(docsrs, feature(doc_cfg))]

//! # aiobridge - completion and wait bridging for native async engines
//!
//! aiobridge connects an event-driven native engine, whose completion
//! callbacks fire on arbitrary worker threads, to a host with a single
//! cooperative control thread that wants to block, block with a deadline,
//! block interruptibly, or be notified asynchronously.
//!
//! ## Building blocks
//!
//! | Type                  | Role                                               |
//! |-----------------------|----------------------------------------------------|
//! | [`CompletionSignal`]  | counting wake-up shared by callbacks and waiters   |
//! | [`Operation`]         | one native action, pending until its result lands  |
//! | [`Completer`]         | native-side half that completes an operation once  |
//! | [`Runtime`]           | interruptible waits, bridge and relay threads      |
//! | [`Host`]/[`EventLoop`]| the host's interrupts, event work and job queue    |
//! | [`EventHub`]          | session lifecycle events to callbacks or signals   |
//!
//! ## Quick Start
//!
//! ```rust
//! use aiobridge::{Config, EventLoop, Operation, Runtime, Waitable};
//! use std::{sync::Arc, thread, time::Duration};
//!
//! let host = Arc::new(EventLoop::new());
//! let runtime = Runtime::new(Config::default(), host.clone());
//!
//! // Native side: complete from a worker thread.
//! let (op, completer) = Operation::<String>::new();
//! thread::spawn(move || {
//!   thread::sleep(Duration::from_millis(10));
//!   completer.succeed("reply".to_owned());
//! });
//!
//! // Blocking wait.
//! assert_eq!(op.collect().map(String::as_str), Ok("reply"));
//!
//! // Asynchronous notification: a bridge thread waits, the host delivers.
//! let signal = runtime.signal();
//! runtime
//!   .spawn_bridge(signal.clone(), |signal| println!("fired {} times", signal.count()))
//!   .unwrap();
//! signal.fire();
//! host.run_blocking();
//! ```
//!
//! ## Waiting
//!
//! Every target implements [`Waitable`]: a non-blocking `poll`, an
//! unbounded `wait`, and `wait_until(deadline)`. The [`Runtime`] adds the
//! "safe" variants, which sleep in short slices and, between slices, check
//! for a host interrupt and run the host's pending events. The plain
//! variants never call back into the host.
//!
//! ## Errors
//!
//! Results are values. Operations hold `Result<T, Error>`; a native error
//! code is kept verbatim as [`Error::Native`]. Nothing in this crate unwinds
//! to report an outcome.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.

mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod operation;
mod runtime;
pub mod signal;
mod sync;
#[doc(hidden)]
pub mod test_utils;
pub mod wait;

pub use config::Config;
pub use error::{Error, NativeError};
pub use events::{
  EventHub, EventKind, EventKinds, EventTarget, Monitor, SessionEvent,
  SessionId, SubscriptionId,
};
pub use host::{EventLoop, Host, Interrupter, Scheduler, Task};
pub use operation::{Completer, Operation};
pub use runtime::Runtime;
pub use signal::CompletionSignal;
pub use wait::{WaitOutcome, Waitable};

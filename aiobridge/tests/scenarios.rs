use aiobridge::{
  CompletionSignal, Config, Error, EventLoop, NativeError, Runtime,
  WaitOutcome, Waitable, test_utils,
};
use std::sync::{
  Arc, Barrier,
  atomic::{AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

fn runtime() -> (Arc<EventLoop>, Runtime) {
  let host = Arc::new(EventLoop::new());
  let config = Config::default().with_slice(Duration::from_millis(10));
  let runtime = Runtime::new(config, host.clone());
  (host, runtime)
}

#[test]
fn test_collect_after_simulated_native_delay() {
  let op =
    test_utils::issue(Duration::from_millis(50), Ok(b"payload".to_vec()));

  let start = Instant::now();
  let result = op.collect();
  let elapsed = start.elapsed();

  assert_eq!(result.unwrap(), b"payload");
  assert!(elapsed >= Duration::from_millis(45), "returned after {elapsed:?}");
  assert!(elapsed < Duration::from_millis(500), "returned after {elapsed:?}");
}

#[test]
fn test_past_deadline_then_unbounded_collect() {
  let op = test_utils::issue(Duration::from_millis(30), Ok(11u32));

  let start = Instant::now();
  let outcome = op.wait_until(Instant::now() - Duration::from_secs(1));

  assert_eq!(outcome, WaitOutcome::TimedOut);
  assert!(start.elapsed() < Duration::from_millis(10));
  assert!(!op.is_resolved());

  assert_eq!(op.collect(), Ok(&11));
}

#[test]
fn test_three_concurrent_fires_during_wait() {
  let signal = CompletionSignal::new();
  let start_line = Arc::new(Barrier::new(3));

  let waiter = {
    let signal = signal.clone();
    thread::spawn(move || {
      signal.wait();
    })
  };
  thread::sleep(Duration::from_millis(20));

  let firers: Vec<_> = (0..3)
    .map(|_| {
      let signal = signal.clone();
      let start_line = Arc::clone(&start_line);
      thread::spawn(move || {
        start_line.wait();
        signal.fire();
      })
    })
    .collect();
  for firer in firers {
    firer.join().unwrap();
  }
  waiter.join().unwrap();

  assert_eq!(signal.count(), 3);
  // one wait, one consumed firing
  assert_eq!(signal.pending(), 2);
}

#[test]
fn test_stop_yields_single_cancelled_completion() {
  let op = test_utils::issue(Duration::from_secs(10), Ok(0u8));

  let start = Instant::now();
  assert!(op.stop());
  let result = op.collect();

  assert_eq!(result, Err(Error::Native(NativeError::CANCELED)));
  assert!(result.unwrap_err().is_cancelled());
  assert!(start.elapsed() < Duration::from_secs(2));
  assert!(!op.stop());
}

#[test]
fn test_group_wait_over_shared_signal() {
  let signal = CompletionSignal::new();
  let ops: Vec<_> = [40u64, 10, 25]
    .into_iter()
    .map(|ms| {
      test_utils::issue_with_signal(&signal, Duration::from_millis(ms), Ok(ms))
    })
    .collect();

  let mut order = Vec::new();
  for _ in 0..ops.len() {
    signal.wait();
    let newly_done = ops
      .iter()
      .filter(|op| op.is_resolved())
      .map(|op| *op.collect().unwrap())
      .find(|ms| !order.contains(ms));
    order.extend(newly_done);
  }

  assert_eq!(order.len(), 3);
  assert_eq!(signal.count(), 3);
  assert!(ops.iter().all(|op| op.poll()));
}

#[test]
fn test_collect_safe_keeps_host_responsive() {
  let (host, runtime) = runtime();
  let op = test_utils::issue(Duration::from_millis(60), Ok("late"));

  let scheduler = host.scheduler();
  let ticks = Arc::new(AtomicUsize::new(0));
  let ticks_clone = Arc::clone(&ticks);
  scheduler.schedule(Box::new(move || {
    ticks_clone.fetch_add(1, Ordering::SeqCst);
  }));

  assert_eq!(runtime.collect_safe(&op), Ok(&"late"));
  // host work queued before the wait ran during it
  assert_eq!(ticks.load(Ordering::SeqCst), 1);
  assert_eq!(host.pending(), 0);
}

#[test]
fn test_interrupt_mid_wait_returns_within_a_slice() {
  let (host, runtime) = runtime();
  let op = test_utils::issue(Duration::from_secs(10), Ok(()));
  let interrupter = host.interrupter();

  let trigger = thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    interrupter.interrupt();
    Instant::now()
  });

  let result = runtime.collect_safe(&op);
  let returned_at = Instant::now();
  let interrupted_at = trigger.join().unwrap();

  assert_eq!(result, Err(Error::Interrupted));
  assert!(
    returned_at.duration_since(interrupted_at) < Duration::from_millis(60),
    "interrupt took {:?}",
    returned_at.duration_since(interrupted_at)
  );
  assert!(!op.is_resolved());
  op.stop();
  assert!(op.collect().unwrap_err().is_cancelled());
}

#[test]
fn test_randomized_completions_each_transition_once() {
  let signal = CompletionSignal::new();
  let ops: Vec<_> = (0..32u32)
    .map(|i| {
      let delay = Duration::from_millis(fastrand::u64(0..20));
      let result = if fastrand::bool() {
        Ok(i)
      } else {
        Err(Error::Native(NativeError::CONNECTION_RESET))
      };
      test_utils::issue_with_signal(&signal, delay, result)
    })
    .collect();

  for _ in 0..ops.len() {
    assert!(
      signal
        .wait_until(Instant::now() + Duration::from_secs(5))
        .is_completed()
    );
  }

  assert_eq!(signal.count(), 32);
  for (i, op) in ops.iter().enumerate() {
    match op.collect() {
      Ok(value) => assert_eq!(*value, i as u32),
      Err(err) => {
        assert_eq!(err.native(), Some(NativeError::CONNECTION_RESET))
      }
    }
  }
}

use futures::future::try_join_all;
use futures_conductor::{concurrent, concurrent_fn, defer, Concurrent, ControlError, Deferred, TaskHandle};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_conductor=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

type Log = Arc<Mutex<Vec<String>>>;

async fn logged_work(log: Log, label: usize, duration_ms: u64) -> usize {
  log.lock().push(format!("start {}", label));
  sleep(Duration::from_millis(duration_ms)).await;
  log.lock().push(format!("end {}", label));
  label * 10
}

async fn explode(should_panic: bool) -> u32 {
  if should_panic {
    panic!("task exploded on purpose");
  }
  7
}

#[tokio::test]
async fn test_zero_capacity_is_rejected() {
  setup_tracing_for_test();
  assert_eq!(concurrent(0).unwrap_err(), ControlError::InvalidConcurrency(0));
  assert!(Concurrent::new(0).is_err());
  assert!(concurrent_fn(0, |x: u32| async move { x }).is_err());
}

#[tokio::test]
async fn test_capacity_one_runs_strictly_in_order() {
  setup_tracing_for_test();
  let queue = concurrent(1).unwrap().with_name("strict");
  let log: Log = Arc::new(Mutex::new(Vec::new()));

  let handles: Vec<_> = [30u64, 5, 15]
    .into_iter()
    .enumerate()
    .map(|(label, duration_ms)| {
      let log = log.clone();
      queue.run(move || logged_work(log, label, duration_ms))
    })
    .collect();

  assert_eq!(queue.active_count(), 1);
  assert_eq!(queue.queued_count(), 2);

  let mut results = Vec::new();
  for handle in handles {
    results.push(handle.await.unwrap());
  }
  assert_eq!(results, vec![0, 10, 20]);
  assert_eq!(
    *log.lock(),
    vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
  );
  assert_eq!(queue.active_count(), 0);
  assert_eq!(queue.queued_count(), 0);
}

#[tokio::test]
async fn test_capacity_one_waits_for_each_external_resolution() {
  setup_tracing_for_test();
  let queue = concurrent(1).unwrap();
  let log: Log = Arc::new(Mutex::new(Vec::new()));
  let gates: Vec<Deferred<&'static str>> = (0..3).map(|_| defer()).collect();

  let handles: Vec<_> = gates
    .iter()
    .enumerate()
    .map(|(label, gate)| {
      let log = log.clone();
      let promise = gate.promise();
      queue.run(move || async move {
        log.lock().push(format!("start {}", label));
        let value = promise.await;
        log.lock().push(format!("end {}", label));
        value
      })
    })
    .collect();

  sleep(Duration::from_millis(5)).await;
  assert_eq!(*log.lock(), vec!["start 0"]);
  assert_eq!(queue.active_count(), 1);
  assert_eq!(queue.queued_count(), 2);

  gates[0].resolve("first");
  sleep(Duration::from_millis(5)).await;
  assert_eq!(*log.lock(), vec!["start 0", "end 0", "start 1"]);
  assert_eq!(queue.active_count(), 1);
  assert_eq!(queue.queued_count(), 1);

  // Resolving the third gate early must not let it overtake the second.
  gates[2].resolve("third");
  sleep(Duration::from_millis(5)).await;
  assert_eq!(*log.lock(), vec!["start 0", "end 0", "start 1"]);
  assert_eq!(queue.queued_count(), 1);

  gates[1].resolve("second");
  let mut results = Vec::new();
  for handle in handles {
    results.push(handle.await.unwrap());
  }
  assert_eq!(results, vec![Ok("first"), Ok("second"), Ok("third")]);
  assert_eq!(
    *log.lock(),
    vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
  );
  assert_eq!(queue.active_count(), 0);
  assert_eq!(queue.queued_count(), 0);
}

#[tokio::test]
async fn test_capacity_three_starts_all_and_keeps_result_order() {
  setup_tracing_for_test();
  let queue = concurrent(3).unwrap();
  let log: Log = Arc::new(Mutex::new(Vec::new()));

  let handles: Vec<_> = [40u64, 5, 20]
    .into_iter()
    .enumerate()
    .map(|(label, duration_ms)| {
      let log = log.clone();
      queue.run(move || logged_work(log, label, duration_ms))
    })
    .collect();
  assert_eq!(queue.queued_count(), 0);

  let results = try_join_all(handles.into_iter().map(TaskHandle::await_result)).await.unwrap();
  assert_eq!(results, vec![0, 10, 20]);

  let entries = log.lock().clone();
  assert!(entries[..3].iter().all(|entry| entry.starts_with("start")));
  assert_eq!(&entries[3..], &["end 1", "end 2", "end 0"]);
}

#[tokio::test]
async fn test_queued_tasks_start_in_submission_order() {
  setup_tracing_for_test();
  let queue = concurrent(2).unwrap();
  let log: Log = Arc::new(Mutex::new(Vec::new()));

  let handles: Vec<_> = [20u64, 40, 5, 5, 5]
    .into_iter()
    .enumerate()
    .map(|(label, duration_ms)| {
      let log = log.clone();
      queue.run(move || logged_work(log, label, duration_ms))
    })
    .collect();
  try_join_all(handles.into_iter().map(TaskHandle::await_result)).await.unwrap();

  let starts: Vec<String> = log
    .lock()
    .iter()
    .filter(|entry| entry.starts_with("start"))
    .cloned()
    .collect();
  assert_eq!(starts, vec!["start 0", "start 1", "start 2", "start 3", "start 4"]);
}

#[tokio::test]
async fn test_throttled_function_passes_data_and_errors() {
  setup_tracing_for_test();
  let double = concurrent_fn(2, |x: i32| async move {
    sleep(Duration::from_millis(5)).await;
    if x < 0 {
      Err(format!("negative input {}", x))
    } else {
      Ok(x * 2)
    }
  })
  .unwrap();
  assert_eq!(double.queue().capacity(), 2);

  let ok = double.call(21);
  let failed = double.call(-1);
  let shared = double.clone().call(4);

  assert_eq!(ok.await.unwrap(), Ok(42));
  assert_eq!(failed.await_result().await.unwrap(), Err("negative input -1".to_string()));
  assert_eq!(shared.await.unwrap(), Ok(8));
}

#[tokio::test]
async fn test_panicking_task_releases_its_slot() {
  setup_tracing_for_test();
  let queue = concurrent(1).unwrap();

  let doomed = queue.run(|| explode(true));
  let survivor = queue.run(|| explode(false));

  assert_eq!(doomed.await_result().await, Err(ControlError::TaskPanicked));
  assert_eq!(survivor.await_result().await, Ok(7));
  assert_eq!(queue.active_count(), 0);
}

#[tokio::test]
async fn test_unbounded_never_queues() {
  setup_tracing_for_test();
  let queue = Concurrent::unbounded();
  let handles: Vec<_> = (0..50u64)
    .map(|i| {
      queue.run(move || async move {
        sleep(Duration::from_millis(5)).await;
        i
      })
    })
    .collect();
  assert_eq!(queue.queued_count(), 0);
  let results = try_join_all(handles.into_iter().map(TaskHandle::await_result)).await.unwrap();
  assert_eq!(results, (0..50).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_active_tasks_never_exceed_capacity() {
  setup_tracing_for_test();
  let capacity = 3;
  let queue = concurrent(capacity).unwrap().with_name("stress");
  let active = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));

  let durations: Vec<u64> = {
    let mut rng = rand::rng();
    (0..40).map(|_| rng.random_range(1..8)).collect()
  };

  let handles: Vec<_> = durations
    .into_iter()
    .map(|duration_ms| {
      let active = active.clone();
      let peak = peak.clone();
      queue.run(move || async move {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(duration_ms)).await;
        active.fetch_sub(1, Ordering::SeqCst);
      })
    })
    .collect();
  try_join_all(handles.into_iter().map(TaskHandle::await_result)).await.unwrap();

  assert!(peak.load(Ordering::SeqCst) <= capacity);
  assert_eq!(active.load(Ordering::SeqCst), 0);
  assert_eq!(queue.active_count(), 0);
}

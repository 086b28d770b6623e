use futures_conductor::{retry, retry_if};
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

#[derive(Debug, Clone, PartialEq)]
enum FetchError {
  Transient(usize),
  Fatal,
}

async fn flaky(calls: Arc<AtomicUsize>, failures: usize) -> Result<&'static str, FetchError> {
  sleep(Duration::from_millis(1)).await;
  let call = calls.fetch_add(1, Ordering::SeqCst);
  if call < failures {
    Err(FetchError::Transient(call))
  } else {
    Ok("payload")
  }
}

#[tokio::test]
async fn test_retry_once_rethrows_after_two_calls() {
  setup_tracing_for_test();
  let calls = Arc::new(AtomicUsize::new(0));
  let result = retry(1, || flaky(calls.clone(), usize::MAX)).await;
  assert_eq!(result, Err(FetchError::Transient(1)));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_succeeds_within_budget() {
  setup_tracing_for_test();
  for failures in 0..=3 {
    let calls = Arc::new(AtomicUsize::new(0));
    let result = retry(3, || flaky(calls.clone(), failures)).await;
    assert_eq!(result, Ok("payload"), "failures={}", failures);
    assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
  }
}

#[tokio::test]
async fn test_retry_zero_times_makes_one_attempt() {
  setup_tracing_for_test();
  let calls = Arc::new(AtomicUsize::new(0));
  let result = retry(0, || flaky(calls.clone(), 1)).await;
  assert_eq!(result, Err(FetchError::Transient(0)));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_if_stops_on_fatal_errors() {
  setup_tracing_for_test();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let result: Result<(), FetchError> = retry_if(
    10,
    || {
      let call = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if call < 2 {
          Err(FetchError::Transient(call))
        } else {
          Err(FetchError::Fatal)
        }
      }
    },
    |error| matches!(error, FetchError::Transient(_)),
  )
  .await;

  assert_eq!(result, Err(FetchError::Fatal));
  assert_eq!(calls.load(Ordering::SeqCst), 3);
}

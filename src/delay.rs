use std::future::Future;
use std::time::Duration;

pub async fn delay(duration: Duration) {
  tokio::time::sleep(duration).await;
}

/// Sleeps, then yields `value`.
pub async fn delay_value<T>(duration: Duration, value: T) -> T {
  tokio::time::sleep(duration).await;
  value
}

/// A pass-through step that pauses before handing its input on.
pub fn delay_chain<T>(duration: Duration) -> impl Fn(T) -> futures::future::BoxFuture<'static, T>
where
  T: Send + 'static,
{
  move |value| Box::pin(delay_value(duration, value))
}

/// Runs `cleanup` after `fut` settles, whichever way.
///
/// The original outcome is kept unless the cleanup itself fails.
pub async fn finally<Fut, C, CFut, T, E>(fut: Fut, cleanup: C) -> Result<T, E>
where
  Fut: Future<Output = Result<T, E>>,
  C: FnOnce() -> CFut,
  CFut: Future<Output = Result<(), E>>,
{
  let outcome = fut.await;
  cleanup().await?;
  outcome
}

/// Holds back the outcome of `fut` for `duration` after it settles.
pub async fn finally_delay<Fut, T, E>(fut: Fut, duration: Duration) -> Result<T, E>
where
  Fut: Future<Output = Result<T, E>>,
{
  finally(fut, || async move {
    delay(duration).await;
    Ok(())
  })
  .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;
  use tokio::time::Instant;

  #[tokio::test]
  async fn test_delay_value_waits() {
    let started = Instant::now();
    assert_eq!(delay_value(Duration::from_millis(30), "foo").await, "foo");
    assert!(started.elapsed() >= Duration::from_millis(30));

    let chained = delay_chain::<u8>(Duration::from_millis(5));
    assert_eq!(chained(9).await, 9);
  }

  #[tokio::test]
  async fn test_finally_runs_on_error_and_keeps_it() {
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = cleaned.clone();

    let outcome: Result<(), &str> = finally(async { Err("boom") }, || async move {
      flag.store(true, Ordering::SeqCst);
      Ok(())
    })
    .await;

    assert_eq!(outcome, Err("boom"));
    assert!(cleaned.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_finally_cleanup_error_wins() {
    let outcome: Result<u8, &str> = finally(async { Ok(1) }, || async { Err("cleanup") }).await;
    assert_eq!(outcome, Err("cleanup"));

    let delayed: Result<u8, &str> = finally_delay(async { Ok(2) }, Duration::from_millis(1)).await;
    assert_eq!(delayed, Ok(2));
  }
}

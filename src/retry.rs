//! Re-invoking fallible operations.
//!
//! `times` counts retries, not attempts: `times = 0` still makes one attempt.

use std::future::Future;

use tracing::debug;

/// Calls `f` until it succeeds or `times` retries have been spent.
pub fn retry_sync<F, T, E>(times: usize, f: F) -> Result<T, E>
where
  F: FnMut() -> Result<T, E>,
{
  retry_sync_if(times, f, |_| true)
}

/// Like [`retry_sync`], but gives up early on errors `retryable` rejects.
pub fn retry_sync_if<F, P, T, E>(times: usize, mut f: F, mut retryable: P) -> Result<T, E>
where
  F: FnMut() -> Result<T, E>,
  P: FnMut(&E) -> bool,
{
  let mut remaining = times;
  loop {
    match f() {
      Ok(value) => return Ok(value),
      Err(error) if remaining == 0 || !retryable(&error) => return Err(error),
      Err(_) => {
        remaining -= 1;
        debug!(remaining, "Attempt failed, retrying.");
      }
    }
  }
}

/// Awaits `f()` until it succeeds or `times` retries have been spent.
pub async fn retry<F, Fut, T, E>(times: usize, f: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  retry_if(times, f, |_| true).await
}

/// Like [`retry`], but gives up early on errors `retryable` rejects.
pub async fn retry_if<F, Fut, P, T, E>(times: usize, mut f: F, mut retryable: P) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  P: FnMut(&E) -> bool,
{
  let mut remaining = times;
  loop {
    match f().await {
      Ok(value) => return Ok(value),
      Err(error) if remaining == 0 || !retryable(&error) => return Err(error),
      Err(_) => {
        remaining -= 1;
        debug!(remaining, "Attempt failed, retrying.");
      }
    }
  }
}

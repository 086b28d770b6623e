//! Small adapters over plain futures and `Result` chains.

use crate::error::ControlError;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;

use futures::future::try_join_all;
use futures::FutureExt;
use tracing::error;

/// Lets `f` observe a copy of `value`, then hands the value back unchanged.
pub async fn tap<T, F, Fut>(value: T, f: F) -> T
where
  T: Clone,
  F: FnOnce(T) -> Fut,
  Fut: Future<Output = ()>,
{
  f(value.clone()).await;
  value
}

/// Like [`tap`], but a failing observer replaces the value with its error.
pub async fn try_tap<T, F, Fut, E>(value: T, f: F) -> Result<T, E>
where
  T: Clone,
  F: FnOnce(T) -> Fut,
  Fut: Future<Output = Result<(), E>>,
{
  f(value.clone()).await?;
  Ok(value)
}

/// Awaits every keyed future concurrently and collects the values by key.
///
/// The first error wins. Duplicate keys keep the entry listed last.
pub async fn props<I, K, Fut, T, E>(entries: I) -> Result<HashMap<K, T>, E>
where
  I: IntoIterator<Item = (K, Fut)>,
  K: Eq + Hash,
  Fut: Future<Output = Result<T, E>>,
{
  let resolved = try_join_all(
    entries
      .into_iter()
      .map(|(key, pending)| async move { pending.await.map(|value| (key, value)) }),
  )
  .await?;
  Ok(resolved.into_iter().collect())
}

/// Builds an error handler that only deals with errors matching `predicate`.
///
/// Meant for `Result::or_else`; non-matching errors pass through untouched.
pub fn specific<T, E, P, H>(predicate: P, handler: H) -> impl FnOnce(E) -> Result<T, E>
where
  P: FnOnce(&E) -> bool,
  H: FnOnce(E) -> Result<T, E>,
{
  move |error| {
    if predicate(&error) {
      handler(error)
    } else {
      Err(error)
    }
  }
}

/// Builds an error handler that inspects the error and re-raises it.
///
/// If the observer fails, its own error is raised instead.
pub fn rethrow<T, E, F>(f: F) -> impl FnOnce(E) -> Result<T, E>
where
  F: FnOnce(&E) -> Result<(), E>,
{
  move |error| {
    f(&error)?;
    Err(error)
  }
}

/// Runs `before`, then `cb`, then the cleanup `before` produced.
///
/// The cleanup runs whatever `cb` returned. An error from `cb` takes
/// precedence over a cleanup error; a cleanup error replaces a success.
pub async fn wrap_function<B, BFut, A, AFut, C, CFut, T, E>(before: B, cb: C) -> Result<T, E>
where
  B: FnOnce() -> BFut,
  BFut: Future<Output = Result<A, E>>,
  A: FnOnce() -> AFut,
  AFut: Future<Output = Result<(), E>>,
  C: FnOnce() -> CFut,
  CFut: Future<Output = Result<T, E>>,
{
  let after = before().await?;
  let outcome = cb().await;
  let cleanup = after().await;
  match (outcome, cleanup) {
    (Err(error), _) => Err(error),
    (Ok(_), Err(error)) => Err(error),
    (Ok(value), Ok(())) => Ok(value),
  }
}

/// Runs `f` so that everything it does ends up in the returned `Result`.
///
/// A panic, whether raised while building the future or while it runs, is
/// reported as `ControlError::TaskPanicked`.
pub async fn try_fn<F, Fut, T, E>(f: F) -> Result<T, E>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: From<ControlError>,
{
  match AssertUnwindSafe(async move { f().await }).catch_unwind().await {
    Ok(outcome) => outcome,
    Err(_panic_payload) => {
      error!("Guarded call panicked.");
      Err(ControlError::TaskPanicked.into())
    }
  }
}

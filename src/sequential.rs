//! Strictly sequential combinators. Nothing here is spawned; each step is
//! awaited before the next element is looked at.

use std::future::{Future, IntoFuture};

/// Folds the elements using the first one as the initial accumulator.
///
/// Returns `Ok(None)` for an empty input. The reducer receives the accumulator,
/// the current element, its index and the total length.
pub async fn reduce<I, T, F, Fut, E>(items: I, mut f: F) -> Result<Option<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  F: FnMut(T, T, usize, usize) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let pending: Vec<_> = items.into_iter().collect();
  let length = pending.len();
  let mut pending = pending.into_iter();

  let Some(first) = pending.next() else {
    return Ok(None);
  };
  let mut accumulator = first.await;

  for (offset, item) in pending.enumerate() {
    let current = item.await;
    accumulator = f(accumulator, current, offset + 1, length).await?;
  }
  Ok(Some(accumulator))
}

/// Folds the elements onto `seed`, which may itself still be pending.
///
/// An empty input yields the seed untouched.
pub async fn reduce_with<I, T, S, R, F, Fut, E>(items: I, seed: S, mut f: F) -> Result<R, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  S: IntoFuture<Output = R>,
  F: FnMut(R, T, usize, usize) -> Fut,
  Fut: Future<Output = Result<R, E>>,
{
  let pending: Vec<_> = items.into_iter().collect();
  let length = pending.len();

  let mut accumulator = seed.await;
  for (index, item) in pending.into_iter().enumerate() {
    let current = item.await;
    accumulator = f(accumulator, current, index, length).await?;
  }
  Ok(accumulator)
}

/// Returns the first `Some` produced by the predicate, scanning in index order.
///
/// Each element and its predicate are fully awaited before moving on; the scan
/// stops at the first match. `Ok(None)` means nothing matched.
pub async fn some<I, T, F, Fut, R, E>(items: I, mut f: F) -> Result<Option<R>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  F: FnMut(T) -> Fut,
  Fut: Future<Output = Result<Option<R>, E>>,
{
  for item in items {
    let value = item.await;
    if let Some(found) = f(value).await? {
      return Ok(Some(found));
    }
  }
  Ok(None)
}

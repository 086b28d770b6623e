//! Run-once guards.
//!
//! A [`Once`] is the identity of "this piece of work": keep the guard around
//! and every caller going through it shares the first run's result.

use std::fmt;
use std::future::Future;

use tokio::sync::OnceCell;

/// A guard that lets an async initializer run at most once.
pub struct Once<T> {
  cell: OnceCell<T>,
}

impl<T> Default for Once<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for Once<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Once").field("done", &self.is_done()).finish()
  }
}

impl<T> Once<T> {
  pub fn new() -> Self {
    Self { cell: OnceCell::new() }
  }

  pub fn is_done(&self) -> bool {
    self.cell.initialized()
  }

  pub fn get(&self) -> Option<&T> {
    self.cell.get()
  }

  /// Runs `f` unless an earlier call already did, returning the shared value.
  ///
  /// Concurrent callers wait for the single in-flight run. A failed run is cached
  /// like any other value when `T` is a `Result`.
  pub async fn call<F, Fut>(&self, f: F) -> T
  where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
  {
    self.cell.get_or_init(f).await.clone()
  }
}

/// A function bundled with its own [`Once`] guard.
pub struct OnceFn<F, T> {
  f: F,
  guard: Once<T>,
}

impl<F, T> fmt::Debug for OnceFn<F, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OnceFn").field("done", &self.guard.is_done()).finish()
  }
}

pub fn once<F, Fut, T>(f: F) -> OnceFn<F, T>
where
  F: Fn() -> Fut,
  Fut: Future<Output = T>,
{
  OnceFn { f, guard: Once::new() }
}

impl<F, Fut, T> OnceFn<F, T>
where
  F: Fn() -> Fut,
  Fut: Future<Output = T>,
  T: Clone,
{
  pub async fn call(&self) -> T {
    self.guard.call(|| (self.f)()).await
  }

  pub fn is_done(&self) -> bool {
    self.guard.is_done()
  }
}

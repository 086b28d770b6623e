use crate::error::ControlError;

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

enum Settlement<T, E> {
  Pending,
  Resolved(T),
  Rejected(E),
}

struct Shared<T, E> {
  settlement: Mutex<Settlement<T, E>>,
  settled: Notify,
}

impl<T: Clone, E: Clone> Shared<T, E> {
  fn outcome(&self) -> Option<Result<T, E>> {
    match &*self.settlement.lock() {
      Settlement::Pending => None,
      Settlement::Resolved(value) => Some(Ok(value.clone())),
      Settlement::Rejected(error) => Some(Err(error.clone())),
    }
  }
}

/// A one-shot value container with externally callable `resolve`/`reject`.
///
/// Cloning the `Deferred` clones the handle, not the value: every clone settles
/// and observes the same slot. Only the first settle call has any effect.
pub struct Deferred<T, E = ControlError> {
  shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match &*self.shared.settlement.lock() {
      Settlement::Pending => "pending",
      Settlement::Resolved(_) => "resolved",
      Settlement::Rejected(_) => "rejected",
    };
    f.debug_struct("Deferred").field("state", &state).finish()
  }
}

impl<T, E> Default for Deferred<T, E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, E> Deferred<T, E> {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        settlement: Mutex::new(Settlement::Pending),
        settled: Notify::new(),
      }),
    }
  }

  /// Settles with a value. Returns `false` if already settled.
  pub fn resolve(&self, value: T) -> bool {
    self.settle(Ok(value))
  }

  /// Settles with an error. Returns `false` if already settled.
  pub fn reject(&self, error: E) -> bool {
    self.settle(Err(error))
  }

  pub fn settle(&self, outcome: Result<T, E>) -> bool {
    {
      let mut settlement = self.shared.settlement.lock();
      if !matches!(*settlement, Settlement::Pending) {
        return false;
      }
      *settlement = match outcome {
        Ok(value) => Settlement::Resolved(value),
        Err(error) => Settlement::Rejected(error),
      };
    }
    self.shared.settled.notify_waiters();
    true
  }

  pub fn is_pending(&self) -> bool {
    matches!(*self.shared.settlement.lock(), Settlement::Pending)
  }

  pub fn is_resolved(&self) -> bool {
    matches!(*self.shared.settlement.lock(), Settlement::Resolved(_))
  }

  pub fn is_rejected(&self) -> bool {
    matches!(*self.shared.settlement.lock(), Settlement::Rejected(_))
  }

  /// Returns the read side. Any number of promises may wait on one deferred.
  pub fn promise(&self) -> Promise<T, E> {
    Promise {
      shared: Arc::clone(&self.shared),
    }
  }
}

/// Creates a [`Deferred`] used to pass around a promise and its resolver.
pub fn defer<T, E>() -> Deferred<T, E> {
  Deferred::new()
}

/// The awaitable side of a [`Deferred`].
pub struct Promise<T, E = ControlError> {
  shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T, E> fmt::Debug for Promise<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Promise").finish_non_exhaustive()
  }
}

impl<T: Clone, E: Clone> Promise<T, E> {
  /// Waits for the deferred to settle and returns a clone of its outcome.
  ///
  /// Never completes if every resolver is dropped without settling.
  pub async fn wait(&self) -> Result<T, E> {
    loop {
      let notified = self.shared.settled.notified();
      tokio::pin!(notified);
      // Register before checking so a settle racing with us cannot be missed.
      notified.as_mut().enable();
      if let Some(outcome) = self.shared.outcome() {
        return outcome;
      }
      notified.await;
    }
  }

  /// Returns the outcome if already settled, without waiting.
  pub fn peek(&self) -> Option<Result<T, E>> {
    self.shared.outcome()
  }
}

impl<T, E> IntoFuture for Promise<T, E>
where
  T: Clone + Send + 'static,
  E: Clone + Send + 'static,
{
  type Output = Result<T, E>;
  type IntoFuture = BoxFuture<'static, Result<T, E>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(async move { self.wait().await })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_resolve_wakes_all_waiters() {
    let deferred = Deferred::<u32>::new();
    let first = tokio::spawn(deferred.promise().into_future());
    let second = tokio::spawn(deferred.promise().into_future());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(deferred.is_pending());
    assert!(deferred.resolve(7));

    assert_eq!(first.await.unwrap(), Ok(7));
    assert_eq!(second.await.unwrap(), Ok(7));
  }

  #[tokio::test]
  async fn test_settles_only_once() {
    let resolved = Deferred::<&str>::new();
    let rejected = Deferred::<&str>::new();

    assert!(resolved.resolve("foo"));
    assert!(!resolved.resolve("bar"));
    assert!(!resolved.reject(ControlError::TaskCancelled));
    assert!(rejected.reject(ControlError::TaskPanicked));
    assert!(!rejected.reject(ControlError::TaskCancelled));

    assert!(resolved.is_resolved() && !resolved.is_rejected() && !resolved.is_pending());
    assert!(rejected.is_rejected() && !rejected.is_resolved() && !rejected.is_pending());

    assert_eq!(resolved.promise().await, Ok("foo"));
    assert_eq!(rejected.promise().await, Err(ControlError::TaskPanicked));
  }

  #[tokio::test]
  async fn test_wait_after_settle_returns_immediately() {
    let deferred = defer::<(), ControlError>();
    deferred.resolve(());
    let outcome = tokio::time::timeout(Duration::from_millis(50), deferred.promise().wait()).await;
    assert_eq!(outcome, Ok(Ok(())));
  }
}

use crate::deferred::{Deferred, Promise};

use std::future::Future;

/// The settled outcome of a future, captured as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reflection<T, E> {
  Resolved(T),
  Rejected(E),
}

impl<T, E> Reflection<T, E> {
  pub fn is_resolved(&self) -> bool {
    matches!(self, Reflection::Resolved(_))
  }

  pub fn is_rejected(&self) -> bool {
    matches!(self, Reflection::Rejected(_))
  }

  pub fn value(&self) -> Option<&T> {
    match self {
      Reflection::Resolved(value) => Some(value),
      Reflection::Rejected(_) => None,
    }
  }

  pub fn error(&self) -> Option<&E> {
    match self {
      Reflection::Resolved(_) => None,
      Reflection::Rejected(error) => Some(error),
    }
  }

  pub fn into_result(self) -> Result<T, E> {
    match self {
      Reflection::Resolved(value) => Ok(value),
      Reflection::Rejected(error) => Err(error),
    }
  }
}

impl<T, E> From<Result<T, E>> for Reflection<T, E> {
  fn from(result: Result<T, E>) -> Self {
    match result {
      Ok(value) => Reflection::Resolved(value),
      Err(error) => Reflection::Rejected(error),
    }
  }
}

/// Awaits `fut` and turns its outcome into a [`Reflection`]; never fails.
pub async fn reflect<Fut, T, E>(fut: Fut) -> Reflection<T, E>
where
  Fut: Future<Output = Result<T, E>>,
{
  fut.await.into()
}

/// A future being driven in the background whose state can be polled synchronously.
#[derive(Debug, Clone)]
pub struct Inspectable<T, E> {
  deferred: Deferred<T, E>,
}

impl<T, E> Inspectable<T, E> {
  pub fn is_pending(&self) -> bool {
    self.deferred.is_pending()
  }

  pub fn is_resolved(&self) -> bool {
    self.deferred.is_resolved()
  }

  pub fn is_rejected(&self) -> bool {
    self.deferred.is_rejected()
  }

  pub fn promise(&self) -> Promise<T, E> {
    self.deferred.promise()
  }
}

/// Spawns `fut` on the current runtime and returns a view of its progress.
pub fn inspect<Fut, T, E>(fut: Fut) -> Inspectable<T, E>
where
  Fut: Future<Output = Result<T, E>> + Send + 'static,
  T: Send + 'static,
  E: Send + 'static,
{
  let deferred = Deferred::new();
  let settle = deferred.clone();
  tokio::spawn(async move {
    settle.settle(fut.await);
  });
  Inspectable { deferred }
}

//! Indexed one-shot signals for sequencing interleavings deterministically.

use crate::deferred::{Deferred, Promise};
use crate::error::ControlError;
use crate::handle::TaskHandle;
use crate::task::next_task_id;

use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use parking_lot::Mutex;
use tracing::trace;

const DEFAULT_REJECTION: &str = "rejection";

type Signal = Deferred<(), ControlError>;

/// An ordered signal coordinator.
///
/// Signals are addressed by index, and referencing index `k` creates every
/// missing signal from `0` to `k`. Firing happens one scheduler tick after
/// the request, never inline. Cloning shares the signals.
#[derive(Debug, Clone, Default)]
pub struct DeferSet {
  signals: Arc<Mutex<Vec<Signal>>>,
}

pub fn defer_set() -> DeferSet {
  DeferSet::new()
}

impl DeferSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of signals created so far.
  pub fn len(&self) -> usize {
    self.signals.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.signals.lock().is_empty()
  }

  fn vivify(signals: &mut Vec<Signal>, indices: &[usize]) {
    if let Some(&highest) = indices.iter().max() {
      if signals.len() <= highest {
        signals.resize_with(highest + 1, Deferred::new);
      }
    }
  }

  fn signals_for(&self, indices: &[usize]) -> Vec<Signal> {
    let mut signals = self.signals.lock();
    Self::vivify(&mut signals, indices);
    indices.iter().map(|&index| signals[index].clone()).collect()
  }

  /// Waits until every listed signal has been resolved.
  ///
  /// The returned [`Wait`] can also fire further signals once the wait succeeds.
  pub fn wait(&self, indices: impl IntoIterator<Item = usize>) -> Wait {
    let indices: Vec<usize> = indices.into_iter().collect();
    let promises = self
      .signals_for(&indices)
      .iter()
      .map(Deferred::promise)
      .collect();
    Wait {
      set: self.clone(),
      promises,
      resolve: Vec::new(),
      reject: Vec::new(),
    }
  }

  pub fn resolve(&self, indices: impl IntoIterator<Item = usize>) -> TaskHandle<()> {
    let indices: Vec<usize> = indices.into_iter().collect();
    self.fire(indices, Ok(()))
  }

  /// Rejects the listed signals with the default "rejection" reason.
  pub fn reject(&self, indices: impl IntoIterator<Item = usize>) -> TaskHandle<()> {
    self.reject_with(indices, DEFAULT_REJECTION)
  }

  pub fn reject_with(&self, indices: impl IntoIterator<Item = usize>, reason: &str) -> TaskHandle<()> {
    let indices: Vec<usize> = indices.into_iter().collect();
    self.fire(indices, Err(reason.to_string()))
  }

  fn fire(&self, indices: Vec<usize>, outcome: Result<(), String>) -> TaskHandle<()> {
    let signals = self.signals_for(&indices);
    let task_id = next_task_id();
    let join_handle = tokio::spawn(async move {
      tokio::task::yield_now().await;
      for (signal, index) in signals.iter().zip(indices) {
        let settled = match &outcome {
          Ok(()) => signal.resolve(()),
          Err(reason) => signal.reject(ControlError::SignalRejected {
            index,
            reason: reason.clone(),
          }),
        };
        trace!(index, resolved = outcome.is_ok(), settled, "Signal fired.");
      }
      Ok(())
    });
    TaskHandle::new(task_id, join_handle)
  }
}

/// A pending wait on a [`DeferSet`], optionally followed by more signals.
#[derive(Debug)]
pub struct Wait {
  set: DeferSet,
  promises: Vec<Promise<(), ControlError>>,
  resolve: Vec<usize>,
  reject: Vec<usize>,
}

impl Wait {
  /// Resolves these signals once the wait succeeds.
  pub fn then_resolve(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
    let indices: Vec<usize> = indices.into_iter().collect();
    DeferSet::vivify(&mut self.set.signals.lock(), &indices);
    self.resolve.extend(indices);
    self
  }

  /// Rejects these signals once the wait succeeds.
  pub fn then_reject(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
    let indices: Vec<usize> = indices.into_iter().collect();
    DeferSet::vivify(&mut self.set.signals.lock(), &indices);
    self.reject.extend(indices);
    self
  }
}

impl IntoFuture for Wait {
  type Output = Result<(), ControlError>;
  type IntoFuture = BoxFuture<'static, Result<(), ControlError>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(async move {
      let Wait {
        set,
        promises,
        resolve,
        reject,
      } = self;

      try_join_all(promises.iter().map(Promise::wait)).await?;

      if !resolve.is_empty() {
        set.resolve(resolve).await?;
      }
      if !reject.is_empty() {
        set.reject(reject).await?;
      }
      Ok(())
    })
  }
}

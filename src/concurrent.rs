use crate::capacity_gate::{Admission, CapacityGate};
use crate::error::ControlError;
use crate::handle::TaskHandle;
use crate::task::next_task_id;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info_span, trace, Instrument};

/// A bounded concurrency queue.
///
/// At most `capacity` tasks run at once; the rest wait in a backlog and are
/// started strictly in the order they were submitted. Cloning shares the queue.
#[derive(Debug, Clone)]
pub struct Concurrent {
  name: Arc<String>,
  gate: Arc<CapacityGate>,
}

/// Creates a queue running at most `capacity` tasks at a time.
pub fn concurrent(capacity: usize) -> Result<Concurrent, ControlError> {
  Concurrent::new(capacity)
}

/// Wraps `f` so that every call goes through a fresh queue of the given capacity.
pub fn concurrent_fn<F>(capacity: usize, f: F) -> Result<Throttled<F>, ControlError> {
  Ok(Concurrent::new(capacity)?.wrap(f))
}

impl Concurrent {
  /// # Errors
  /// Returns `ControlError::InvalidConcurrency` if `capacity` is zero.
  pub fn new(capacity: usize) -> Result<Self, ControlError> {
    Ok(Self {
      name: Arc::new("concurrent".to_string()),
      gate: Arc::new(CapacityGate::new(capacity)?),
    })
  }

  /// A queue that never holds anything back.
  pub fn unbounded() -> Self {
    Self {
      name: Arc::new("concurrent".to_string()),
      gate: Arc::new(CapacityGate::unbounded()),
    }
  }

  /// Sets the name used in log output.
  pub fn with_name(mut self, name: &str) -> Self {
    self.name = Arc::new(name.to_string());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn capacity(&self) -> usize {
    self.gate.capacity()
  }

  /// Number of tasks currently holding a slot.
  pub fn active_count(&self) -> usize {
    self.gate.active()
  }

  /// Number of submitted tasks still waiting for a slot.
  pub fn queued_count(&self) -> usize {
    self.gate.queued()
  }

  /// Submits a task producer.
  ///
  /// Admission is decided before this returns, so calls made earlier are never
  /// started after calls made later. The producer is invoked once a slot is held;
  /// the slot is released when its future finishes, fails or panics.
  pub fn run<P, Fut>(&self, producer: P) -> TaskHandle<Fut::Output>
  where
    P: FnOnce() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
  {
    let task_id = next_task_id();
    let admission = self.gate.admit();
    let name = self.name.clone();

    match &admission {
      Admission::Granted(_) => trace!(name = %*name, %task_id, "Slot free, starting task."),
      Admission::Queued(_) => debug!(
        name = %*name,
        %task_id,
        "All {} slots busy, task queued.",
        self.gate.capacity()
      ),
    }

    let span = info_span!("concurrent_task", name = %*name, %task_id);
    let join_handle = tokio::spawn(
      async move {
        let _permit = match admission {
          Admission::Granted(permit) => permit,
          Admission::Queued(rx) => match rx.await {
            Ok(permit) => {
              trace!(name = %*name, %task_id, "Promoted from backlog.");
              permit
            }
            Err(_) => {
              error!(name = %*name, %task_id, "Queue dropped the task before granting it a slot.");
              return Err(ControlError::TaskCancelled);
            }
          },
        };

        match AssertUnwindSafe(async move { producer().await }).catch_unwind().await {
          Ok(output) => {
            trace!(name = %*name, %task_id, "Task finished, releasing slot.");
            Ok(output)
          }
          Err(_panic_payload) => {
            error!(name = %*name, %task_id, "Task panicked during execution.");
            Err(ControlError::TaskPanicked)
          }
        }
      }
      .instrument(span),
    );

    TaskHandle::new(task_id, join_handle)
  }

  /// Binds a function to this queue; see [`Throttled`].
  pub fn wrap<F>(self, f: F) -> Throttled<F> {
    Throttled {
      queue: self,
      f: Arc::new(f),
    }
  }
}

/// A function whose invocations share one bounded queue.
#[derive(Debug)]
pub struct Throttled<F> {
  queue: Concurrent,
  f: Arc<F>,
}

impl<F> Clone for Throttled<F> {
  fn clone(&self) -> Self {
    Self {
      queue: self.queue.clone(),
      f: Arc::clone(&self.f),
    }
  }
}

impl<F> Throttled<F> {
  pub fn queue(&self) -> &Concurrent {
    &self.queue
  }

  pub fn call<A, Fut>(&self, arg: A) -> TaskHandle<Fut::Output>
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
  {
    let f = Arc::clone(&self.f);
    self.queue.run(move || f(arg))
  }
}

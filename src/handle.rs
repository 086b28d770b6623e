use crate::error::ControlError;
use crate::task::TaskId;

use std::future::IntoFuture;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

/// A handle to work spawned by one of the coordination primitives.
///
/// The work keeps running whether or not the handle is awaited; dropping the
/// handle only discards the outcome.
#[derive(Debug)]
pub struct TaskHandle<R: Send + 'static> {
  pub(crate) task_id: TaskId,
  pub(crate) join_handle: JoinHandle<Result<R, ControlError>>,
}

impl<R: Send + 'static> TaskHandle<R> {
  pub(crate) fn new(task_id: TaskId, join_handle: JoinHandle<Result<R, ControlError>>) -> Self {
    Self { task_id, join_handle }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> TaskId {
    self.task_id
  }

  /// Returns `true` once the underlying task has produced its outcome.
  pub fn is_finished(&self) -> bool {
    self.join_handle.is_finished()
  }

  /// Awaits the completion of the task and returns its result of type `R`.
  ///
  /// # Errors
  /// Returns `ControlError::TaskPanicked` if the task panicked during execution.
  /// Returns `ControlError::TaskCancelled` if the runtime dropped the task before it finished.
  pub async fn await_result(self) -> Result<R, ControlError> {
    match self.join_handle.await {
      Ok(outcome) => outcome,
      Err(join_error) if join_error.is_panic() => {
        tracing::warn!(task_id = %self.task_id, "Task panicked before producing a result.");
        Err(ControlError::TaskPanicked)
      }
      Err(join_error) => {
        tracing::warn!(task_id = %self.task_id, "Task did not run to completion: {}", join_error);
        Err(ControlError::TaskCancelled)
      }
    }
  }
}

impl<T, E> TaskHandle<Result<T, E>>
where
  T: Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  /// Awaits a fallible task, folding coordination failures into the task's own error type.
  pub async fn await_flattened(self) -> Result<T, E> {
    match self.await_result().await {
      Ok(task_outcome) => task_outcome,
      Err(control_error) => Err(control_error.into()),
    }
  }
}

impl<R: Send + 'static> IntoFuture for TaskHandle<R> {
  type Output = Result<R, ControlError>;
  type IntoFuture = BoxFuture<'static, Result<R, ControlError>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(self.await_result())
  }
}

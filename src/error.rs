use thiserror::Error;

/// Errors raised by the control-flow primitives themselves.
///
/// Failures of caller-supplied tasks never show up here; they travel through
/// the caller's own error type. Operations that can fail on their own behalf
/// require that error type to implement `From<ControlError>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
  #[error("concurrency must be at least 1, got {0}")]
  InvalidConcurrency(usize),

  #[error("Invalid use of 'should_retry': already called in this attempt")]
  InvalidShouldRetry,

  #[error("Invalid use of 'retry': only valid after 'should_retry' returned true")]
  InvalidRetry,

  #[error("signal {index} received a rejection: {reason}")]
  SignalRejected { index: usize, reason: String },

  #[error("Submitted task future panicked")]
  TaskPanicked,

  #[error("Task was cancelled")]
  TaskCancelled,
}

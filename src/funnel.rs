//! Admission control for competing tasks using a cooperative retry protocol.
//!
//! Every invocation runs its pre-phase freely, then asks
//! [`FunnelControl::should_retry`] whether a slot is free. If not, it hands
//! back the [`Retry`] token from [`FunnelControl::retry`] and is re-run from
//! the top once a slot frees up. A task holds its slot until it finishes or
//! calls [`FunnelControl::shortcut`].

use crate::error::ControlError;
use crate::handle::TaskHandle;
use crate::task::{next_task_id, TaskId};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info_span, trace, Instrument};

type EmptyHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Construction options for a [`Funnel`].
#[derive(Clone)]
pub struct FunnelOptions {
  /// How many tasks may be past `should_retry` at once. Defaults to 1.
  pub concurrency: usize,
  /// Wake waiters oldest-first (`true`, the default) or newest-first.
  pub fifo: bool,
  /// Called whenever a task completes while nobody is waiting for a slot.
  pub on_empty: Option<EmptyHandler>,
  /// Name used in log output.
  pub name: String,
}

impl Default for FunnelOptions {
  fn default() -> Self {
    Self {
      concurrency: 1,
      fifo: true,
      on_empty: None,
      name: "funnel".to_string(),
    }
  }
}

impl fmt::Debug for FunnelOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FunnelOptions")
      .field("concurrency", &self.concurrency)
      .field("fifo", &self.fifo)
      .field("on_empty", &self.on_empty.is_some())
      .field("name", &self.name)
      .finish()
  }
}

impl FunnelOptions {
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  pub fn with_fifo(mut self, fifo: bool) -> Self {
    self.fifo = fifo;
    self
  }

  pub fn with_on_empty(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
    self.on_empty = Some(Arc::new(handler));
    self
  }

  pub fn with_name(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
  Default,
  ShouldRetry,
  Waiting,
}

struct TaskRecord {
  state: TaskState,
  /// Set when `should_retry` told this attempt to yield.
  denied: bool,
  resume: Option<oneshot::Sender<()>>,
}

impl TaskRecord {
  fn new() -> Self {
    Self {
      state: TaskState::Default,
      denied: false,
      resume: None,
    }
  }
}

/// What a completion or a new waiter led to.
#[derive(Default)]
struct Wakeups {
  resume: Vec<oneshot::Sender<()>>,
  fire_on_empty: bool,
}

struct FunnelCore {
  name: String,
  concurrency: usize,
  fifo: bool,
  on_empty: Option<EmptyHandler>,
  // Keyed by submission id, so iteration order is submission order.
  tasks: Mutex<BTreeMap<TaskId, TaskRecord>>,
}

impl FunnelCore {
  fn count_in(tasks: &BTreeMap<TaskId, TaskRecord>, state: TaskState) -> usize {
    tasks.values().filter(|record| record.state == state).count()
  }

  fn free_slots(&self, tasks: &BTreeMap<TaskId, TaskRecord>) -> usize {
    self
      .concurrency
      .saturating_sub(Self::count_in(tasks, TaskState::ShouldRetry))
  }

  /// Picks up to `free_slots` waiters and moves them back to `Default`.
  fn take_wakeups(&self, tasks: &mut BTreeMap<TaskId, TaskRecord>) -> Vec<oneshot::Sender<()>> {
    let free = self.free_slots(tasks);
    if free == 0 {
      return Vec::new();
    }

    let waiting = tasks
      .iter()
      .filter(|(_, record)| record.state == TaskState::Waiting)
      .map(|(task_id, _)| *task_id);
    let chosen: Vec<TaskId> = if self.fifo {
      waiting.take(free).collect()
    } else {
      waiting.rev().take(free).collect()
    };

    chosen
      .into_iter()
      .filter_map(|task_id| {
        let record = tasks.get_mut(&task_id)?;
        record.state = TaskState::Default;
        record.denied = false;
        record.resume.take()
      })
      .collect()
  }

  fn register(&self) -> TaskId {
    let task_id = next_task_id();
    self.tasks.lock().insert(task_id, TaskRecord::new());
    task_id
  }

  fn should_retry(&self, task_id: TaskId) -> Result<bool, ControlError> {
    let mut tasks = self.tasks.lock();
    let free = self.free_slots(&tasks);
    let Some(record) = tasks.get_mut(&task_id) else {
      // Already shortcut; the slot question no longer applies.
      return Ok(false);
    };
    if record.state != TaskState::Default {
      return Err(ControlError::InvalidShouldRetry);
    }

    let must_wait = free == 0;
    record.state = TaskState::ShouldRetry;
    record.denied = must_wait;
    trace!(name = %self.name, %task_id, must_wait, "should_retry evaluated.");
    Ok(must_wait)
  }

  fn retry(&self, task_id: TaskId) -> Result<Retry, ControlError> {
    let (tx, rx) = oneshot::channel();
    let resume = {
      let mut tasks = self.tasks.lock();
      let record = match tasks.get_mut(&task_id) {
        Some(record) if record.state == TaskState::ShouldRetry && record.denied => record,
        _ => return Err(ControlError::InvalidRetry),
      };
      record.state = TaskState::Waiting;
      record.resume = Some(tx);
      debug!(name = %self.name, %task_id, "Task waiting for a free slot.");
      // The slot holder may have finished since `should_retry` was answered.
      self.take_wakeups(&mut tasks)
    };
    Self::deliver(resume);
    Ok(Retry { wake: rx })
  }

  /// Removes the task from the live set. Idempotent.
  fn complete(&self, task_id: TaskId) {
    let wakeups = {
      let mut tasks = self.tasks.lock();
      if tasks.remove(&task_id).is_none() {
        return;
      }
      if Self::count_in(&tasks, TaskState::Waiting) == 0 {
        Wakeups {
          resume: Vec::new(),
          fire_on_empty: true,
        }
      } else {
        Wakeups {
          resume: self.take_wakeups(&mut tasks),
          fire_on_empty: false,
        }
      }
    };

    debug!(
      name = %self.name,
      %task_id,
      woken = wakeups.resume.len(),
      "Task released its slot."
    );
    Self::deliver(wakeups.resume);
    if wakeups.fire_on_empty {
      self.fire_on_empty();
    }
  }

  fn deliver(resume: Vec<oneshot::Sender<()>>) {
    for tx in resume {
      let _ = tx.send(());
    }
  }

  fn fire_on_empty(&self) {
    if let Some(handler) = &self.on_empty {
      if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
        error!(name = %self.name, "The funnel's on_empty handler panicked.");
      }
    }
  }
}

/// Completes the task record when the invocation ends, however it ends.
struct CompletionGuard {
  core: Arc<FunnelCore>,
  task_id: TaskId,
}

impl Drop for CompletionGuard {
  fn drop(&mut self) {
    self.core.complete(self.task_id);
  }
}

/// Proof that [`FunnelControl::retry`] accepted the request to wait.
///
/// Return it as [`Attempt::Retry`] and the funnel will re-run the task once
/// woken.
#[derive(Debug)]
pub struct Retry {
  wake: oneshot::Receiver<()>,
}

/// The outcome of one pass through a funnel task.
#[derive(Debug)]
pub enum Attempt<T> {
  Done(T),
  Retry(Retry),
}

impl<T> From<Retry> for Attempt<T> {
  fn from(retry: Retry) -> Self {
    Attempt::Retry(retry)
  }
}

/// The per-invocation capabilities handed to a funnel task.
#[derive(Clone)]
pub struct FunnelControl {
  core: Arc<FunnelCore>,
  task_id: TaskId,
}

impl fmt::Debug for FunnelControl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FunnelControl")
      .field("funnel", &self.core.name)
      .field("task_id", &self.task_id)
      .finish()
  }
}

impl FunnelControl {
  pub fn task_id(&self) -> TaskId {
    self.task_id
  }

  /// Asks for a slot. `Ok(false)` means proceed, `Ok(true)` means call
  /// [`retry`](Self::retry) and return its token.
  ///
  /// # Errors
  /// `ControlError::InvalidShouldRetry` if already called in this attempt.
  pub fn should_retry(&self) -> Result<bool, ControlError> {
    self.core.should_retry(self.task_id)
  }

  /// Parks this invocation until a slot frees up.
  ///
  /// # Errors
  /// `ControlError::InvalidRetry` unless `should_retry` just returned `true`.
  pub fn retry(&self) -> Result<Retry, ControlError> {
    self.core.retry(self.task_id)
  }

  /// Gives the slot back early. The task itself keeps running.
  pub fn shortcut(&self) {
    self.core.complete(self.task_id);
  }
}

/// A funnel limiting how many competing tasks are in their protected phase.
#[derive(Clone)]
pub struct Funnel {
  core: Arc<FunnelCore>,
}

impl fmt::Debug for Funnel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Funnel")
      .field("name", &self.core.name)
      .field("concurrency", &self.core.concurrency)
      .field("fifo", &self.core.fifo)
      .field("live", &self.live_count())
      .finish()
  }
}

pub fn funnel(options: FunnelOptions) -> Result<Funnel, ControlError> {
  Funnel::new(options)
}

impl Funnel {
  /// # Errors
  /// Returns `ControlError::InvalidConcurrency` if `options.concurrency` is zero.
  pub fn new(options: FunnelOptions) -> Result<Self, ControlError> {
    if options.concurrency < 1 {
      return Err(ControlError::InvalidConcurrency(options.concurrency));
    }
    Ok(Self {
      core: Arc::new(FunnelCore {
        name: options.name,
        concurrency: options.concurrency,
        fifo: options.fifo,
        on_empty: options.on_empty,
        tasks: Mutex::new(BTreeMap::new()),
      }),
    })
  }

  /// Number of invocations that have not completed or shortcut yet.
  pub fn live_count(&self) -> usize {
    self.core.tasks.lock().len()
  }

  /// Number of invocations parked in `retry`.
  pub fn waiting_count(&self) -> usize {
    FunnelCore::count_in(&self.core.tasks.lock(), TaskState::Waiting)
  }

  /// Spawns a funnel invocation.
  ///
  /// The task is registered before this returns, so wake order follows call
  /// order. `f` is called again from the top after every wake.
  pub fn run<F, Fut, T, E>(&self, f: F) -> TaskHandle<Result<T, E>>
  where
    F: Fn(FunnelControl) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Attempt<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: From<ControlError> + Send + 'static,
  {
    let task_id = self.core.register();
    let guard = CompletionGuard {
      core: Arc::clone(&self.core),
      task_id,
    };
    let span = info_span!("funnel_task", name = %self.core.name, %task_id);

    let join_handle = tokio::spawn(
      async move {
        let attempts = async {
          let mut attempt = 0usize;
          loop {
            attempt += 1;
            let control = FunnelControl {
              core: Arc::clone(&guard.core),
              task_id,
            };
            match f(control).await {
              Ok(Attempt::Done(value)) => break Ok(value),
              Ok(Attempt::Retry(retry)) => {
                // A dropped sender means the record was shortcut meanwhile; run again either way.
                let _ = retry.wake.await;
                trace!(%task_id, attempt, "Woken, re-running task.");
              }
              Err(error) => break Err(error),
            }
          }
        };

        let outcome = AssertUnwindSafe(attempts).catch_unwind().await;
        drop(guard);
        match outcome {
          Ok(outcome) => Ok(outcome),
          Err(_panic_payload) => {
            error!(%task_id, "Funnel task panicked during execution.");
            Err(ControlError::TaskPanicked)
          }
        }
      }
      .instrument(span),
    );

    TaskHandle::new(task_id, join_handle)
  }
}

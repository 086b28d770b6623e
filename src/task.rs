use std::sync::atomic::{AtomicU64, Ordering};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Process-unique identifier handed to every spawned task and funnel invocation.
pub type TaskId = u64;

pub(crate) fn next_task_id() -> TaskId {
  NEXT_TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

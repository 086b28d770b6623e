use crate::error::ControlError;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A permit acquired from the `CapacityGate`. Its `Drop` implementation
/// frees the slot, handing it straight to the oldest queued waiter if any.
pub(crate) struct Permit {
  gate: Option<Arc<CapacityGate>>,
}

impl Permit {
  fn new(gate: Arc<CapacityGate>) -> Self {
    Self { gate: Some(gate) }
  }

  /// Forgets the slot without releasing it. Only used for permits whose
  /// slot has already been accounted for elsewhere.
  fn disarm(mut self) {
    self.gate = None;
  }
}

impl fmt::Debug for Permit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Permit").field("armed", &self.gate.is_some()).finish()
  }
}

impl Drop for Permit {
  fn drop(&mut self) {
    if let Some(gate) = self.gate.take() {
      gate.release();
    }
  }
}

/// The outcome of asking the gate for a slot.
pub(crate) enum Admission {
  /// A slot was free; the task may start right away.
  Granted(Permit),
  /// The task was appended to the backlog and will receive its permit later.
  Queued(oneshot::Receiver<Permit>),
}

struct GateState {
  active: usize,
  backlog: VecDeque<oneshot::Sender<Permit>>,
}

/// Caps the number of simultaneously admitted tasks, queueing the rest in
/// strict submission order.
pub(crate) struct CapacityGate {
  capacity: usize,
  state: Mutex<GateState>,
}

impl fmt::Debug for CapacityGate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("CapacityGate")
      .field("capacity", &self.capacity)
      .field("active", &state.active)
      .field("queued", &state.backlog.len())
      .finish()
  }
}

impl CapacityGate {
  pub(crate) fn new(capacity: usize) -> Result<Self, ControlError> {
    if capacity < 1 {
      return Err(ControlError::InvalidConcurrency(capacity));
    }
    Ok(Self {
      capacity,
      state: Mutex::new(GateState {
        active: 0,
        backlog: VecDeque::new(),
      }),
    })
  }

  pub(crate) fn unbounded() -> Self {
    Self {
      capacity: usize::MAX,
      state: Mutex::new(GateState {
        active: 0,
        backlog: VecDeque::new(),
      }),
    }
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  pub(crate) fn active(&self) -> usize {
    self.state.lock().active
  }

  pub(crate) fn queued(&self) -> usize {
    self.state.lock().backlog.len()
  }

  /// Grants a slot immediately or enqueues the caller behind earlier waiters.
  ///
  /// A free slot is never granted while older waiters are still queued.
  pub(crate) fn admit(self: &Arc<Self>) -> Admission {
    let mut state = self.state.lock();
    if state.active < self.capacity && state.backlog.is_empty() {
      state.active += 1;
      Admission::Granted(Permit::new(Arc::clone(self)))
    } else {
      let (tx, rx) = oneshot::channel();
      state.backlog.push_back(tx);
      Admission::Queued(rx)
    }
  }

  fn release(self: &Arc<Self>) {
    let mut state = self.state.lock();
    while let Some(waiter) = state.backlog.pop_front() {
      // The slot moves to the waiter as-is, so `active` is unchanged.
      match waiter.send(Permit::new(Arc::clone(self))) {
        Ok(()) => return,
        Err(orphan) => orphan.disarm(),
      }
    }
    state.active = state.active.saturating_sub(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn granted(admission: Admission) -> Permit {
    match admission {
      Admission::Granted(permit) => permit,
      Admission::Queued(_) => panic!("expected an immediate grant"),
    }
  }

  fn queued(admission: Admission) -> oneshot::Receiver<Permit> {
    match admission {
      Admission::Queued(rx) => rx,
      Admission::Granted(_) => panic!("expected the admission to be queued"),
    }
  }

  #[test]
  fn test_rejects_zero_capacity() {
    assert_eq!(
      CapacityGate::new(0).unwrap_err(),
      ControlError::InvalidConcurrency(0)
    );
  }

  #[tokio::test]
  async fn test_grant_until_full_then_queue() {
    let gate = Arc::new(CapacityGate::new(2).unwrap());

    let first = granted(gate.admit());
    let _second = granted(gate.admit());
    let third = queued(gate.admit());
    assert_eq!(gate.active(), 2);
    assert_eq!(gate.queued(), 1);

    drop(first);
    // Slot handed over directly: still two active, nobody queued.
    assert_eq!(gate.active(), 2);
    assert_eq!(gate.queued(), 0);

    let handed_over = third.await.unwrap();
    drop(handed_over);
    assert_eq!(gate.active(), 1);
  }

  #[tokio::test]
  async fn test_backlog_is_fifo() {
    let gate = Arc::new(CapacityGate::new(1).unwrap());

    let holder = granted(gate.admit());
    let mut first = queued(gate.admit());
    let mut second = queued(gate.admit());

    drop(holder);
    let promoted = first.try_recv();
    assert!(promoted.is_ok());
    assert!(second.try_recv().is_err());
    assert_eq!(gate.queued(), 1);
  }

  #[tokio::test]
  async fn test_abandoned_waiters_do_not_leak_slots() {
    let gate = Arc::new(CapacityGate::new(1).unwrap());

    let holder = granted(gate.admit());
    let abandoned = queued(gate.admit());
    let survivor = queued(gate.admit());
    drop(abandoned);

    drop(holder);
    let permit = survivor.await.unwrap();
    assert_eq!(gate.active(), 1);
    drop(permit);
    assert_eq!(gate.active(), 0);
    assert_eq!(gate.queued(), 0);
  }

  #[tokio::test]
  async fn test_delivered_but_unclaimed_permit_releases_on_drop() {
    let gate = Arc::new(CapacityGate::new(1).unwrap());

    let holder = granted(gate.admit());
    let waiter = queued(gate.admit());
    drop(holder);
    assert_eq!(gate.active(), 1);

    // The permit sits inside the channel; dropping the receiver drops it too.
    drop(waiter);
    assert_eq!(gate.active(), 0);
  }
}

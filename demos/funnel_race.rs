use futures_conductor::{funnel, Attempt, ControlError, FunnelOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Several workers race to refresh a shared token; only one at a time may do
/// the expensive fetch and the rest pick up its result on their re-run.
#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Funnel Race Example ---");

  let fun = match funnel(FunnelOptions::default().with_name("token_refresh").with_on_empty(|| {
    info!("Funnel drained.");
  })) {
    Ok(fun) => fun,
    Err(e) => {
      tracing::error!("Failed to build funnel: {}", e);
      return;
    }
  };

  let generation = Arc::new(AtomicUsize::new(0));
  let handles: Vec<_> = (0..4)
    .map(|worker| {
      let generation = generation.clone();
      fun.run(move |control| {
        let generation = generation.clone();
        async move {
          let seen = generation.load(Ordering::SeqCst);
          if seen > 0 {
            info!("Worker {} reuses token generation {}", worker, seen);
            return Ok(Attempt::Done(seen));
          }
          if control.should_retry()? {
            info!("Worker {} waits for the refresh in flight", worker);
            return Ok(control.retry()?.into());
          }

          info!("Worker {} refreshes the token", worker);
          tokio::time::sleep(Duration::from_millis(500)).await;
          let fresh = generation.fetch_add(1, Ordering::SeqCst) + 1;
          Ok::<_, ControlError>(Attempt::Done(fresh))
        }
      })
    })
    .collect();

  for handle in handles {
    let task_id = handle.id();
    match handle.await_flattened().await {
      Ok(token) => info!("Task {}: token generation {}", task_id, token),
      Err(e) => info!("Task {}: failed: {}", task_id, e),
    }
  }
  info!("--- Funnel Race Example End ---");
}

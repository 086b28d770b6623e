use futures_conductor::{concurrent, map_with, ConcurrencyOptions, ControlError, TaskHandle};
use std::future::ready;
use std::time::Duration;
use tracing::info;

async fn long_task_fn(id: usize) -> String {
  info!("Task {} starting (should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("Task {} finished", id);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 2) ---");

  let concurrency_limit = 2;
  let queue = match concurrent(concurrency_limit) {
    Ok(queue) => queue.with_name("concurrency_queue"),
    Err(e) => {
      tracing::error!("Failed to build queue: {}", e);
      return;
    }
  };

  let num_tasks = 5;
  info!(
    "Submitting {} tasks, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  let handles: Vec<TaskHandle<String>> = (0..num_tasks).map(|i| queue.run(move || long_task_fn(i))).collect();
  info!(
    "Active: {}, queued: {}",
    queue.active_count(),
    queue.queued_count()
  );

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(result) => info!("Task {} main: Received result: {}", task_id, result),
      Err(e) => info!("Task {} main: Received error: {:?}", task_id, e),
    }
  }

  info!("Same limit through map_with:");
  let squares = map_with(
    (1..=6u64).map(ready),
    ConcurrencyOptions::limited(concurrency_limit),
    |x, index, length| async move {
      tokio::time::sleep(Duration::from_millis(200)).await;
      info!("Element {} of {} done", index + 1, length);
      Ok::<_, ControlError>(x * x)
    },
  )
  .await;
  info!("Squares: {:?}", squares);
  info!("--- Concurrency Limit Example End ---");
}

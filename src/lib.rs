//! Async control-flow primitives on Tokio: a bounded concurrency queue,
//! concurrency-limited collection combinators, a retry-and-resume funnel,
//! ordered one-shot signals, and small glue helpers over plain futures.

mod capacity_gate;
mod concurrent;
mod defer_set;
mod deferred;
mod delay;
mod error;
mod funnel;
mod handle;
mod inspect;
mod map;
mod once;
mod proxy;
mod retry;
mod sequential;
mod task;

pub use concurrent::{concurrent, concurrent_fn, Concurrent, Throttled};
pub use defer_set::{defer_set, DeferSet, Wait};
pub use deferred::{defer, Deferred, Promise};
pub use delay::{delay, delay_chain, delay_value, finally, finally_delay};
pub use error::ControlError;
pub use funnel::{funnel, Attempt, Funnel, FunnelControl, FunnelOptions, Retry};
pub use handle::TaskHandle;
pub use inspect::{inspect, reflect, Inspectable, Reflection};
pub use map::{
  each, each_with, filter, filter_with, filterer, for_each, map, map_with, mapper, ConcurrencyOptions, Filterer,
  ForEach, Mapper,
};
pub use once::{once, Once, OnceFn};
pub use proxy::{props, rethrow, specific, tap, try_fn, try_tap, wrap_function};
pub use retry::{retry, retry_if, retry_sync, retry_sync_if};
pub use sequential::{reduce, reduce_with, some};
pub use task::TaskId;

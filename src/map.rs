//! Collection combinators scheduled through a [`Concurrent`] queue.
//!
//! Every element is awaited inside its own queue slot before the callback sees
//! it, so plain values are passed as `std::future::ready(value)`. Callbacks
//! receive the element, its index and the total length. Results keep
//! input order; the first failure rejects the whole call, while tasks that were
//! already started keep running to completion in the background.

use crate::concurrent::Concurrent;
use crate::error::ControlError;
use crate::handle::TaskHandle;

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures::future::try_join_all;

/// How many elements a combinator may process at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcurrencyOptions {
  /// `None` schedules every element immediately.
  pub concurrency: Option<usize>,
}

impl ConcurrencyOptions {
  pub fn limited(concurrency: usize) -> Self {
    Self {
      concurrency: Some(concurrency),
    }
  }

  pub fn unbounded() -> Self {
    Self { concurrency: None }
  }

  fn build_queue(&self, name: &str) -> Result<Concurrent, ControlError> {
    let queue = match self.concurrency {
      Some(concurrency) => Concurrent::new(concurrency)?,
      None => Concurrent::unbounded(),
    };
    Ok(queue.with_name(name))
  }
}

async fn map_on<I, T, F, Fut, U, E>(queue: Concurrent, items: I, f: Arc<F>) -> Result<Vec<U>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<U, E>> + Send + 'static,
  U: Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  let pending: Vec<_> = items.into_iter().map(IntoFuture::into_future).collect();
  let length = pending.len();

  let handles: Vec<TaskHandle<Result<U, E>>> = pending
    .into_iter()
    .enumerate()
    .map(|(index, pending)| {
      let f = Arc::clone(&f);
      queue.run(move || async move {
        let value = pending.await;
        f(value, index, length).await
      })
    })
    .collect();

  try_join_all(handles.into_iter().map(TaskHandle::await_flattened)).await
}

async fn filter_on<I, T, F, Fut, E>(queue: Concurrent, items: I, f: Arc<F>) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<bool, E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  let verdicts = map_on(
    queue,
    items,
    Arc::new(move |value: T, index: usize, length: usize| {
      let kept = value.clone();
      let verdict = f(value, index, length);
      async move { verdict.await.map(|keep| (keep, kept)) }
    }),
  )
  .await?;

  Ok(
    verdicts
      .into_iter()
      .filter_map(|(keep, value)| keep.then_some(value))
      .collect(),
  )
}

async fn each_on<I, T, F, Fut, E>(queue: Concurrent, items: I, f: Arc<F>) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  map_on(
    queue,
    items,
    Arc::new(move |value: T, index: usize, length: usize| {
      let kept = value.clone();
      let visited = f(value, index, length);
      async move { visited.await.map(|()| kept) }
    }),
  )
  .await
}

/// Maps every element with unbounded concurrency.
pub async fn map<I, T, F, Fut, U, E>(items: I, f: F) -> Result<Vec<U>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<U, E>> + Send + 'static,
  U: Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  map_with(items, ConcurrencyOptions::default(), f).await
}

pub async fn map_with<I, T, F, Fut, U, E>(items: I, options: ConcurrencyOptions, f: F) -> Result<Vec<U>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<U, E>> + Send + 'static,
  U: Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  let queue = options.build_queue("map")?;
  map_on(queue, items, Arc::new(f)).await
}

/// Keeps the elements whose predicate resolves to `true`, in input order.
pub async fn filter<I, T, F, Fut, E>(items: I, f: F) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<bool, E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  filter_with(items, ConcurrencyOptions::default(), f).await
}

pub async fn filter_with<I, T, F, Fut, E>(items: I, options: ConcurrencyOptions, f: F) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<bool, E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  let queue = options.build_queue("filter")?;
  filter_on(queue, items, Arc::new(f)).await
}

/// Visits the elements strictly one after another and returns them unchanged.
pub async fn each<I, T, F, Fut, E>(items: I, f: F) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  each_with(items, ConcurrencyOptions::limited(1), f).await
}

/// Like [`each`], but with caller-chosen concurrency.
pub async fn each_with<I, T, F, Fut, E>(items: I, options: ConcurrencyOptions, f: F) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  I::Item: IntoFuture<Output = T>,
  <I::Item as IntoFuture>::IntoFuture: Send + 'static,
  T: Clone + Send + 'static,
  F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: From<ControlError> + Send + 'static,
{
  let queue = options.build_queue("each")?;
  each_on(queue, items, Arc::new(f)).await
}

/// A map callback bound to options up front. All applications share one queue.
#[derive(Debug)]
pub struct Mapper<F> {
  queue: Concurrent,
  f: Arc<F>,
}

pub fn mapper<F>(options: ConcurrencyOptions, f: F) -> Result<Mapper<F>, ControlError> {
  Ok(Mapper {
    queue: options.build_queue("map")?,
    f: Arc::new(f),
  })
}

impl<F> Mapper<F> {
  pub async fn apply<I, T, Fut, U, E>(&self, items: I) -> Result<Vec<U>, E>
  where
    I: IntoIterator,
    I::Item: IntoFuture<Output = T>,
    <I::Item as IntoFuture>::IntoFuture: Send + 'static,
    T: Send + 'static,
    F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, E>> + Send + 'static,
    U: Send + 'static,
    E: From<ControlError> + Send + 'static,
  {
    map_on(self.queue.clone(), items, Arc::clone(&self.f)).await
  }
}

#[derive(Debug)]
pub struct Filterer<F> {
  queue: Concurrent,
  f: Arc<F>,
}

pub fn filterer<F>(options: ConcurrencyOptions, f: F) -> Result<Filterer<F>, ControlError> {
  Ok(Filterer {
    queue: options.build_queue("filter")?,
    f: Arc::new(f),
  })
}

impl<F> Filterer<F> {
  pub async fn apply<I, T, Fut, E>(&self, items: I) -> Result<Vec<T>, E>
  where
    I: IntoIterator,
    I::Item: IntoFuture<Output = T>,
    <I::Item as IntoFuture>::IntoFuture: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: From<ControlError> + Send + 'static,
  {
    filter_on(self.queue.clone(), items, Arc::clone(&self.f)).await
  }
}

#[derive(Debug)]
pub struct ForEach<F> {
  queue: Concurrent,
  f: Arc<F>,
}

/// Curried [`each_with`]. Pass `ConcurrencyOptions::limited(1)` for the sequential default.
pub fn for_each<F>(options: ConcurrencyOptions, f: F) -> Result<ForEach<F>, ControlError> {
  Ok(ForEach {
    queue: options.build_queue("each")?,
    f: Arc::new(f),
  })
}

impl<F> ForEach<F> {
  pub async fn apply<I, T, Fut, E>(&self, items: I) -> Result<Vec<T>, E>
  where
    I: IntoIterator,
    I::Item: IntoFuture<Output = T>,
    <I::Item as IntoFuture>::IntoFuture: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(T, usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: From<ControlError> + Send + 'static,
  {
    each_on(self.queue.clone(), items, Arc::clone(&self.f)).await
  }
}

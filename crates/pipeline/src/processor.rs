//! Processor - the business logic plug-in point

use std::future::Future;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// Turns one input item into one output item
///
/// The same processor is called concurrently from every source loop of a
/// pipeline with no serialisation, so it must be stateless or internally
/// thread-safe. Returning an error sends it to the error handler and drops
/// the item.
#[async_trait]
pub trait Processor<I, O>: Send + Sync {
    /// Process one item
    async fn process(&self, cx: &Context, item: I) -> Result<O>;
}

/// Processor backed by an async closure, see `process_fn`
#[derive(Clone)]
pub struct ProcessFn<F>(F);

/// Build a processor from a closure returning a future
///
/// ```ignore
/// let increment = process_fn(|n: u32| async move { Ok(n + 1) });
/// ```
pub fn process_fn<F>(f: F) -> ProcessFn<F> {
    ProcessFn(f)
}

#[async_trait]
impl<I, O, F, Fut> Processor<I, O> for ProcessFn<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O>> + Send,
{
    async fn process(&self, _cx: &Context, item: I) -> Result<O> {
        (self.0)(item).await
    }
}

impl<F> std::fmt::Debug for ProcessFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessFn")
    }
}

/// Processor that returns every item unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl<T> Processor<T, T> for Identity
where
    T: Send + 'static,
{
    async fn process(&self, _cx: &Context, item: T) -> Result<T> {
        Ok(item)
    }
}

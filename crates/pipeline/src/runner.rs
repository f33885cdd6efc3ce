//! Running several pipelines together
//!
//! Pipelines of a graph usually have different item types, so they are
//! erased behind `Runnable` before being handed to `run_many`.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::pipeline::{Pipeline, RunReport};

/// A pipeline run erased to its report
pub type BoxedRun = Pin<Box<dyn Future<Output = RunReport> + Send>>;

/// Anything `run_many` can drive
pub trait Runnable: Send {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Turn into the future of one run
    fn into_run(self: Box<Self>, cancel: CancellationToken) -> BoxedRun;
}

impl<I, O> Runnable for Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        Pipeline::name(self)
    }

    fn into_run(self: Box<Self>, cancel: CancellationToken) -> BoxedRun {
        Box::pin((*self).run(cancel))
    }
}

/// Run every pipeline concurrently and wait for all of them
///
/// Each pipeline gets its own task and a clone of `cancel`. Reports come
/// back in input order; a pipeline whose task panicked is reported with
/// `StopReason::Panicked`.
pub async fn run_many(pipelines: Vec<Box<dyn Runnable>>, cancel: CancellationToken) -> Vec<RunReport> {
    let started = Instant::now();

    let tasks: Vec<_> = pipelines
        .into_iter()
        .map(|pipeline| {
            let name = pipeline.name().to_string();
            (name, tokio::spawn(pipeline.into_run(cancel.clone())))
        })
        .collect();

    tracing::info!(pipelines = tasks.len(), "running pipelines");

    let mut reports = Vec::with_capacity(tasks.len());
    for (name, task) in tasks {
        match task.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(pipeline = %name, error = %e, "pipeline task failed");
                reports.push(RunReport::panicked(name, started.elapsed()));
            }
        }
    }

    reports
}

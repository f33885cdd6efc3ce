//! Pipeline runtime tests
//!
//! Ordering, fan-out, stop conditions, runtime source registration and
//! shutdown behaviour of `Pipeline::run`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::handler::handler_fn;
use crate::processor::{Identity, process_fn};
use crate::source::IterSource;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared view of what a `RecordingSink` received
#[derive(Clone)]
struct Recorded<T> {
    items: Arc<Mutex<Vec<T>>>,
    closes: Arc<AtomicUsize>,
}

impl<T: Clone> Recorded<T> {
    fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct RecordingSink<T> {
    recorded: Recorded<T>,
    fail_on: Option<T>,
    fail_fatal: bool,
    fail_close: bool,
}

impl<T: Clone> RecordingSink<T> {
    fn new() -> (Self, Recorded<T>) {
        let recorded = Recorded {
            items: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        };
        let sink = Self {
            recorded: recorded.clone(),
            fail_on: None,
            fail_fatal: false,
            fail_close: false,
        };
        (sink, recorded)
    }

    fn failing_on(mut self, item: T) -> Self {
        self.fail_on = Some(item);
        self
    }

    fn failing_fatally_on(mut self, item: T) -> Self {
        self.fail_on = Some(item);
        self.fail_fatal = true;
        self
    }

    fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[async_trait]
impl<T> Sink<T> for RecordingSink<T>
where
    T: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    async fn push(&mut self, item: &T) -> Result<usize> {
        if self.fail_on.as_ref() == Some(item) {
            if self.fail_fatal {
                return Err(PipelineError::write(format!("refused {item:?}")).into_fatal());
            }
            return Err(PipelineError::write(format!("rejected {item:?}")));
        }
        self.recorded.items.lock().push(item.clone());
        Ok(1)
    }

    async fn close(&mut self) -> Result<()> {
        self.recorded.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(PipelineError::close("disk went away"));
        }
        Ok(())
    }
}

/// Source replaying a fixed script of outcomes, then end of stream
struct ScriptSource<T> {
    script: VecDeque<Result<T>>,
}

impl<T> ScriptSource<T> {
    fn new(script: impl IntoIterator<Item = Result<T>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Source<T> for ScriptSource<T> {
    async fn pull(&mut self) -> Result<Option<T>> {
        self.script.pop_front().transpose()
    }
}

/// Source that never produces anything
struct PendingSource;

#[async_trait]
impl Source<u32> for PendingSource {
    async fn pull(&mut self) -> Result<Option<u32>> {
        std::future::pending().await
    }
}

/// Source that panics on its first pull
struct PanicSource;

#[async_trait]
impl Source<u32> for PanicSource {
    async fn pull(&mut self) -> Result<Option<u32>> {
        panic!("source blew up");
    }
}

fn increment() -> impl Processor<u32, u32> {
    process_fn(|n: u32| async move { Ok(n + 1) })
}

async fn wait_for_items<T: Clone>(recorded: &Recorded<T>, count: usize) {
    timeout(TEST_TIMEOUT, async {
        while recorded.items.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timeout waiting for items");
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_items_reach_every_sink_in_order() {
    let (sink_a, a) = RecordingSink::new();
    let (sink_b, b) = RecordingSink::new();

    let mut pipeline = Pipeline::new("increment", increment());
    pipeline
        .add_source(IterSource::new([1u32, 2, 3]))
        .add_sink(sink_a)
        .add_sink(sink_b);

    let report = timeout(TEST_TIMEOUT, pipeline.run(CancellationToken::new()))
        .await
        .expect("pipeline did not stop");

    assert_eq!(report.reason, StopReason::Drained);
    assert!(report.is_clean());
    assert_eq!(a.items(), vec![2, 3, 4]);
    assert_eq!(b.items(), vec![2, 3, 4]);
    assert_eq!(a.closes(), 1);
    assert_eq!(b.closes(), 1);

    assert_eq!(report.metrics.items_read, 3);
    assert_eq!(report.metrics.items_processed, 3);
    assert_eq!(report.metrics.items_written, 3);
    assert_eq!(report.metrics.sink_writes_success, 6);
    assert_eq!(report.metrics.sources_exhausted, 1);
}

#[tokio::test]
async fn test_per_source_order_with_many_sources() {
    let (sink, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new("tagged", Identity);
    pipeline
        .add_source(IterSource::new((0..50u32).map(|n| (0u8, n))))
        .add_source(IterSource::new((0..50u32).map(|n| (1u8, n))))
        .add_source(IterSource::new((0..50u32).map(|n| (2u8, n))))
        .add_sink(sink);

    let report = timeout(TEST_TIMEOUT, pipeline.run(CancellationToken::new()))
        .await
        .expect("pipeline did not stop");
    assert_eq!(report.reason, StopReason::Drained);

    let items = recorded.items();
    assert_eq!(items.len(), 150);
    for tag in 0..3u8 {
        let seen: Vec<u32> = items
            .iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>(), "source {tag} out of order");
    }
}

#[tokio::test]
async fn test_pipeline_without_sinks_still_drains() {
    let mut pipeline = Pipeline::new("blackhole", increment());
    pipeline.add_source(IterSource::new([1u32, 2]));

    let report = pipeline.run(CancellationToken::new()).await;
    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(report.metrics.items_processed, 2);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_read_error_skips_item() {
    let (sink, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new("reader", increment());
    pipeline
        .add_source(ScriptSource::new([
            Ok(1u32),
            Err(PipelineError::read("bad frame")),
            Ok(3),
        ]))
        .add_sink(sink);

    let report = pipeline.run(CancellationToken::new()).await;

    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(recorded.items(), vec![2, 4]);
    assert_eq!(report.metrics.read_errors, 1);
    assert!(report.fatal_error.is_none());
}

#[tokio::test]
async fn test_end_of_stream_never_reaches_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut pipeline = Pipeline::new("quiet", increment());
    pipeline
        .add_source(IterSource::new([1u32]))
        .set_error_handler(handler_fn(move |_cx: &Context, err: PipelineError| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(err)
        }));

    let report = pipeline.run(CancellationToken::new()).await;
    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_sink_yields_one_combined_error() {
    let errors: Arc<Mutex<Vec<PipelineError>>> = Arc::default();
    let captured = Arc::clone(&errors);

    let (sink_a, a) = RecordingSink::new();
    let (sink_b, b) = RecordingSink::new();

    let mut pipeline = Pipeline::new("fanout", increment());
    pipeline
        .add_source(IterSource::new([1u32, 2]))
        .add_sink(sink_a.failing_on(3))
        .add_sink(sink_b)
        .set_error_handler(handler_fn(move |_cx: &Context, err: PipelineError| {
            captured.lock().push(err);
            None
        }));

    let report = pipeline.run(CancellationToken::new()).await;

    assert_eq!(a.items(), vec![2]);
    assert_eq!(b.items(), vec![2, 3]);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::CombinedWrite);
    assert!(!errors[0].is_fatal());
    assert!(errors[0].to_string().contains("rejected 3"));

    assert_eq!(report.metrics.write_errors, 1);
    assert_eq!(report.metrics.items_written, 1);
    assert_eq!(report.metrics.sink_writes_failed, 1);
}

#[tokio::test]
async fn test_two_of_three_sinks_fail_with_one_fatal() {
    // (kind, fatal, message, cause count) of every handled error
    let seen: Arc<Mutex<Vec<(ErrorKind, bool, String, usize)>>> = Arc::default();
    let captured = Arc::clone(&seen);

    let (sink_a, a) = RecordingSink::new();
    let (sink_b, b) = RecordingSink::new();
    let (sink_c, c) = RecordingSink::new();

    let mut pipeline = Pipeline::new("fanout", increment());
    pipeline
        .add_source(IterSource::new([1u32]))
        .add_sink(sink_a.failing_on(2))
        .add_sink(sink_b.failing_fatally_on(2))
        .add_sink(sink_c)
        .set_error_handler(handler_fn(move |_cx: &Context, err: PipelineError| {
            captured.lock().push((
                err.kind(),
                err.is_fatal(),
                err.message().to_string(),
                err.causes().len(),
            ));
            Some(err)
        }));

    let report = timeout(TEST_TIMEOUT, pipeline.run(CancellationToken::new()))
        .await
        .unwrap();

    assert!(a.items().is_empty());
    assert!(b.items().is_empty());
    assert_eq!(c.items(), vec![2]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let (kind, fatal, message, causes) = &seen[0];
    assert_eq!(*kind, ErrorKind::CombinedWrite);
    assert!(*fatal);
    assert_eq!(*causes, 2);
    assert!(message.contains("rejected 2"));
    assert!(message.contains("refused 2"));

    assert_eq!(report.reason, StopReason::Drained);
    assert!(report.fatal_error.is_some());
    assert_eq!(report.metrics.fatal_errors, 1);
    assert_eq!(report.metrics.sink_writes_failed, 2);
    assert_eq!(report.metrics.sink_writes_success, 1);
}

#[tokio::test]
async fn test_process_error_goes_to_handler() {
    let kinds: Arc<Mutex<Vec<ErrorKind>>> = Arc::default();
    let captured = Arc::clone(&kinds);

    let (sink, recorded) = RecordingSink::new();
    let mut pipeline = Pipeline::new(
        "odd-only",
        process_fn(|n: u32| async move {
            if n % 2 == 0 {
                Err(PipelineError::process(format!("{n} is even")))
            } else {
                Ok(n)
            }
        }),
    );
    pipeline
        .add_source(IterSource::new([1u32, 2, 3, 4, 5]))
        .add_sink(sink)
        .set_error_handler(handler_fn(move |_cx: &Context, err: PipelineError| {
            captured.lock().push(err.kind());
            Some(err)
        }));

    let report = pipeline.run(CancellationToken::new()).await;

    assert_eq!(recorded.items(), vec![1, 3, 5]);
    assert_eq!(*kinds.lock(), vec![ErrorKind::Process, ErrorKind::Process]);
    assert_eq!(report.metrics.process_errors, 2);
}

#[tokio::test]
async fn test_fatal_error_waits_for_remaining_sources() {
    let (mut feed, coupled) = coupler::<u32>();
    let (sink, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new(
        "fatal",
        process_fn(|n: u32| async move {
            if n == 0 {
                Err(PipelineError::process("zero"))
            } else {
                Ok(n)
            }
        }),
    );
    pipeline
        .add_source(IterSource::new([0u32]))
        .add_source(coupled)
        .add_sink(sink)
        .set_error_handler(handler_fn(|_cx: &Context, err: PipelineError| {
            Some(err.into_fatal())
        }));

    let run = tokio::spawn(pipeline.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished(), "pipeline stopped while a source remained");

    timeout(TEST_TIMEOUT, feed.send(7))
        .await
        .expect("timeout feeding coupler")
        .unwrap();
    feed.finish();

    let report = timeout(TEST_TIMEOUT, run)
        .await
        .expect("pipeline did not stop")
        .unwrap();

    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(report.fatal_error.as_deref(), Some("zero"));
    assert!(!report.is_clean());
    assert_eq!(report.metrics.fatal_errors, 1);
    wait_for_items(&recorded, 1).await;
    assert_eq!(recorded.items(), vec![7]);
}

// ============================================================================
// Stopping
// ============================================================================

#[tokio::test]
async fn test_no_sources_stops_immediately() {
    let (sink, recorded) = RecordingSink::<u32>::new();
    let mut pipeline = Pipeline::new("empty", increment());
    pipeline.add_sink(sink);

    let report = timeout(TEST_TIMEOUT, pipeline.run(CancellationToken::new()))
        .await
        .expect("pipeline did not stop");

    assert_eq!(report.reason, StopReason::NoSources);
    assert_eq!(recorded.closes(), 1);
}

#[tokio::test]
async fn test_cancel_stops_blocked_sources() {
    let (sink_a, a) = RecordingSink::<u32>::new();
    let (sink_b, b) = RecordingSink::<u32>::new();

    let mut pipeline = Pipeline::new("stuck", increment());
    pipeline
        .add_source(PendingSource)
        .add_source(PendingSource)
        .add_sink(sink_a)
        .add_sink(sink_b);

    let cancel = CancellationToken::new();
    let run = tokio::spawn(pipeline.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let report = timeout(TEST_TIMEOUT, run)
        .await
        .expect("pipeline ignored cancellation")
        .unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(a.closes(), 1);
    assert_eq!(b.closes(), 1);
}

#[tokio::test]
async fn test_close_failure_is_swallowed() {
    let (failing, a) = RecordingSink::new();
    let (healthy, b) = RecordingSink::new();

    let mut pipeline = Pipeline::new("closing", increment());
    pipeline
        .add_source(IterSource::new([1u32]))
        .add_sink(failing.failing_close())
        .add_sink(healthy);

    let report = pipeline.run(CancellationToken::new()).await;

    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(a.closes(), 1);
    assert_eq!(b.closes(), 1);
    assert_eq!(b.items(), vec![2]);
}

#[tokio::test]
async fn test_stuck_sink_close_times_out() {
    // Nobody pulls from the coupler, so the push never completes
    let (stuck, _unread) = coupler::<u32>();
    let (healthy, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new("stuck-sink", increment());
    pipeline
        .add_source(IterSource::new([1u32]))
        .add_sink(stuck)
        .add_sink(healthy)
        .set_config(PipelineConfig::default().with_close_timeout(Duration::from_millis(50)));

    let cancel = CancellationToken::new();
    let run = tokio::spawn(pipeline.run(cancel.clone()));

    wait_for_items(&recorded, 1).await;
    cancel.cancel();

    let report = timeout(TEST_TIMEOUT, run)
        .await
        .expect("shutdown hung on a stuck sink")
        .unwrap();
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(recorded.closes(), 1);
}

#[tokio::test]
async fn test_panicking_source_is_removed() {
    let (sink, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new("panicky", increment());
    pipeline
        .add_source(PanicSource)
        .add_source(IterSource::new([1u32, 2]))
        .add_sink(sink);

    let report = timeout(TEST_TIMEOUT, pipeline.run(CancellationToken::new()))
        .await
        .expect("pipeline did not stop after a source panicked");

    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(recorded.items(), vec![2, 3]);
    assert_eq!(recorded.closes(), 1);
}

// ============================================================================
// Handles
// ============================================================================

#[tokio::test]
async fn test_handle_adds_source_before_run() {
    let (sink, recorded) = RecordingSink::new();
    let mut pipeline = Pipeline::new("late", increment());
    pipeline.add_sink(sink);

    pipeline
        .handle()
        .add_source(IterSource::new([10u32]))
        .unwrap();

    let report = pipeline.run(CancellationToken::new()).await;
    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(recorded.items(), vec![11]);
}

#[tokio::test]
async fn test_handle_adds_source_while_running() {
    let (mut keepalive, coupled) = coupler::<u32>();
    let (sink, recorded) = RecordingSink::new();

    let mut pipeline = Pipeline::new("growing", increment());
    pipeline.add_source(coupled).add_sink(sink);
    let handle = pipeline.handle();

    let run = tokio::spawn(pipeline.run(CancellationToken::new()));

    handle.add_source(IterSource::new([1u32, 2])).unwrap();
    wait_for_items(&recorded, 2).await;
    assert!(!run.is_finished());

    keepalive.finish();
    let report = timeout(TEST_TIMEOUT, run)
        .await
        .expect("pipeline did not stop")
        .unwrap();

    assert_eq!(report.reason, StopReason::Drained);
    assert_eq!(recorded.items(), vec![2, 3]);
    assert_eq!(report.metrics.sources_exhausted, 2);
}

#[tokio::test]
async fn test_handle_fails_after_run() {
    let mut pipeline = Pipeline::new("done", increment());
    pipeline.add_source(IterSource::new([1u32]));
    let handle = pipeline.handle();

    pipeline.run(CancellationToken::new()).await;

    assert!(handle.is_closed());
    let err = handle.add_source(IterSource::new([2u32])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(handle.pipeline(), "done");
}

#[tokio::test]
async fn test_source_queued_at_stop_is_counted_as_dropped() {
    let (sink, recorded) = RecordingSink::new();
    let stop = CancellationToken::new();

    let mut pipeline = Pipeline::new("closing", Identity);
    let handle = pipeline.handle();
    let cancel = stop.clone();
    // Queue a source and stop in the same step, so the source is still in
    // the channel when the pipeline stops
    pipeline
        .set_processor(process_fn(move |n: u32| {
            let handle = handle.clone();
            let cancel = cancel.clone();
            async move {
                handle.add_source(IterSource::new([99u32]))?;
                cancel.cancel();
                Ok(n)
            }
        }))
        .add_source(ScriptSource::new([Ok(1u32)]))
        .add_sink(sink);

    let report = timeout(TEST_TIMEOUT, pipeline.run(stop))
        .await
        .expect("pipeline did not stop");

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.sources_dropped, 1);
    assert!(!recorded.items().contains(&99));
}

#[tokio::test]
async fn test_no_sources_dropped_on_clean_run() {
    let mut pipeline = Pipeline::new("clean", increment());
    pipeline.add_source(IterSource::new([1u32]));
    let report = pipeline.run(CancellationToken::new()).await;
    assert_eq!(report.sources_dropped, 0);
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_couples_two_pipelines() {
    let (sink, recorded) = RecordingSink::new();

    let mut upstream = Pipeline::new("upstream", increment());
    let mut downstream = Pipeline::new(
        "downstream",
        process_fn(|n: u32| async move { Ok(n * 10) }),
    );
    upstream.add_source(IterSource::new([1u32, 2, 3]));
    upstream.join(&mut downstream);
    downstream.add_sink(sink);

    assert_eq!(upstream.sink_count(), 1);
    assert_eq!(downstream.source_count(), 1);

    let cancel = CancellationToken::new();
    let (up, down) = timeout(
        TEST_TIMEOUT,
        async { tokio::join!(upstream.run(cancel.clone()), downstream.run(cancel.clone())) },
    )
    .await
    .expect("coupled pipelines did not stop");

    assert_eq!(up.reason, StopReason::Drained);
    assert_eq!(down.reason, StopReason::Drained);
    assert_eq!(recorded.items(), vec![20, 30, 40]);
}

//! Sink handle for pipeline communication
//!
//! Every sink registered with a pipeline is moved into its own task when the
//! pipeline starts. Source loops never touch a sink directly: they send
//! requests through a `SinkHandle`, and the sink task applies them one at a
//! time in arrival order.
//!
//! ```text
//! [source loop 1] ──┐                      ┌──→ reply (oneshot)
//! [source loop 2] ──┼──→ mpsc queue ──→ [sink task] ──→ Sink::push / Sink::close
//! [source loop N] ──┘
//! ```
//!
//! This removes any need for sinks to be internally synchronised, while
//! keeping per-source ordering: a loop waits for the reply to item `n`
//! before it sends item `n + 1`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PipelineError, Result};
use crate::ids::SinkId;
use crate::sink::Sink;

/// Request handled by a sink task
enum SinkRequest<T> {
    /// Push one item and report the outcome
    Write {
        item: Arc<T>,
        reply: oneshot::Sender<Result<usize>>,
    },
    /// Close the sink and stop the task
    Close { reply: oneshot::Sender<Result<()>> },
}

/// Pending outcome of a write enqueued with `SinkHandle::enqueue`
pub(crate) type WriteReceipt = oneshot::Receiver<Result<usize>>;

/// Handle to a running sink task
///
/// Cloning the handle is cheap; all clones feed the same queue.
pub struct SinkHandle<T> {
    /// Identifier assigned at registration
    id: SinkId,

    /// Sink name for logging
    name: Arc<str>,

    /// Request queue of the sink task
    sender: mpsc::Sender<SinkRequest<T>>,
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
        }
    }
}

impl<T> SinkHandle<T>
where
    T: Send + Sync + 'static,
{
    /// Move `sink` into a new task and return its handle
    ///
    /// `queue_size` bounds the number of requests waiting for the task.
    /// Must be called from within a tokio runtime.
    pub fn spawn(id: SinkId, sink: Box<dyn Sink<T>>, queue_size: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let name: Arc<str> = Arc::from(sink.name());

        let task = tokio::spawn(run_sink(id, sink, receiver));

        tracing::debug!(sink_id = %id, sink_name = %name, queue_size, "sink task started");

        (Self { id, name, sender }, task)
    }

    /// Queue `item` for writing without waiting for the write itself
    ///
    /// Waits only for queue capacity. The returned receipt resolves once the
    /// sink task has pushed the item.
    pub(crate) async fn enqueue(&self, item: Arc<T>) -> Result<WriteReceipt> {
        let (reply, receipt) = oneshot::channel();
        self.sender
            .send(SinkRequest::Write { item, reply })
            .await
            .map_err(|_| PipelineError::sink_closed(&self.name))?;
        Ok(receipt)
    }

    /// Push `item` and wait for the outcome
    pub async fn write(&self, item: Arc<T>) -> Result<usize> {
        let receipt = self.enqueue(item).await?;
        self.settle(receipt).await
    }

    /// Wait for the outcome of an enqueued write
    pub(crate) async fn settle(&self, receipt: WriteReceipt) -> Result<usize> {
        receipt
            .await
            .map_err(|_| PipelineError::sink_closed(&self.name))?
    }

    /// Close the sink after every previously queued write
    ///
    /// The sink task exits once the close has run, so later requests fail
    /// with a `SinkClosed` error.
    pub async fn close(&self) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(SinkRequest::Close { reply })
            .await
            .map_err(|_| PipelineError::sink_closed(&self.name))?;
        outcome
            .await
            .map_err(|_| PipelineError::sink_closed(&self.name))?
    }
}

impl<T> SinkHandle<T> {
    /// Get the sink's identifier
    #[inline]
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Get the sink's name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the sink task has stopped
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Get the current free capacity of the queue
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// Get the maximum capacity of the queue
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl<T> std::fmt::Debug for SinkHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Body of a sink task
async fn run_sink<T>(
    id: SinkId,
    mut sink: Box<dyn Sink<T>>,
    mut receiver: mpsc::Receiver<SinkRequest<T>>,
) where
    T: Send + Sync + 'static,
{
    let mut closed = false;

    while let Some(request) = receiver.recv().await {
        match request {
            SinkRequest::Write { item, reply } => {
                let outcome = sink.push(&*item).await;
                if let Err(ref e) = outcome {
                    tracing::debug!(sink_id = %id, sink_name = %sink.name(), error = %e, "sink write failed");
                }
                let _ = reply.send(outcome);
            }
            SinkRequest::Close { reply } => {
                let outcome = sink.close().await;
                closed = true;
                let _ = reply.send(outcome);
                break;
            }
        }
    }

    if !closed {
        tracing::warn!(
            sink_id = %id,
            sink_name = %sink.name(),
            "sink task stopped without being closed"
        );
    }

    tracing::debug!(sink_id = %id, sink_name = %sink.name(), "sink task stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct Journal {
        pushed: Vec<u32>,
        closes: usize,
    }

    struct JournalSink(Arc<Mutex<Journal>>);

    #[async_trait]
    impl Sink<u32> for JournalSink {
        async fn push(&mut self, item: &u32) -> Result<usize> {
            if *item == 13 {
                return Err(PipelineError::write("unlucky"));
            }
            self.0.lock().pushed.push(*item);
            Ok(4)
        }

        async fn close(&mut self) -> Result<()> {
            self.0.lock().closes += 1;
            Ok(())
        }

        fn name(&self) -> &str {
            "journal"
        }
    }

    fn spawn_journal() -> (SinkHandle<u32>, JoinHandle<()>, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let (handle, task) =
            SinkHandle::spawn(SinkId::new(2), Box::new(JournalSink(Arc::clone(&journal))), 8);
        (handle, task, journal)
    }

    #[tokio::test]
    async fn test_handle_metadata() {
        let (handle, _task, _journal) = spawn_journal();
        assert_eq!(handle.id(), SinkId::new(2));
        assert_eq!(handle.name(), "journal");
        assert_eq!(handle.max_capacity(), 8);
        assert!(!handle.is_closed());

        let debug = format!("{handle:?}");
        assert!(debug.contains("SinkHandle"));
        assert!(debug.contains("journal"));
    }

    #[tokio::test]
    async fn test_writes_apply_in_order() {
        let (handle, _task, journal) = spawn_journal();

        let mut receipts = Vec::new();
        for i in 0..5 {
            receipts.push(handle.enqueue(Arc::new(i)).await.unwrap());
        }
        for receipt in receipts {
            assert_eq!(handle.settle(receipt).await.unwrap(), 4);
        }

        assert_eq!(journal.lock().pushed, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_write_error_is_returned() {
        let (handle, _task, journal) = spawn_journal();

        let err = handle.write(Arc::new(13)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);

        // The task keeps serving after a failed write
        handle.write(Arc::new(14)).await.unwrap();
        assert_eq!(journal.lock().pushed, vec![14]);
    }

    #[tokio::test]
    async fn test_close_runs_once_and_stops_task() {
        let (handle, task, journal) = spawn_journal();

        handle.write(Arc::new(1)).await.unwrap();
        handle.close().await.unwrap();
        task.await.unwrap();

        assert_eq!(journal.lock().closes, 1);
        assert!(handle.is_closed());

        let err = handle.close().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkClosed);
        let err = handle.write(Arc::new(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkClosed);
        assert_eq!(journal.lock().closes, 1);
    }
}

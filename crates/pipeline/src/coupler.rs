//! Coupler - in-process bridge between two pipelines
//!
//! A coupler is a sink on the upstream side and a source on the downstream
//! side. There is no buffer in between: `push` hands the item over and
//! returns only once a `pull` has taken it, so the downstream pipeline's
//! pace bounds the upstream pipeline's writes.
//!
//! ```text
//! [pipeline A] ──→ CouplerSink ══ rendezvous ══→ CouplerSource ──→ [pipeline B]
//! ```
//!
//! Closing the sink side (which pipeline A does at shutdown) makes the
//! source side report end of stream, so pipeline B drains naturally.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{PipelineError, Result};
use crate::sink::Sink;
use crate::source::Source;

#[cfg(test)]
#[path = "coupler_test.rs"]
mod tests;

/// One handed-over item plus the acknowledgement the pusher waits for
struct Handoff<T> {
    item: T,
    taken: oneshot::Sender<()>,
}

/// Create a connected coupler pair
pub fn coupler<T>() -> (CouplerSink<T>, CouplerSource<T>) {
    let (sender, receiver) = mpsc::channel(1);
    (
        CouplerSink {
            sender: Some(sender),
            name: "coupler".into(),
        },
        CouplerSource {
            receiver,
            name: "coupler".into(),
        },
    )
}

/// Producer side of a coupler
pub struct CouplerSink<T> {
    /// `None` once closed
    sender: Option<mpsc::Sender<Handoff<T>>>,
    name: String,
}

impl<T> CouplerSink<T> {
    /// Set the name used in logs
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hand `item` to the consumer, waiting until it has been pulled
    ///
    /// Fails with a `SinkClosed` error after `close`, or when the consumer
    /// side has been dropped.
    pub async fn send(&self, item: T) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| PipelineError::sink_closed(&self.name))?;

        let (taken, ack) = oneshot::channel();
        sender
            .send(Handoff { item, taken })
            .await
            .map_err(|_| PipelineError::sink_closed(&self.name))?;

        ack.await.map_err(|_| PipelineError::sink_closed(&self.name))
    }

    /// Signal end of stream to the consumer
    ///
    /// Only the first call has an effect.
    pub fn finish(&mut self) -> bool {
        if self.sender.take().is_some() {
            tracing::debug!(coupler = %self.name, "coupler closed");
            true
        } else {
            false
        }
    }

    /// Whether `finish` has been called
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.sender.is_none()
    }
}

#[async_trait]
impl<T> Sink<T> for CouplerSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn push(&mut self, item: &T) -> Result<usize> {
        self.send(item.clone()).await?;
        Ok(0)
    }

    async fn close(&mut self) -> Result<()> {
        self.finish();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Consumer side of a coupler
pub struct CouplerSource<T> {
    receiver: mpsc::Receiver<Handoff<T>>,
    name: String,
}

impl<T> CouplerSource<T> {
    /// Set the name used in logs
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Wait for the next item, `None` once the producer side is closed
    pub async fn recv(&mut self) -> Option<T> {
        let handoff = self.receiver.recv().await?;
        // The pusher may have given up (cancelled); the item is still ours
        let _ = handoff.taken.send(());
        Some(handoff.item)
    }
}

#[async_trait]
impl<T> Source<T> for CouplerSource<T>
where
    T: Send + 'static,
{
    async fn pull(&mut self) -> Result<Option<T>> {
        Ok(self.recv().await)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

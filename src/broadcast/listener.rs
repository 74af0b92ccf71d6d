use super::sink::Sink;
use super::Broadcaster;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Read half of a registered connection.
///
/// Yields frames in the order they were written: the connection comment, any
/// replay, then live frames and heartbeats. Ends when the broadcaster drops
/// the sink (eviction or shutdown). Dropping the listener unsubscribes it.
pub struct Listener {
    broadcaster: Arc<Broadcaster>,
    /// Weak so that eviction closes the stream.
    sink: mpsc::WeakSender<Bytes>,
    frames: mpsc::Receiver<Bytes>,
}

impl Listener {
    pub(crate) fn new(
        broadcaster: Arc<Broadcaster>,
        sink: &Sink,
        frames: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            broadcaster,
            sink: sink.downgrade(),
            frames,
        }
    }

    /// Wait for the next frame. `None` once the sink is gone and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Next buffered frame, if any.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.frames.try_recv().ok()
    }

    /// Whether the broadcaster still holds this listener's sink.
    pub fn is_registered(&self) -> bool {
        Sink::upgrade(&self.sink).is_some()
    }
}

impl Stream for Listener {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.frames.poll_recv(cx) {
            Poll::Ready(Some(bytes)) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(sink) = Sink::upgrade(&self.sink) {
            self.broadcaster.unsubscribe(&sink);
        }
    }
}

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a frame could not be written to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The listener is not draining its buffer fast enough.
    #[error("sink buffer full")]
    Full,

    /// The listener went away.
    #[error("sink closed")]
    Closed,
}

/// Write half of one listener's connection.
///
/// Cloning a sink yields a handle to the same channel; two sinks compare
/// equal exactly when they feed the same receiver.
#[derive(Clone, Debug)]
pub struct Sink {
    tx: mpsc::Sender<Bytes>,
}

/// Create a sink and the receiver its frames arrive on.
pub fn channel(buffer: usize) -> (Sink, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (Sink { tx }, rx)
}

impl Sink {
    /// Write a frame without waiting.
    pub fn try_write(&self, frame: Bytes) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free buffer slots.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn same_channel(&self, other: &Sink) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// A handle that does not keep the channel open.
    pub(crate) fn downgrade(&self) -> mpsc::WeakSender<Bytes> {
        self.tx.downgrade()
    }

    pub(crate) fn upgrade(weak: &mpsc::WeakSender<Bytes>) -> Option<Sink> {
        weak.upgrade().map(|tx| Sink { tx })
    }
}

impl PartialEq for Sink {
    fn eq(&self, other: &Self) -> bool {
        self.same_channel(other)
    }
}

impl Eq for Sink {}

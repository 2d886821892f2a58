//! Subscriber sinks for the broadcast hub.

use std::fmt::Debug;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::codec::Payload;
use crate::error::SinkError;

/// Something that can accept encoded snapshots.
///
/// `send` must not block: a sink that cannot take a payload right now
/// returns [`SinkError::Full`] and the hub evicts it.
pub trait SnapshotSink: Send + Sync + Debug {
    /// Offer one encoded snapshot.
    fn send(&self, payload: &Payload) -> Result<(), SinkError>;

    /// Human-readable description, used in logs.
    fn description(&self) -> &str {
        "sink"
    }
}

/// A sink backed by a bounded tokio channel.
///
/// The receiving half is usually drained by a connection task that writes
/// payloads to a socket. Dropping the receiver closes the sink.
///
/// # Example
///
/// ```rust
/// use signalwatch_core::ChannelSink;
///
/// let (sink, mut rx) = ChannelSink::channel(16, "example");
///
/// // Later, receive payloads
/// // while let Some(payload) = rx.recv().await {
/// //     socket.write_all(&payload).await?;
/// // }
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Payload>,
    description: String,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Payload>, description: impl Into<String>) -> Self {
        Self {
            tx,
            description: description.into(),
        }
    }

    /// Create a sink and the receiver that drains it.
    pub fn channel(
        buffer: usize,
        description: impl Into<String>,
    ) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx, description), rx)
    }
}

impl SnapshotSink for ChannelSink {
    fn send(&self, payload: &Payload) -> Result<(), SinkError> {
        self.tx.try_send(payload.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}

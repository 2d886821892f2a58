//! Broadcast hub: fans each snapshot out to every live subscriber.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use signalwatch_types::Snapshot;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::codec::{Payload, WireFormat};
use crate::sink::{ChannelSink, SnapshotSink};

/// Identifies one registration with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one [`BroadcastHub::publish`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Subscribers that accepted the snapshot.
    pub delivered: usize,
    /// Subscribers evicted because their send failed.
    pub dropped: usize,
}

/// Live set of subscribers and best-effort delivery to all of them.
///
/// Membership changes take the write lock briefly. `publish` copies the
/// membership under the read lock and then sends without holding any lock,
/// so a slow sink never blocks `subscribe`/`unsubscribe` and a subscriber
/// that joins mid-publish simply starts with the next snapshot.
///
/// Delivery is not guaranteed: a subscriber whose send fails (full buffer
/// or closed) is removed and the failure is logged, never returned.
///
/// # Example
///
/// ```rust
/// use signalwatch_core::{BroadcastHub, Snapshot};
///
/// let hub = BroadcastHub::default();
/// let (id, mut rx) = hub.subscribe_channel(8);
///
/// let report = hub.publish(&Snapshot::builder().sequence_number(1).build());
/// assert_eq!(report.delivered, 1);
/// assert!(rx.try_recv().is_ok());
///
/// assert!(hub.unsubscribe(id));
/// assert!(!hub.unsubscribe(id));
/// ```
pub struct BroadcastHub {
    subscribers: RwLock<BTreeMap<SubscriberId, Arc<dyn SnapshotSink>>>,
    next_id: AtomicU64,
    format: WireFormat,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub that encodes snapshots with `format`.
    pub fn new(format: WireFormat) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            format,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a sink. It receives only snapshots published from now on.
    pub fn subscribe(&self, sink: impl SnapshotSink + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let description = sink.description().to_string();

        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, Arc::new(sink));
            subscribers.len()
        };

        info!(subscriber = %id, sink = %description, subscribers = count, "subscriber joined");
        id
    }

    /// Register a bounded channel and return its receiving half.
    pub fn subscribe_channel(&self, buffer: usize) -> (SubscriberId, mpsc::Receiver<Payload>) {
        let (sink, rx) = ChannelSink::channel(buffer, "channel");
        (self.subscribe(sink), rx)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            info!(subscriber = %id, "subscriber left");
        }
        removed
    }

    /// Deliver `snapshot` to every current subscriber.
    pub fn publish(&self, snapshot: &Snapshot) -> PublishReport {
        self.published.fetch_add(1, Ordering::Relaxed);

        let payload = match self.format.encode(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    sequence = snapshot.sequence_number,
                    error = %e,
                    "failed to encode snapshot"
                );
                return PublishReport::default();
            }
        };

        // Copy-on-read: sends happen outside the lock.
        let members: Vec<(SubscriberId, Arc<dyn SnapshotSink>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut failed = Vec::new();
        for (id, sink) in &members {
            match sink.send(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        subscriber = %id,
                        sink = sink.description(),
                        sequence = snapshot.sequence_number,
                        error = %e,
                        "dropping subscriber"
                    );
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write();
            report.dropped = failed
                .iter()
                .filter(|id| subscribers.remove(*id).is_some())
                .count();
        }
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);

        debug!(
            sequence = snapshot.sequence_number,
            delivered = report.delivered,
            dropped = report.dropped,
            "published snapshot"
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Total `publish` calls.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total subscribers evicted after a failed send.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(WireFormat::Json)
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("format", &self.format)
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .finish()
    }
}

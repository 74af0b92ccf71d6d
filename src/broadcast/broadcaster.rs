//! Live fan-out of new activities to connected listeners.

use super::frame;
use super::sink::Sink;
use crate::types::Activity;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default keep-alive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of live frames a listener may fall behind by.
pub const DEFAULT_SINK_BUFFER: usize = 256;

/// Broadcaster configuration.
#[derive(Clone, Debug)]
pub struct BroadcastConfig {
    /// Time between keep-alive comments.
    pub heartbeat_interval: Duration,

    /// Frames buffered per listener before it counts as too slow and is
    /// evicted.
    pub sink_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            sink_buffer: DEFAULT_SINK_BUFFER,
        }
    }
}

/// Counters since the broadcaster was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub published: u64,
    pub heartbeats: u64,
    /// Frames successfully written, summed over sinks.
    pub delivered: u64,
    pub evicted: u64,
}

/// Registry of live sinks.
///
/// Every operation takes the registry lock, so the set is never iterated
/// while being mutated and concurrent publishes are delivered one at a time.
/// Writes under the lock never block: a sink that cannot take a frame right
/// now is evicted and its listener is expected to reconnect with a cursor.
pub struct Broadcaster {
    config: BroadcastConfig,
    sinks: Mutex<Vec<Sink>>,
    /// Set by `close_all`; later subscriptions are refused.
    closed: AtomicBool,
    published: AtomicU64,
    heartbeats: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            sinks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Register a sink for future publishes and heartbeats.
    ///
    /// After `close_all` the sink is dropped instead, which ends its stream.
    pub fn subscribe(&self, sink: Sink) {
        let mut sinks = self.sinks.lock();
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("broadcaster closed; dropping new listener");
            return;
        }
        sinks.push(sink);
        tracing::debug!(listeners = sinks.len(), "listener subscribed");
    }

    /// Remove a sink. Returns false if it was not registered.
    pub fn unsubscribe(&self, sink: &Sink) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|s| !s.same_channel(sink));

        let removed = sinks.len() < before;
        if removed {
            tracing::debug!(listeners = sinks.len(), "listener unsubscribed");
        }
        removed
    }

    /// Deliver an activity to every registered sink.
    ///
    /// Never fails; sinks that cannot take the frame are dropped.
    pub fn publish(&self, activity: &Activity) {
        let frame = match frame::data(activity) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(id = %activity.id, error = %e, "failed to encode activity frame");
                return;
            }
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        self.deliver(frame);
    }

    /// Send one keep-alive comment to every registered sink.
    pub fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        let delivered = self.deliver(frame::comment(frame::HEARTBEAT));
        tracing::trace!(listeners = delivered, "heartbeat");
    }

    /// Write `frame` to every sink, evicting the ones that fail.
    /// Returns the number of sinks that took it.
    fn deliver(&self, frame: Bytes) -> usize {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();

        sinks.retain(|sink| match sink.try_write(frame.clone()) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(%reason, "evicting listener");
                false
            }
        });

        let delivered = sinks.len();
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.evicted
            .fetch_add((before - delivered) as u64, Ordering::Relaxed);
        delivered
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.published.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Drop every sink and refuse new ones. Open streams end once they
    /// drain what is buffered.
    pub fn close_all(&self) -> usize {
        let mut sinks = self.sinks.lock();
        self.closed.store(true, Ordering::Release);
        let closed = std::mem::take(&mut *sinks).len();
        drop(sinks);
        if closed > 0 {
            tracing::info!(listeners = closed, "closed all listeners");
        }
        closed
    }

    /// Whether `close_all` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run the heartbeat until `shutdown` is cancelled.
    ///
    /// The first tick fires one full interval after the call.
    pub fn spawn_heartbeat(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => broadcaster.heartbeat(),
                }
            }

            tracing::debug!("heartbeat stopped");
        })
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

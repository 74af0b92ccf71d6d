//! Replay of missed activities for reconnecting listeners.
//!
//! A listener that reconnects with the id of the last activity it saw gets
//! the gap replayed, oldest first, before it is registered for live
//! publishes. The gap is read with the store's descending scan bounded from
//! below by the cursor, so when more than one batch is missing the newest
//! batch is replayed and the replay stays contiguous with the live stream.
//!
//! An activity committed after the gap query but before registration reaches
//! neither the replay nor the live stream. The window is the duration of one
//! registry push; listeners recover it on their next reconnect.

use super::sink::{self, Sink};
use super::{frame, Broadcaster, Listener};
use crate::error::Result;
use crate::store::{ActivityStore, ScanRange};
use crate::types::{Activity, ActivityId};
use std::sync::Arc;

/// Default number of activities replayed on reconnect.
pub const DEFAULT_CATCHUP_BATCH: usize = 50;

/// Resolves a listener's cursor into the activities it missed.
#[derive(Clone)]
pub struct CatchUp {
    store: Arc<dyn ActivityStore>,
    batch_size: usize,
}

impl CatchUp {
    pub fn new(store: Arc<dyn ActivityStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Activities strictly newer than `since`, ascending, at most one batch.
    ///
    /// No cursor means no replay.
    pub fn replay(&self, since: Option<ActivityId>) -> Result<Vec<Activity>> {
        let Some(since) = since else {
            return Ok(Vec::new());
        };

        let range = ScanRange::latest(self.batch_size).after(Some(since));
        let mut missed = self.store.scan(&range)?;
        missed.reverse();
        Ok(missed)
    }

    /// Open a listener: connection comment, replay, then live registration.
    ///
    /// A failed gap query is logged and the listener is registered without a
    /// replay.
    pub async fn connect(
        &self,
        broadcaster: &Arc<Broadcaster>,
        since: Option<ActivityId>,
    ) -> Listener {
        let replay = match since {
            None => Vec::new(),
            Some(cursor) => {
                let resolver = self.clone();
                match tokio::task::spawn_blocking(move || resolver.replay(since)).await {
                    Ok(Ok(missed)) => missed,
                    Ok(Err(e)) => {
                        tracing::warn!(since = %cursor, error = %e, "catch-up query failed");
                        Vec::new()
                    }
                    Err(e) => {
                        tracing::warn!(since = %cursor, error = %e, "catch-up task failed");
                        Vec::new()
                    }
                }
            }
        };

        // Room for everything written before registration plus the live buffer.
        let capacity = 1 + replay.len() + broadcaster.config().sink_buffer;
        let (sink, frames) = sink::channel(capacity);

        write_preamble(&sink, &replay);

        let listener = Listener::new(Arc::clone(broadcaster), &sink, frames);
        broadcaster.subscribe(sink);

        tracing::debug!(
            since = ?since.map(|id| id.0),
            replayed = replay.len(),
            "listener connected"
        );
        listener
    }
}

fn write_preamble(sink: &Sink, replay: &[Activity]) {
    // The channel is sized for these, and the receiver is still held locally.
    let _ = sink.try_write(frame::comment(frame::CONNECTED));

    for activity in replay {
        match frame::data(activity) {
            Ok(data) => {
                let _ = sink.try_write(data);
            }
            Err(e) => {
                tracing::error!(id = %activity.id, error = %e, "failed to encode replay frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{BroadcastConfig, FrameDecoder};
    use crate::error::FeedError;
    use crate::store::MemoryStore;
    use crate::types::{ActivityInput, ActivityKind};

    fn store_with(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..n {
            store.append(ActivityInput::new(ActivityKind::TokenTransfer)).unwrap();
        }
        store
    }

    fn ids(activities: &[Activity]) -> Vec<u64> {
        activities.iter().map(|a| a.id.0).collect()
    }

    /// Store whose reads always fail.
    struct BrokenStore;

    impl ActivityStore for BrokenStore {
        fn append(&self, _input: ActivityInput) -> Result<Activity> {
            Err(FeedError::Unavailable("disk gone".into()))
        }

        fn scan(&self, _range: &ScanRange) -> Result<Vec<Activity>> {
            Err(FeedError::Unavailable("disk gone".into()))
        }

        fn get(&self, _id: ActivityId) -> Result<Option<Activity>> {
            Err(FeedError::Unavailable("disk gone".into()))
        }

        fn latest_id(&self) -> Option<ActivityId> {
            None
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_replay_is_ascending_and_exclusive() {
        let catch_up = CatchUp::new(store_with(5), DEFAULT_CATCHUP_BATCH);
        assert_eq!(ids(&catch_up.replay(Some(ActivityId(2))).unwrap()), vec![3, 4, 5]);
    }

    #[test]
    fn test_replay_without_cursor_is_empty() {
        let catch_up = CatchUp::new(store_with(5), DEFAULT_CATCHUP_BATCH);
        assert!(catch_up.replay(None).unwrap().is_empty());
    }

    #[test]
    fn test_replay_past_the_end_is_empty() {
        let catch_up = CatchUp::new(store_with(3), DEFAULT_CATCHUP_BATCH);
        assert!(catch_up.replay(Some(ActivityId(3))).unwrap().is_empty());
        assert!(catch_up.replay(Some(ActivityId(99))).unwrap().is_empty());

        let empty = CatchUp::new(store_with(0), DEFAULT_CATCHUP_BATCH);
        assert!(empty.replay(Some(ActivityId(0))).unwrap().is_empty());
    }

    #[test]
    fn test_replay_caps_at_newest_batch() {
        let catch_up = CatchUp::new(store_with(10), 4);
        assert_eq!(ids(&catch_up.replay(Some(ActivityId(1))).unwrap()), vec![7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_connect_writes_preamble_then_registers() {
        let broadcaster = Arc::new(Broadcaster::default());
        let catch_up = CatchUp::new(store_with(3), DEFAULT_CATCHUP_BATCH);

        let mut listener = catch_up.connect(&broadcaster, Some(ActivityId(1))).await;
        assert_eq!(broadcaster.sink_count(), 1);
        assert!(listener.is_registered());

        assert_eq!(listener.recv().await.unwrap(), frame::comment(frame::CONNECTED));

        let mut decoder = FrameDecoder::new();
        let mut replayed = Vec::new();
        while let Some(frame) = listener.try_recv() {
            replayed.extend(decoder.push_activities(&frame).unwrap());
        }
        assert_eq!(ids(&replayed), vec![2, 3]);

        drop(listener);
        assert_eq!(broadcaster.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_survives_store_failure() {
        let broadcaster = Arc::new(Broadcaster::new(BroadcastConfig::default()));
        let catch_up = CatchUp::new(Arc::new(BrokenStore), DEFAULT_CATCHUP_BATCH);

        let mut listener = catch_up.connect(&broadcaster, Some(ActivityId(10))).await;
        assert_eq!(listener.recv().await.unwrap(), frame::comment(frame::CONNECTED));
        assert!(listener.try_recv().is_none());
        assert_eq!(broadcaster.sink_count(), 1);
    }
}

//! Property tests for delivery order, catch-up and paging.

use activity_feed::broadcast::channel;
use activity_feed::{
    Activity, ActivityId, ActivityInput, ActivityKind, ActivityStore, Broadcaster, CatchUp, Feed,
    FrameDecoder, MemoryStore,
};
use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

#[derive(Clone, Debug)]
enum Op {
    Subscribe,
    Unsubscribe(usize),
    Publish,
    Heartbeat,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Subscribe),
        1 => (0usize..8).prop_map(Op::Unsubscribe),
        4 => Just(Op::Publish),
        1 => Just(Op::Heartbeat),
    ]
}

fn drain(rx: &mut Receiver<Bytes>) -> Vec<u64> {
    let mut decoder = FrameDecoder::new();
    let mut ids = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        ids.extend(decoder.push_activities(&frame).unwrap().iter().map(|a| a.id.0));
    }
    ids
}

fn activity(id: u64) -> Activity {
    Activity::from_input(
        ActivityId(id),
        ActivityInput::new(ActivityKind::TokenTransfer),
        activity_feed::types::now_millis(),
    )
}

fn populated(n: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for _ in 0..n {
        store.append(ActivityInput::new(ActivityKind::BetPlaced)).unwrap();
    }
    store
}

proptest! {
    #[test]
    fn prop_sinks_see_exactly_what_was_published_while_registered(
        ops in proptest::collection::vec(op(), 1..80)
    ) {
        let broadcaster = Broadcaster::default();
        // (sink, receiver, ids published while registered)
        let mut listeners = Vec::new();
        let mut next_id = 1u64;

        for op in ops {
            match op {
                Op::Subscribe => {
                    let (sink, rx) = channel(256);
                    broadcaster.subscribe(sink.clone());
                    listeners.push((sink, rx, Vec::new(), true));
                }
                Op::Unsubscribe(i) => {
                    if let Some((sink, _, _, registered)) = listeners.get_mut(i) {
                        broadcaster.unsubscribe(sink);
                        *registered = false;
                    }
                }
                Op::Publish => {
                    broadcaster.publish(&activity(next_id));
                    for (_, _, expected, registered) in listeners.iter_mut() {
                        if *registered {
                            expected.push(next_id);
                        }
                    }
                    next_id += 1;
                }
                Op::Heartbeat => broadcaster.heartbeat(),
            }
        }

        for (_, rx, expected, _) in listeners.iter_mut() {
            prop_assert_eq!(drain(rx), expected.clone());
        }
    }

    #[test]
    fn prop_catch_up_returns_ascending_gap(
        total in 0usize..120,
        since in 0u64..130,
        batch in 1usize..60,
    ) {
        let catch_up = CatchUp::new(populated(total), batch);
        let replay: Vec<u64> = catch_up
            .replay(Some(ActivityId(since)))
            .unwrap()
            .iter()
            .map(|a| a.id.0)
            .collect();

        let gap: Vec<u64> = ((since + 1)..=(total as u64)).collect();
        let expected = &gap[gap.len().saturating_sub(batch)..];
        prop_assert_eq!(replay.as_slice(), expected);
    }

    #[test]
    fn prop_pages_cover_history_once(total in 0usize..250, limit in 1usize..120) {
        let feed = Feed::new(populated(total), Arc::new(Broadcaster::default()), 50);
        let page_size = limit.min(100);

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = feed.page(cursor, None, Some(limit)).unwrap();
            prop_assert!(page.activities.len() <= page_size);
            if let Some(next) = page.next_cursor {
                prop_assert_eq!(Some(next), page.activities.last().map(|a| a.id));
            }
            seen.extend(page.activities.iter().map(|a| a.id.0));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let expected: Vec<u64> = (1..=total as u64).rev().collect();
        prop_assert_eq!(seen, expected);
    }
}

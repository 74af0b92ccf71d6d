//! The feed service: validated submissions and historical paging.

use crate::broadcast::{Broadcaster, CatchUp, Listener};
use crate::error::Result;
use crate::store::{ActivityStore, ScanRange};
use crate::types::{Activity, ActivityId, ActivityInput, ActivityKind, CreateActivity};
use parking_lot::Mutex;
use std::sync::Arc;

/// Page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of history, newest first.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub activities: Vec<Activity>,
    /// Pass as `cursor` to get the next (older) page. `None` on the last page.
    pub next_cursor: Option<ActivityId>,
}

/// Ties the store to the broadcaster.
///
/// Every committed activity is published exactly once, after its append
/// succeeded. Appends and publishes happen under one commit lock, so
/// listeners see activities in id order.
pub struct Feed {
    store: Arc<dyn ActivityStore>,
    broadcaster: Arc<Broadcaster>,
    catch_up: CatchUp,
    commit: Mutex<()>,
}

impl Feed {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        broadcaster: Arc<Broadcaster>,
        catchup_batch: usize,
    ) -> Self {
        let catch_up = CatchUp::new(Arc::clone(&store), catchup_batch);
        Self {
            store,
            broadcaster,
            catch_up,
            commit: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Validate a raw submission, then append and publish it.
    pub fn create(&self, raw: CreateActivity) -> Result<Activity> {
        let input = ActivityInput::try_from(raw)?;
        self.submit(input)
    }

    /// Append an activity and publish it. A failed append publishes nothing.
    pub fn submit(&self, input: ActivityInput) -> Result<Activity> {
        let _commit = self.commit.lock();

        let activity = self.store.append(input)?;
        self.broadcaster.publish(&activity);

        tracing::info!(id = %activity.id, kind = %activity.kind, "activity created");
        Ok(activity)
    }

    /// Activities strictly older than `cursor`, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_PAGE_SIZE`] and is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn page(
        &self,
        cursor: Option<ActivityId>,
        kind: Option<ActivityKind>,
        limit: Option<usize>,
    ) -> Result<Page> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        // One extra row tells us whether an older page exists.
        let range = ScanRange::latest(limit + 1).before(cursor).kind(kind);
        let mut activities = self.store.scan(&range)?;

        let next_cursor = if activities.len() > limit {
            activities.truncate(limit);
            activities.last().map(|activity| activity.id)
        } else {
            None
        };

        Ok(Page {
            activities,
            next_cursor,
        })
    }

    /// Open a live listener, replaying what it missed since `since`.
    pub async fn connect(&self, since: Option<ActivityId>) -> Listener {
        self.catch_up.connect(&self.broadcaster, since).await
    }
}

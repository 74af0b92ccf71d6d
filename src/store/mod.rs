//! Activity storage.
//!
//! Activities live in an append-only store keyed by a monotonically
//! increasing [`ActivityId`]. The only read primitive is a descending range
//! scan: "activities with `after < id < before`, optionally of one kind,
//! newest first, at most `limit`". Pagination bounds the scan from above,
//! catch-up bounds it from below.
//!
//! Two implementations are provided:
//! - [`FileStore`]: durable, checksummed log on disk
//! - [`MemoryStore`]: process-local, for tests and ephemeral runs

mod file;
mod index;
mod log;
mod memory;

pub use file::{FileStore, StoreConfig};
pub use index::ActivityIndex;
pub use log::ActivityLog;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Activity, ActivityId, ActivityInput, ActivityKind};

/// Bounds for a descending scan. Both bounds are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanRange {
    pub before: Option<ActivityId>,
    pub after: Option<ActivityId>,
    pub kind: Option<ActivityKind>,
    pub limit: usize,
}

impl ScanRange {
    /// Newest activities first, no bounds.
    pub fn latest(limit: usize) -> Self {
        Self {
            before: None,
            after: None,
            kind: None,
            limit,
        }
    }

    /// Activities strictly older than `cursor`.
    pub fn before(mut self, cursor: Option<ActivityId>) -> Self {
        self.before = cursor;
        self
    }

    /// Activities strictly newer than `since`.
    pub fn after(mut self, since: Option<ActivityId>) -> Self {
        self.after = since;
        self
    }

    pub fn kind(mut self, kind: Option<ActivityKind>) -> Self {
        self.kind = kind;
        self
    }

    /// True when no id can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        if self.limit == 0 {
            return true;
        }
        match (self.after, self.before) {
            (Some(after), Some(before)) => after.0.saturating_add(1) >= before.0,
            _ => false,
        }
    }

    /// Check whether an activity falls inside the range (ignores `limit`).
    pub fn contains(&self, activity: &Activity) -> bool {
        if let Some(before) = self.before {
            if activity.id >= before {
                return false;
            }
        }
        if let Some(after) = self.after {
            if activity.id <= after {
                return false;
            }
        }
        match self.kind {
            Some(kind) => activity.kind == kind,
            None => true,
        }
    }
}

/// Storage backend for activities.
///
/// Implementations serialize writes so that ids are strictly increasing in
/// commit order.
pub trait ActivityStore: Send + Sync {
    /// Persist an activity and return it with its assigned id.
    fn append(&self, input: ActivityInput) -> Result<Activity>;

    /// Scan activities inside `range`, newest first.
    fn scan(&self, range: &ScanRange) -> Result<Vec<Activity>>;

    /// Fetch one activity by id.
    fn get(&self, id: ActivityId) -> Result<Option<Activity>>;

    /// Highest id assigned so far.
    fn latest_id(&self) -> Option<ActivityId>;

    /// Number of stored activities.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_millis;

    fn activity(id: u64, kind: ActivityKind) -> Activity {
        Activity::from_input(ActivityId(id), ActivityInput::new(kind), now_millis())
    }

    #[test]
    fn test_range_contains_is_exclusive() {
        let range = ScanRange::latest(10)
            .after(Some(ActivityId(2)))
            .before(Some(ActivityId(5)));

        assert!(!range.contains(&activity(2, ActivityKind::BetPlaced)));
        assert!(range.contains(&activity(3, ActivityKind::BetPlaced)));
        assert!(range.contains(&activity(4, ActivityKind::BetPlaced)));
        assert!(!range.contains(&activity(5, ActivityKind::BetPlaced)));
    }

    #[test]
    fn test_range_kind_filter() {
        let range = ScanRange::latest(10).kind(Some(ActivityKind::MerchOrder));
        assert!(range.contains(&activity(1, ActivityKind::MerchOrder)));
        assert!(!range.contains(&activity(1, ActivityKind::OtcPurchase)));
    }

    #[test]
    fn test_empty_ranges() {
        assert!(ScanRange::latest(0).is_empty());
        assert!(ScanRange::latest(5)
            .after(Some(ActivityId(4)))
            .before(Some(ActivityId(5)))
            .is_empty());
        assert!(!ScanRange::latest(5)
            .after(Some(ActivityId(3)))
            .before(Some(ActivityId(5)))
            .is_empty());
    }
}

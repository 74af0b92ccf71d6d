//! In-memory indices over the activity log.
//!
//! The index is not persisted; it is rebuilt from the log on open.

use super::ScanRange;
use crate::types::{ActivityId, ActivityKind};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Index mapping activity ids to log offsets.
pub struct ActivityIndex {
    /// Activity id to offset, ordered by id.
    offsets: RwLock<BTreeMap<ActivityId, u64>>,

    /// Kind to the ids of that kind.
    by_kind: RwLock<HashMap<ActivityKind, BTreeSet<ActivityId>>>,
}

impl ActivityIndex {
    pub fn new() -> Self {
        Self {
            offsets: RwLock::new(BTreeMap::new()),
            by_kind: RwLock::new(HashMap::new()),
        }
    }

    /// Add an entry to the index.
    pub fn add(&self, id: ActivityId, kind: ActivityKind, offset: u64) {
        self.offsets.write().insert(id, offset);
        self.by_kind.write().entry(kind).or_default().insert(id);
    }

    /// Get the log offset of an activity.
    pub fn offset_of(&self, id: ActivityId) -> Option<u64> {
        self.offsets.read().get(&id).copied()
    }

    /// Ids and offsets inside `range`, newest first.
    pub fn scan(&self, range: &ScanRange) -> Vec<(ActivityId, u64)> {
        if range.is_empty() {
            return Vec::new();
        }

        let bounds = (
            range.after.map_or(Bound::Unbounded, Bound::Excluded),
            range.before.map_or(Bound::Unbounded, Bound::Excluded),
        );
        let offsets = self.offsets.read();

        match range.kind {
            None => offsets
                .range(bounds)
                .rev()
                .take(range.limit)
                .map(|(id, offset)| (*id, *offset))
                .collect(),
            Some(kind) => {
                let by_kind = self.by_kind.read();
                let Some(ids) = by_kind.get(&kind) else {
                    return Vec::new();
                };
                ids.range(bounds)
                    .rev()
                    .take(range.limit)
                    .filter_map(|id| offsets.get(id).map(|offset| (*id, *offset)))
                    .collect()
            }
        }
    }

    pub fn last_id(&self) -> Option<ActivityId> {
        self.offsets.read().keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActivityIndex {
    fn default() -> Self {
        Self::new()
    }
}

use super::{ActivityStore, ScanRange};
use crate::error::Result;
use crate::types::{now_millis, Activity, ActivityId, ActivityInput};
use parking_lot::RwLock;

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    /// Activities in id order. Ids are dense, so id N sits at index N - 1.
    activities: RwLock<Vec<Activity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityStore for MemoryStore {
    fn append(&self, input: ActivityInput) -> Result<Activity> {
        let mut activities = self.activities.write();
        let id = ActivityId(activities.len() as u64 + 1);
        let activity = Activity::from_input(id, input, now_millis());
        activities.push(activity.clone());
        Ok(activity)
    }

    fn scan(&self, range: &ScanRange) -> Result<Vec<Activity>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let activities = self.activities.read();
        Ok(activities
            .iter()
            .rev()
            .filter(|activity| range.contains(activity))
            .take(range.limit)
            .cloned()
            .collect())
    }

    fn get(&self, id: ActivityId) -> Result<Option<Activity>> {
        let index = match usize::try_from(id.0) {
            Ok(0) | Err(_) => return Ok(None),
            Ok(n) => n - 1,
        };
        Ok(self.activities.read().get(index).cloned())
    }

    fn latest_id(&self) -> Option<ActivityId> {
        self.activities.read().last().map(|activity| activity.id)
    }

    fn len(&self) -> usize {
        self.activities.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityKind;

    #[test]
    fn test_ids_are_dense_and_increasing() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.latest_id(), None);

        for expected in 1..=3 {
            let activity = store.append(ActivityInput::new(ActivityKind::GameStarted)).unwrap();
            assert_eq!(activity.id, ActivityId(expected));
        }

        assert_eq!(store.latest_id(), Some(ActivityId(3)));
        assert_eq!(store.get(ActivityId(2)).unwrap().unwrap().id, ActivityId(2));
        assert!(store.get(ActivityId(0)).unwrap().is_none());
        assert!(store.get(ActivityId(4)).unwrap().is_none());
    }

    #[test]
    fn test_scan_matches_range() {
        let store = MemoryStore::new();
        for i in 0..6 {
            let kind = if i % 3 == 0 {
                ActivityKind::MerchOrder
            } else {
                ActivityKind::BetPlaced
            };
            store.append(ActivityInput::new(kind)).unwrap();
        }

        let page = store
            .scan(&ScanRange::latest(10).kind(Some(ActivityKind::MerchOrder)))
            .unwrap();
        let ids: Vec<u64> = page.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![4, 1]);

        let newer = store
            .scan(&ScanRange::latest(2).after(Some(ActivityId(2))))
            .unwrap();
        let ids: Vec<u64> = newer.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![6, 5]);
    }
}

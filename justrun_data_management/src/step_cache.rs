use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{local_store::KeyValueStore, DataManagerError};

pub const DAILY_STEPS_KEY: &str = "dailySteps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySteps {
    pub date: NaiveDate,
    pub steps: u64,
}

/// Today's motion-counted steps, kept locally and reset when the day changes.
pub struct DailyStepCache<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> DailyStepCache<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// Steps recorded for `today`. A stale or unreadable entry is replaced by
    /// a fresh zero count.
    pub fn load(&mut self, today: NaiveDate) -> Result<DailySteps, DataManagerError> {
        let cached = self
            .store
            .get(DAILY_STEPS_KEY)?
            .and_then(|raw| serde_json::from_str::<DailySteps>(&raw).ok());

        match cached {
            Some(entry) if entry.date == today => Ok(entry),
            _ => {
                let fresh = DailySteps { date: today, steps: 0 };
                self.write(&fresh)?;
                Ok(fresh)
            }
        }
    }

    pub fn add_steps(&mut self, today: NaiveDate, steps: u64) -> Result<DailySteps, DataManagerError> {
        let mut entry = self.load(today)?;
        entry.steps = entry.steps.saturating_add(steps);
        self.write(&entry)?;
        Ok(entry)
    }

    fn write(&mut self, entry: &DailySteps) -> Result<(), DataManagerError> {
        let json = serde_json::to_string(entry)
            .map_err(|err| DataManagerError::Serialization(format!("Failed to serialize daily steps: {}", err)))?;
        self.store.set(DAILY_STEPS_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::MemoryStore;

    fn day(date: &str) -> NaiveDate {
        date.parse().unwrap()
    }

    #[test]
    fn accumulates_within_a_day() {
        let mut cache = DailyStepCache::new(MemoryStore::new());
        cache.add_steps(day("2024-05-10"), 120).unwrap();
        let entry = cache.add_steps(day("2024-05-10"), 30).unwrap();
        assert_eq!(entry.steps, 150);
        assert_eq!(cache.load(day("2024-05-10")).unwrap().steps, 150);
    }

    #[test]
    fn huge_step_counts_saturate() {
        let mut cache = DailyStepCache::new(MemoryStore::new());
        cache.add_steps(day("2024-05-10"), 10).unwrap();
        let entry = cache.add_steps(day("2024-05-10"), u64::MAX).unwrap();
        assert_eq!(entry.steps, u64::MAX);
    }

    #[test]
    fn resets_on_new_day() {
        let mut cache = DailyStepCache::new(MemoryStore::new());
        cache.add_steps(day("2024-05-10"), 500).unwrap();
        assert_eq!(cache.load(day("2024-05-11")).unwrap(), DailySteps { date: day("2024-05-11"), steps: 0 });
    }

    #[test]
    fn garbage_entry_is_replaced() {
        let mut store = MemoryStore::new();
        store.set(DAILY_STEPS_KEY, "garbage").unwrap();
        let mut cache = DailyStepCache::new(store);
        assert_eq!(cache.load(day("2024-05-10")).unwrap().steps, 0);
    }
}

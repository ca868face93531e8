use crate::store::memory::InMemoryStore;
use crate::store::{
    QueueEntry, QueueStatus, ServiceAccumulators, ServiceSwap, Station, StationStatus, Store,
    StoreError, Versioned,
};
use std::sync::RwLock;
use std::time::Duration;
use time::OffsetDateTime;

/// Faults injected by [`MockStore`] on top of an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MockStoreBehavior {
    /// Arrival counts for these stations fail with `Unavailable`.
    pub fail_counts_for: Vec<String>,
    /// Arrival counts for these stations panic.
    pub panic_counts_for: Vec<String>,
    /// Every accumulator swap reports a conflict.
    pub reject_service_swaps: bool,
    /// Entry reads sleep this long before answering.
    pub entry_read_delay: Option<Duration>,
}

impl MockStoreBehavior {
    pub fn fail_counts_for(station_id: &str) -> Self {
        Self {
            fail_counts_for: vec![station_id.to_string()],
            ..Self::default()
        }
    }

    pub fn panic_counts_for(station_id: &str) -> Self {
        Self {
            panic_counts_for: vec![station_id.to_string()],
            ..Self::default()
        }
    }

    pub fn reject_service_swaps() -> Self {
        Self {
            reject_service_swaps: true,
            ..Self::default()
        }
    }

    pub fn slow_entry_reads(delay: Duration) -> Self {
        Self {
            entry_read_delay: Some(delay),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct MockStore {
    inner: InMemoryStore,
    behavior: RwLock<MockStoreBehavior>,
}

impl MockStore {
    pub fn new(behavior: MockStoreBehavior) -> Self {
        Self {
            inner: InMemoryStore::new(),
            behavior: RwLock::new(behavior),
        }
    }

    /// Swap the injected faults; stored data is kept.
    pub fn set_behavior(&self, behavior: MockStoreBehavior) -> Result<(), StoreError> {
        let mut current = self.behavior.write().map_err(|_| StoreError::LockPoisoned)?;
        *current = behavior;
        Ok(())
    }

    fn behavior(&self) -> Result<MockStoreBehavior, StoreError> {
        self.behavior
            .read()
            .map(|behavior| behavior.clone())
            .map_err(|_| StoreError::LockPoisoned)
    }
}

impl Store for MockStore {
    fn insert_entry(&self, entry: QueueEntry) -> Result<(), StoreError> {
        self.inner.insert_entry(entry)
    }

    fn entry(&self, id: &str) -> Result<Option<QueueEntry>, StoreError> {
        if let Some(delay) = self.behavior()?.entry_read_delay {
            std::thread::sleep(delay);
        }
        self.inner.entry(id)
    }

    fn compare_and_swap_entry(
        &self,
        expected: QueueStatus,
        next: QueueEntry,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_swap_entry(expected, next)
    }

    fn station_entries(&self, station_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        self.inner.station_entries(station_id)
    }

    fn count_arrivals(
        &self,
        station_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let behavior = self.behavior()?;
        if behavior.panic_counts_for.iter().any(|id| id == station_id) {
            panic!("mock count panicked for {station_id}");
        }
        if behavior.fail_counts_for.iter().any(|id| id == station_id) {
            return Err(StoreError::Unavailable(format!(
                "mock count failed for {station_id}"
            )));
        }
        self.inner.count_arrivals(station_id, from, to)
    }

    fn stations_with_status(&self, status: StationStatus) -> Result<Vec<Station>, StoreError> {
        self.inner.stations_with_status(status)
    }

    fn station(&self, id: &str) -> Result<Option<Versioned<Station>>, StoreError> {
        self.inner.station(id)
    }

    fn compare_and_swap_service(
        &self,
        station_id: &str,
        expected_version: Option<u64>,
        sample_id: &str,
        next: ServiceAccumulators,
    ) -> Result<ServiceSwap, StoreError> {
        if self.behavior()?.reject_service_swaps {
            return Ok(ServiceSwap::Conflict);
        }
        self.inner
            .compare_and_swap_service(station_id, expected_version, sample_id, next)
    }

    fn upsert_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> Result<Station, StoreError> {
        self.inner.upsert_station_status(station_id, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn count_failure_is_scoped_to_station() {
        let store = MockStore::new(MockStoreBehavior::fail_counts_for("st-2"));
        let from = datetime!(2026-01-08 00:00 UTC);
        let to = datetime!(2026-01-15 00:00 UTC);

        assert!(matches!(store.count_arrivals("st-1", from, to), Ok(0)));

        let err = store.count_arrivals("st-2", from, to).unwrap_err();
        assert_eq!(err.to_string(), "storage unavailable: mock count failed for st-2");
    }

    #[test]
    fn service_swaps_can_be_rejected() -> Result<(), StoreError> {
        let store = MockStore::new(MockStoreBehavior::reject_service_swaps());

        let swap =
            store.compare_and_swap_service("st-1", None, "e-1", ServiceAccumulators::default())?;

        assert_eq!(swap, ServiceSwap::Conflict);
        assert!(store.station("st-1")?.is_none());
        Ok(())
    }

    #[test]
    fn behavior_can_change_after_construction() -> Result<(), StoreError> {
        let store = MockStore::new(MockStoreBehavior::reject_service_swaps());
        let next = ServiceAccumulators::default().with_sample(2.0);
        assert_eq!(
            store.compare_and_swap_service("st-1", None, "e-1", next)?,
            ServiceSwap::Conflict
        );

        store.set_behavior(MockStoreBehavior::default())?;

        assert_eq!(
            store.compare_and_swap_service("st-1", None, "e-1", next)?,
            ServiceSwap::Committed
        );
        Ok(())
    }
}

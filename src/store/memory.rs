use crate::store::{
    EntryId, QueueEntry, QueueStatus, ServiceAccumulators, ServiceSwap, Station, StationId,
    StationStatus, Store, StoreError, Versioned,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use time::OffsetDateTime;

/// A station plus the ids of every sample already folded into it. Both change
/// under the same lock.
#[derive(Debug)]
struct StationRecord {
    station: Versioned<Station>,
    recorded_samples: HashSet<EntryId>,
}

type StationCell = Arc<Mutex<StationRecord>>;

#[derive(Debug, Default)]
struct StationRegistry {
    order: Vec<StationCell>,
    index: HashMap<StationId, StationCell>,
}

impl StationRegistry {
    fn insert(&mut self, station: Station, recorded_samples: HashSet<EntryId>) {
        let id = station.id.clone();
        let cell = Arc::new(Mutex::new(StationRecord {
            station: Versioned {
                value: station,
                version: 1,
            },
            recorded_samples,
        }));
        self.order.push(Arc::clone(&cell));
        self.index.insert(id, cell);
    }
}

/// Process-local [`Store`]. Each station sits behind its own lock, so
/// accumulator updates for different stations never wait on each other; the
/// registry lock is only held exclusively while a station is being created.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    stations: RwLock<StationRegistry>,
    entries: RwLock<HashMap<EntryId, QueueEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn station_cell(&self, station_id: &str) -> Result<Option<StationCell>, StoreError> {
        let registry = self.stations.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(registry.index.get(station_id).cloned())
    }
}

fn set_status(cell: &StationCell, status: StationStatus) -> Result<Station, StoreError> {
    let mut guard = cell.lock().map_err(|_| StoreError::LockPoisoned)?;
    guard.station.value.status = status;
    guard.station.version += 1;
    Ok(guard.station.value.clone())
}

impl Store for InMemoryStore {
    fn insert_entry(&self, entry: QueueEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        if entries.contains_key(&entry.id) {
            return Err(StoreError::DuplicateEntry(entry.id));
        }
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn entry(&self, id: &str) -> Result<Option<QueueEntry>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(id).cloned())
    }

    fn compare_and_swap_entry(
        &self,
        expected: QueueStatus,
        next: QueueEntry,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        match entries.get_mut(&next.id) {
            Some(current) if current.status == expected => {
                *current = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn station_entries(&self, station_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut matching: Vec<QueueEntry> = entries
            .values()
            .filter(|entry| entry.station_id == station_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    fn count_arrivals(
        &self,
        station_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let count = entries
            .values()
            .filter(|entry| {
                entry.station_id == station_id && entry.created_at >= from && entry.created_at <= to
            })
            .count();
        Ok(count as u64)
    }

    fn stations_with_status(&self, status: StationStatus) -> Result<Vec<Station>, StoreError> {
        let registry = self.stations.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut stations = Vec::new();
        for cell in &registry.order {
            let guard = cell.lock().map_err(|_| StoreError::LockPoisoned)?;
            if guard.station.value.status == status {
                stations.push(guard.station.value.clone());
            }
        }
        Ok(stations)
    }

    fn station(&self, id: &str) -> Result<Option<Versioned<Station>>, StoreError> {
        match self.station_cell(id)? {
            Some(cell) => {
                let guard = cell.lock().map_err(|_| StoreError::LockPoisoned)?;
                Ok(Some(guard.station.clone()))
            }
            None => Ok(None),
        }
    }

    fn compare_and_swap_service(
        &self,
        station_id: &str,
        expected_version: Option<u64>,
        sample_id: &str,
        next: ServiceAccumulators,
    ) -> Result<ServiceSwap, StoreError> {
        let Some(expected_version) = expected_version else {
            let mut registry = self.stations.write().map_err(|_| StoreError::LockPoisoned)?;
            if registry.index.contains_key(station_id) {
                return Ok(ServiceSwap::Conflict);
            }
            let mut station = Station::new(station_id, StationStatus::Inactive);
            station.service = next;
            registry.insert(station, HashSet::from([sample_id.to_string()]));
            return Ok(ServiceSwap::Committed);
        };

        let Some(cell) = self.station_cell(station_id)? else {
            return Ok(ServiceSwap::Conflict);
        };
        let mut guard = cell.lock().map_err(|_| StoreError::LockPoisoned)?;
        if guard.recorded_samples.contains(sample_id) {
            return Ok(ServiceSwap::AlreadyRecorded);
        }
        if guard.station.version != expected_version {
            return Ok(ServiceSwap::Conflict);
        }
        guard.station.value.service = next;
        guard.station.version += 1;
        guard.recorded_samples.insert(sample_id.to_string());
        Ok(ServiceSwap::Committed)
    }

    fn upsert_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> Result<Station, StoreError> {
        if let Some(cell) = self.station_cell(station_id)? {
            return set_status(&cell, status);
        }

        let mut registry = self.stations.write().map_err(|_| StoreError::LockPoisoned)?;
        // Another writer may have created it between the two lock acquisitions.
        if let Some(cell) = registry.index.get(station_id).cloned() {
            drop(registry);
            return set_status(&cell, status);
        }
        let station = Station::new(station_id, status);
        registry.insert(station.clone(), HashSet::new());
        Ok(station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(id: &str, station_id: &str, created_at: OffsetDateTime) -> QueueEntry {
        QueueEntry {
            id: id.to_string(),
            carrier_id: "carrier-1".to_string(),
            station_id: station_id.to_string(),
            slot_key: "12:00".to_string(),
            status: QueueStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            sample_recorded: false,
        }
    }

    #[test]
    fn duplicate_entry_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.insert_entry(entry("e-1", "st-1", datetime!(2026-01-15 12:00 UTC)))?;

        let result = store.insert_entry(entry("e-1", "st-1", datetime!(2026-01-15 12:00 UTC)));

        assert!(matches!(result, Err(StoreError::DuplicateEntry(id)) if id == "e-1"));
        Ok(())
    }

    #[test]
    fn entry_swap_requires_expected_status() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        let original = entry("e-1", "st-1", datetime!(2026-01-15 12:00 UTC));
        store.insert_entry(original.clone())?;

        let mut started = original.clone();
        started.status = QueueStatus::InProgress;

        assert!(!store.compare_and_swap_entry(QueueStatus::InProgress, started.clone())?);
        assert!(store.compare_and_swap_entry(QueueStatus::Queued, started.clone())?);
        assert!(!store.compare_and_swap_entry(QueueStatus::Queued, started)?);
        assert_eq!(
            store.entry("e-1")?.map(|e| e.status),
            Some(QueueStatus::InProgress)
        );
        Ok(())
    }

    #[test]
    fn arrivals_window_is_inclusive_and_per_station() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.insert_entry(entry("e-1", "st-1", datetime!(2026-01-08 12:00 UTC)))?;
        store.insert_entry(entry("e-2", "st-1", datetime!(2026-01-10 08:30 UTC)))?;
        store.insert_entry(entry("e-3", "st-1", datetime!(2026-01-15 12:00 UTC)))?;
        store.insert_entry(entry("e-4", "st-1", datetime!(2026-01-15 12:01 UTC)))?;
        store.insert_entry(entry("e-5", "st-2", datetime!(2026-01-12 12:00 UTC)))?;

        let count = store.count_arrivals(
            "st-1",
            datetime!(2026-01-08 12:00 UTC),
            datetime!(2026-01-15 12:00 UTC),
        )?;

        assert_eq!(count, 3);
        Ok(())
    }

    #[test]
    fn station_entries_are_ordered_by_creation() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.insert_entry(entry("late", "st-1", datetime!(2026-01-15 12:10 UTC)))?;
        store.insert_entry(entry("early", "st-1", datetime!(2026-01-15 12:00 UTC)))?;
        store.insert_entry(entry("other", "st-2", datetime!(2026-01-15 11:00 UTC)))?;

        let ids: Vec<String> = store
            .station_entries("st-1")?
            .into_iter()
            .map(|e| e.id)
            .collect();

        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
        Ok(())
    }

    #[test]
    fn service_swap_rejects_stale_version() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.upsert_station_status("st-1", StationStatus::Active)?;
        let read = store.station("st-1")?.ok_or("station missing")?;
        let next = read.value.service.with_sample(5.0);

        assert_eq!(
            store.compare_and_swap_service("st-1", Some(read.version), "e-1", next)?,
            ServiceSwap::Committed
        );
        assert_eq!(
            store.compare_and_swap_service("st-1", Some(read.version), "e-2", next)?,
            ServiceSwap::Conflict
        );

        let stored = store.station("st-1")?.ok_or("station missing")?;
        assert_eq!(stored.value.service.completed_jobs_count, 1);
        assert_eq!(stored.version, read.version + 1);
        Ok(())
    }

    #[test]
    fn service_swap_creates_missing_station_as_inactive() -> Result<(), Box<dyn std::error::Error>>
    {
        let store = InMemoryStore::new();
        let next = ServiceAccumulators::default().with_sample(3.0);

        assert_eq!(
            store.compare_and_swap_service("st-9", None, "e-1", next)?,
            ServiceSwap::Committed
        );
        assert_eq!(
            store.compare_and_swap_service("st-9", None, "e-2", next)?,
            ServiceSwap::Conflict
        );

        let stored = store.station("st-9")?.ok_or("station missing")?;
        assert_eq!(stored.value.status, StationStatus::Inactive);
        assert_eq!(stored.value.service, next);
        Ok(())
    }

    #[test]
    fn sample_is_folded_in_at_most_once() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.upsert_station_status("st-1", StationStatus::Active)?;
        let read = store.station("st-1")?.ok_or("station missing")?;
        let next = read.value.service.with_sample(5.0);
        store.compare_and_swap_service("st-1", Some(read.version), "e-1", next)?;

        let current = store.station("st-1")?.ok_or("station missing")?;
        let again = current.value.service.with_sample(5.0);

        assert_eq!(
            store.compare_and_swap_service("st-1", Some(current.version), "e-1", again)?,
            ServiceSwap::AlreadyRecorded
        );
        let stored = store.station("st-1")?.ok_or("station missing")?;
        assert_eq!(stored.value.service.completed_jobs_count, 1);
        assert_eq!(stored.version, current.version);
        Ok(())
    }

    #[test]
    fn status_change_keeps_accumulators() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        let next = ServiceAccumulators::default().with_sample(6.0);
        store.compare_and_swap_service("st-1", None, "e-1", next)?;

        let station = store.upsert_station_status("st-1", StationStatus::Maintenance)?;

        assert_eq!(station.status, StationStatus::Maintenance);
        assert_eq!(station.service, next);
        Ok(())
    }

    #[test]
    fn stations_keep_registration_order() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryStore::new();
        store.upsert_station_status("st-b", StationStatus::Active)?;
        store.upsert_station_status("st-a", StationStatus::Inactive)?;
        store.upsert_station_status("st-c", StationStatus::Active)?;

        let ids: Vec<String> = store
            .stations_with_status(StationStatus::Active)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(ids, vec!["st-b".to_string(), "st-c".to_string()]);
        Ok(())
    }
}

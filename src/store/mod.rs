//! Persisted records and the storage abstraction they live behind.
//!
//! Station accumulators are only ever changed through
//! [`Store::compare_and_swap_service`], so every writer must have observed the
//! version it replaces.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;

pub mod memory;
pub mod mock;

pub type StationId = String;
pub type EntryId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Active,
    Inactive,
    Maintenance,
}

impl StationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Maintenance => "maintenance",
        }
    }
}

impl FromStr for StationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(format!("unknown station status: {other}")),
        }
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running service-time totals for one station.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServiceAccumulators {
    pub total_service_time_min: f64,
    pub completed_jobs_count: u64,
    pub average_service_time_min: f64,
}

impl ServiceAccumulators {
    /// Fold one positive sample into the totals.
    pub fn with_sample(self, service_time_min: f64) -> Self {
        let total_service_time_min = self.total_service_time_min + service_time_min;
        let completed_jobs_count = self.completed_jobs_count + 1;
        Self {
            total_service_time_min,
            completed_jobs_count,
            average_service_time_min: total_service_time_min / completed_jobs_count as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub status: StationStatus,
    pub service: ServiceAccumulators,
}

impl Station {
    pub fn new(id: impl Into<StationId>, status: StationStatus) -> Self {
        Self {
            id: id.into(),
            status,
            service: ServiceAccumulators::default(),
        }
    }
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    InProgress,
    Completed,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
        }
    }

    /// Entries still waiting for or occupying the station.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: EntryId,
    pub carrier_id: String,
    pub station_id: StationId,
    pub slot_key: String,
    pub status: QueueStatus,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    /// Set once the visit's service time is part of the station accumulators
    /// (or was discarded as unusable).
    pub sample_recorded: bool,
}

/// Outcome of [`Store::compare_and_swap_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSwap {
    Committed,
    /// The station changed since it was read; nothing was written.
    Conflict,
    /// The sample was folded in by an earlier swap; nothing was written.
    AlreadyRecorded,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage lock poisoned")]
    LockPoisoned,
    #[error("queue entry already exists: {0}")]
    DuplicateEntry(EntryId),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait Store: Send + Sync + fmt::Debug {
    fn insert_entry(&self, entry: QueueEntry) -> Result<(), StoreError>;

    fn entry(&self, id: &str) -> Result<Option<QueueEntry>, StoreError>;

    /// Replace an entry only if its stored status still equals `expected`.
    /// Returns `false` when another writer moved it first or it is absent.
    fn compare_and_swap_entry(
        &self,
        expected: QueueStatus,
        next: QueueEntry,
    ) -> Result<bool, StoreError>;

    fn station_entries(&self, station_id: &str) -> Result<Vec<QueueEntry>, StoreError>;

    /// Entries for `station_id` created within `[from, to]`.
    fn count_arrivals(
        &self,
        station_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    /// Stations with the given status, in registration order.
    fn stations_with_status(&self, status: StationStatus) -> Result<Vec<Station>, StoreError>;

    fn station(&self, id: &str) -> Result<Option<Versioned<Station>>, StoreError>;

    /// Write accumulators only if the station is still at `expected_version`
    /// (`None` meaning the station does not exist yet) and `sample_id` has not
    /// been recorded before. The sample id is stored atomically with the new
    /// accumulators. A missing station is created as inactive.
    fn compare_and_swap_service(
        &self,
        station_id: &str,
        expected_version: Option<u64>,
        sample_id: &str,
        next: ServiceAccumulators,
    ) -> Result<ServiceSwap, StoreError>;

    /// Create the station or change its status, leaving accumulators intact.
    fn upsert_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> Result<Station, StoreError>;
}

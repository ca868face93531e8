//! Queue admission: the Queued -> InProgress -> Completed lifecycle of one
//! carrier's visit to one station.
//!
//! Every move is checked against [`TRANSITIONS`] and committed with a
//! compare-and-swap on the entry's current status, so two deliveries of the
//! same request can never both apply it.

use crate::aggregator::ServiceTimeAggregator;
use crate::error::AppError;
use crate::slot::{SlotWindow, slot_id_from_start};
use crate::store::{EntryId, QueueEntry, QueueStatus, Store};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Legal forward moves. Anything else, apart from re-applying the move that
/// already happened, is rejected.
pub const TRANSITIONS: [(QueueStatus, QueueStatus); 2] = [
    (QueueStatus::Queued, QueueStatus::InProgress),
    (QueueStatus::InProgress, QueueStatus::Completed),
];

// Entry swaps only fail when another writer moved the entry, after which the
// table resolves to a no-op or a rejection.
const ENTRY_SWAP_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    Apply,
    AlreadyApplied,
    Reject,
}

pub fn decide(from: QueueStatus, to: QueueStatus) -> TransitionDecision {
    if TRANSITIONS.contains(&(from, to)) {
        TransitionDecision::Apply
    } else if from == to {
        TransitionDecision::AlreadyApplied
    } else {
        TransitionDecision::Reject
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Duplicate delivery; nothing changed.
    AlreadyApplied,
}

#[derive(Debug, Clone)]
pub struct QueueAdmission {
    store: Arc<dyn Store>,
    aggregator: ServiceTimeAggregator,
}

impl QueueAdmission {
    pub fn new(store: Arc<dyn Store>, aggregator: ServiceTimeAggregator) -> Self {
        Self { store, aggregator }
    }

    pub fn enter_queue(
        &self,
        carrier_id: &str,
        station_id: &str,
        slot_start: &str,
        slot_end: &str,
    ) -> Result<EntryId, AppError> {
        self.enter_queue_at(
            carrier_id,
            station_id,
            slot_start,
            slot_end,
            OffsetDateTime::now_utc(),
        )
    }

    pub fn enter_queue_at(
        &self,
        carrier_id: &str,
        station_id: &str,
        slot_start: &str,
        slot_end: &str,
        now: OffsetDateTime,
    ) -> Result<EntryId, AppError> {
        if [carrier_id, station_id, slot_start, slot_end]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(AppError::Validation("All fields required".to_string()));
        }
        let window = SlotWindow::parse(slot_start, slot_end)?;
        let slot_id = slot_id_from_start(window.slot_start_date);

        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            carrier_id: carrier_id.to_string(),
            station_id: station_id.to_string(),
            slot_key: window.slot_key,
            status: QueueStatus::Queued,
            created_at: now,
            started_at: None,
            completed_at: None,
            sample_recorded: false,
        };
        let id = entry.id.clone();
        info!(
            entry_id = %id,
            carrier_id,
            station_id,
            slot_id = %slot_id,
            "Carrier entered queue"
        );
        self.store.insert_entry(entry)?;
        Ok(id)
    }

    pub fn start_service(&self, entry_id: &str) -> Result<TransitionOutcome, AppError> {
        self.start_service_at(entry_id, OffsetDateTime::now_utc())
    }

    pub fn start_service_at(
        &self,
        entry_id: &str,
        now: OffsetDateTime,
    ) -> Result<TransitionOutcome, AppError> {
        for _ in 0..ENTRY_SWAP_ATTEMPTS {
            let entry = self.load(entry_id)?;
            match decide(entry.status, QueueStatus::InProgress) {
                TransitionDecision::AlreadyApplied => return Ok(TransitionOutcome::AlreadyApplied),
                TransitionDecision::Reject => {
                    return Err(invalid_transition(&entry, QueueStatus::InProgress));
                }
                TransitionDecision::Apply => {}
            }

            let mut next = entry.clone();
            next.status = QueueStatus::InProgress;
            next.started_at = Some(now.max(entry.created_at));
            if self.store.compare_and_swap_entry(entry.status, next)? {
                info!(entry_id, station_id = %entry.station_id, "Service started");
                return Ok(TransitionOutcome::Applied);
            }
        }
        Err(entry_contention(entry_id))
    }

    pub fn complete_service(&self, entry_id: &str) -> Result<TransitionOutcome, AppError> {
        self.complete_service_at(entry_id, OffsetDateTime::now_utc())
    }

    /// Complete the visit, then fold its duration into the station average.
    ///
    /// The entry is committed first and flagged `sample_recorded` once the
    /// station accumulators hold the sample. Completing an entry whose sample
    /// is still pending retries the aggregation; samples are keyed by entry id
    /// in the store, so racing retries count the visit once.
    pub fn complete_service_at(
        &self,
        entry_id: &str,
        now: OffsetDateTime,
    ) -> Result<TransitionOutcome, AppError> {
        for _ in 0..ENTRY_SWAP_ATTEMPTS {
            let entry = self.load(entry_id)?;
            match decide(entry.status, QueueStatus::Completed) {
                TransitionDecision::AlreadyApplied => {
                    if !entry.sample_recorded {
                        info!(entry_id, "Retrying pending service time sample");
                        self.record_sample(&entry)?;
                    }
                    return Ok(TransitionOutcome::AlreadyApplied);
                }
                TransitionDecision::Reject => {
                    return Err(invalid_transition(&entry, QueueStatus::Completed));
                }
                TransitionDecision::Apply => {}
            }

            let floor = entry.started_at.unwrap_or(entry.created_at);
            let mut next = entry.clone();
            next.status = QueueStatus::Completed;
            next.completed_at = Some(now.max(floor));
            if !self.store.compare_and_swap_entry(entry.status, next.clone())? {
                continue;
            }
            info!(entry_id, station_id = %entry.station_id, "Service completed");

            self.record_sample(&next)?;
            return Ok(TransitionOutcome::Applied);
        }
        Err(entry_contention(entry_id))
    }

    /// Entries still queued or in service at a station, oldest first.
    pub fn station_queue(&self, station_id: &str) -> Result<Vec<QueueEntry>, AppError> {
        let entries = self.store.station_entries(station_id)?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.status.is_active())
            .collect())
    }

    fn record_sample(&self, entry: &QueueEntry) -> Result<(), AppError> {
        let (Some(started_at), Some(completed_at)) = (entry.started_at, entry.completed_at) else {
            warn!(entry_id = %entry.id, "Completed entry has no start time, skipping aggregation");
            return self.mark_sample_recorded(entry);
        };
        if let Err(err) =
            self.aggregator
                .record_completion(&entry.station_id, &entry.id, started_at, completed_at)
        {
            error!(
                entry_id = %entry.id,
                station_id = %entry.station_id,
                error = %err,
                "Service time aggregation failed, sample left pending"
            );
            return Err(err);
        }
        self.mark_sample_recorded(entry)
    }

    fn mark_sample_recorded(&self, entry: &QueueEntry) -> Result<(), AppError> {
        let mut next = entry.clone();
        next.sample_recorded = true;
        // Racing callers write the same flag; losing the swap is fine.
        self.store.compare_and_swap_entry(QueueStatus::Completed, next)?;
        Ok(())
    }

    fn load(&self, entry_id: &str) -> Result<QueueEntry, AppError> {
        self.store
            .entry(entry_id)?
            .ok_or_else(|| AppError::NotFound {
                kind: "queue entry",
                id: entry_id.to_string(),
            })
    }
}

fn invalid_transition(entry: &QueueEntry, to: QueueStatus) -> AppError {
    AppError::InvalidTransition {
        id: entry.id.clone(),
        from: entry.status.as_str(),
        to: to.as_str(),
    }
}

fn entry_contention(entry_id: &str) -> AppError {
    AppError::TransientStorage {
        key: entry_id.to_string(),
        attempts: ENTRY_SWAP_ATTEMPTS,
    }
}

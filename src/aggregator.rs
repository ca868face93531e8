//! Running-average service time per station.

use crate::error::AppError;
use crate::slot::minutes_between;
use crate::store::{ServiceAccumulators, ServiceSwap, Store};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationOutcome {
    Recorded(ServiceAccumulators),
    /// Non-positive or non-finite duration; nothing was written.
    Discarded,
    /// An earlier attempt already folded this sample in.
    AlreadyRecorded,
}

#[derive(Debug, Clone)]
pub struct ServiceTimeAggregator {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl ServiceTimeAggregator {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fold one completed visit into the station's accumulators.
    ///
    /// The read-modify-write is an optimistic compare-and-swap on the station
    /// version, retried up to `max_attempts` times before giving up with
    /// [`AppError::TransientStorage`]. A failed attempt writes nothing.
    /// `sample_id` makes the call safe to repeat: a sample the store has
    /// already recorded is reported as [`AggregationOutcome::AlreadyRecorded`].
    pub fn record_completion(
        &self,
        station_id: &str,
        sample_id: &str,
        started_at: OffsetDateTime,
        completed_at: OffsetDateTime,
    ) -> Result<AggregationOutcome, AppError> {
        let service_time_min = minutes_between(started_at, completed_at);
        if !service_time_min.is_finite() || service_time_min <= 0.0 {
            debug!(station_id, service_time_min, "Discarding non-positive service time sample");
            return Ok(AggregationOutcome::Discarded);
        }

        for attempt in 1..=self.max_attempts {
            let current = self.store.station(station_id)?;
            let (prior, expected_version) = match &current {
                Some(read) => (read.value.service, Some(read.version)),
                None => (ServiceAccumulators::default(), None),
            };
            let next = prior.with_sample(service_time_min);

            match self
                .store
                .compare_and_swap_service(station_id, expected_version, sample_id, next)?
            {
                ServiceSwap::Committed => {
                    info!(
                        station_id,
                        sample_id,
                        service_time_min,
                        completed_jobs = next.completed_jobs_count,
                        average_service_time_min = next.average_service_time_min,
                        "Station service time updated"
                    );
                    return Ok(AggregationOutcome::Recorded(next));
                }
                ServiceSwap::AlreadyRecorded => {
                    debug!(station_id, sample_id, "Service time sample already recorded");
                    return Ok(AggregationOutcome::AlreadyRecorded);
                }
                ServiceSwap::Conflict => {}
            }

            debug!(station_id, attempt, "Station accumulator conflict, retrying");
            std::thread::yield_now();
        }

        warn!(
            station_id,
            attempts = self.max_attempts,
            "Station accumulator update did not commit"
        );
        Err(AppError::TransientStorage {
            key: station_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

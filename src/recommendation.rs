//! Station ranking by predicted M/M/1 queueing delay.
//!
//! Arrival rate: λ = arrivals in the trailing window / (window_days × slot_interval_min).
//! The denominator has no minutes-per-day factor.

use crate::error::AppError;
use crate::estimation::mm1::{WaitTimeEstimate, mm1_wait_time, service_rate_from_average};
use crate::slot::SlotWindow;
use crate::store::{Station, StationId, StationStatus, Store};
use std::sync::Arc;
use std::thread;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_SLOT_INTERVAL_MIN: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationSettings {
    pub history_window_days: u32,
    pub slot_interval_min: u32,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            history_window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            slot_interval_min: DEFAULT_SLOT_INTERVAL_MIN,
        }
    }
}

impl RecommendationSettings {
    /// Zero values would make λ undefined and are rejected.
    pub fn new(history_window_days: u32, slot_interval_min: u32) -> Result<Self, AppError> {
        if history_window_days == 0 || slot_interval_min == 0 {
            return Err(AppError::Validation(
                "history window and slot interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            history_window_days,
            slot_interval_min,
        })
    }

    pub fn arrival_rate(&self, arrivals: u64) -> f64 {
        arrivals as f64 / (f64::from(self.history_window_days) * f64::from(self.slot_interval_min))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationMetrics {
    pub station_id: StationId,
    pub lambda: f64,
    pub mu: f64,
    pub rho: f64,
    pub approximated_waiting_time: f64,
}

impl StationMetrics {
    fn from_estimate(
        station_id: StationId,
        lambda: f64,
        mu: f64,
        estimate: WaitTimeEstimate,
    ) -> Self {
        Self {
            station_id,
            lambda,
            mu,
            rho: estimate.utilization,
            approximated_waiting_time: estimate.ranking_wait_min(),
        }
    }

    /// Placeholder for a station whose demand could not be read.
    fn degraded(station: &Station) -> Self {
        Self {
            station_id: station.id.clone(),
            lambda: f64::NAN,
            mu: service_rate_from_average(station.service.average_service_time_min),
            rho: f64::INFINITY,
            approximated_waiting_time: f64::INFINITY,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.approximated_waiting_time.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub slot: SlotWindow,
    /// Ascending by `approximated_waiting_time`; ties keep station order.
    pub stations: Vec<StationMetrics>,
    pub best_station_id: Option<StationId>,
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    store: Arc<dyn Store>,
    settings: RecommendationSettings,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn Store>, settings: RecommendationSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> RecommendationSettings {
        self.settings
    }

    pub fn recommend(&self, slot_start: &str, slot_end: &str) -> Result<Recommendation, AppError> {
        self.recommend_with(slot_start, slot_end, self.settings)
    }

    /// Rank active stations for the slot. Reads only.
    pub fn recommend_with(
        &self,
        slot_start: &str,
        slot_end: &str,
        settings: RecommendationSettings,
    ) -> Result<Recommendation, AppError> {
        let slot = SlotWindow::parse(slot_start, slot_end)?;
        let stations = self.store.stations_with_status(StationStatus::Active)?;
        let history_end = slot.slot_start_date;
        let history_start = history_end - Duration::days(i64::from(settings.history_window_days));

        let mut ranked = thread::scope(|scope| {
            let handles: Vec<_> = stations
                .iter()
                .map(|station| {
                    scope.spawn(move || {
                        self.station_metrics(station, history_start, history_end, settings)
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(&stations)
                .map(|(handle, station)| match handle.join() {
                    Ok(Ok(metrics)) => metrics,
                    Ok(Err(err)) => {
                        warn!(
                            station_id = %station.id,
                            error = %err,
                            "Station metrics unavailable, ranking as unstable"
                        );
                        StationMetrics::degraded(station)
                    }
                    Err(_) => {
                        warn!(
                            station_id = %station.id,
                            "Station metrics task panicked, ranking as unstable"
                        );
                        StationMetrics::degraded(station)
                    }
                })
                .collect::<Vec<_>>()
        });

        // Stable sort: equal waits (including +∞) keep station order.
        ranked.sort_by(|a, b| {
            a.approximated_waiting_time
                .total_cmp(&b.approximated_waiting_time)
        });
        let best_station_id = ranked.first().map(|metrics| metrics.station_id.clone());

        Ok(Recommendation {
            slot,
            stations: ranked,
            best_station_id,
        })
    }

    fn station_metrics(
        &self,
        station: &Station,
        history_start: OffsetDateTime,
        history_end: OffsetDateTime,
        settings: RecommendationSettings,
    ) -> Result<StationMetrics, AppError> {
        let mu = service_rate_from_average(station.service.average_service_time_min);
        let arrivals = self
            .store
            .count_arrivals(&station.id, history_start, history_end)?;
        let lambda = settings.arrival_rate(arrivals);
        let estimate = mm1_wait_time(lambda, mu);
        debug!(
            station_id = %station.id,
            arrivals,
            lambda,
            mu,
            rho = estimate.utilization,
            stable = estimate.stable,
            "Station metrics computed"
        );
        Ok(StationMetrics::from_estimate(
            station.id.clone(),
            lambda,
            mu,
            estimate,
        ))
    }
}

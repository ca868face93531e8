use crate::aggregator::{DEFAULT_MAX_TRANSACTION_ATTEMPTS, ServiceTimeAggregator};
use crate::error::AppError;
use crate::queue::QueueAdmission;
use crate::recommendation::{RecommendationEngine, RecommendationSettings};
use crate::store::{Station, StationStatus, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub recommendation: RecommendationSettings,
    pub max_transaction_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            recommendation: RecommendationSettings::default(),
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Everything the request handlers share. All fields are handles onto the
/// store, so the state itself is immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    admission: QueueAdmission,
    recommendations: RecommendationEngine,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: ServiceSettings) -> Self {
        let aggregator =
            ServiceTimeAggregator::new(Arc::clone(&store), settings.max_transaction_attempts);
        Self {
            admission: QueueAdmission::new(Arc::clone(&store), aggregator),
            recommendations: RecommendationEngine::new(
                Arc::clone(&store),
                settings.recommendation,
            ),
            store,
            request_timeout: settings.request_timeout,
        }
    }

    pub fn admission(&self) -> &QueueAdmission {
        &self.admission
    }

    pub fn recommendations(&self) -> &RecommendationEngine {
        &self.recommendations
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Register a station or change its status. Accumulators are untouched.
    pub fn set_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> Result<Station, AppError> {
        if station_id.trim().is_empty() {
            return Err(AppError::Validation("stationId is required".to_string()));
        }
        let station = self.store.upsert_station_status(station_id, status)?;
        info!(station_id, status = %status, "Station status set");
        Ok(station)
    }

    pub fn station(&self, station_id: &str) -> Result<Station, AppError> {
        self.store
            .station(station_id)?
            .map(|read| read.value)
            .ok_or_else(|| AppError::NotFound {
                kind: "station",
                id: station_id.to_string(),
            })
    }
}

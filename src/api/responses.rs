use crate::recommendation::{Recommendation, StationMetrics};
use crate::store::{QueueEntry, Station};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.format(&Rfc3339)
}

fn format_optional(
    timestamp: Option<OffsetDateTime>,
) -> Result<Option<String>, time::error::Format> {
    timestamp.map(format_timestamp).transpose()
}

// Requests. Fields are optional so a missing value reaches the handler and is
// answered with the documented 400 body instead of an extractor rejection.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterQueueRequest {
    pub carrier_id: Option<String>,
    pub station_id: Option<String>,
    pub slot_start: Option<String>,
    pub slot_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntryRequest {
    pub queue_entry_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub start_slot_iso: Option<String>,
    pub end_slot_iso: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatusRequest {
    pub status: Option<String>,
}

// Responses

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_entry_id: Option<String>,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            queue_entry_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Non-finite rates and waits serialize as `null`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMetricsResponse {
    pub station_id: String,
    pub lambda: f64,
    pub mu: f64,
    pub rho: f64,
    pub approximated_waiting_time: f64,
}

impl From<StationMetrics> for StationMetricsResponse {
    fn from(metrics: StationMetrics) -> Self {
        Self {
            station_id: metrics.station_id,
            lambda: metrics.lambda,
            mu: metrics.mu,
            rho: metrics.rho,
            approximated_waiting_time: metrics.approximated_waiting_time,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub slot_start_date: String,
    pub slot_end_date: String,
    pub slot_key: String,
    pub stations: Vec<StationMetricsResponse>,
    pub best_station_id: Option<String>,
}

impl RecommendationResponse {
    pub fn from_recommendation(
        recommendation: Recommendation,
    ) -> Result<Self, time::error::Format> {
        Ok(Self {
            slot_start_date: format_timestamp(recommendation.slot.slot_start_date)?,
            slot_end_date: format_timestamp(recommendation.slot.slot_end_date)?,
            slot_key: recommendation.slot.slot_key,
            stations: recommendation
                .stations
                .into_iter()
                .map(StationMetricsResponse::from)
                .collect(),
            best_station_id: recommendation.best_station_id,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationResponse {
    pub station_id: String,
    pub status: String,
    pub average_service_time_min: f64,
    pub total_service_time_min: f64,
    pub completed_jobs_count: u64,
}

impl From<Station> for StationResponse {
    fn from(station: Station) -> Self {
        Self {
            station_id: station.id,
            status: station.status.as_str().to_string(),
            average_service_time_min: station.service.average_service_time_min,
            total_service_time_min: station.service.total_service_time_min,
            completed_jobs_count: station.service.completed_jobs_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntryResponse {
    pub queue_entry_id: String,
    pub carrier_id: String,
    pub station_id: String,
    pub slot_key: String,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl QueueEntryResponse {
    pub fn from_entry(entry: QueueEntry) -> Result<Self, time::error::Format> {
        Ok(Self {
            created_at: format_timestamp(entry.created_at)?,
            started_at: format_optional(entry.started_at)?,
            completed_at: format_optional(entry.completed_at)?,
            queue_entry_id: entry.id,
            carrier_id: entry.carrier_id,
            station_id: entry.station_id,
            slot_key: entry.slot_key,
            status: entry.status.as_str().to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationQueueResponse {
    pub station_id: String,
    pub entries: Vec<QueueEntryResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotWindow;
    use crate::store::{QueueStatus, ServiceAccumulators, StationStatus};
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn message_response_omits_entry_id_when_none() {
        let value = serde_json::to_value(MessageResponse::new("Service started"))
            .expect("serialize message response");
        assert_eq!(value, json!({ "message": "Service started" }));
    }

    #[test]
    fn message_response_includes_entry_id_when_present() {
        let response = MessageResponse {
            message: "Entered queue".to_string(),
            queue_entry_id: Some("abc".to_string()),
        };
        let value = serde_json::to_value(response).expect("serialize message response");
        assert_eq!(
            value,
            json!({ "message": "Entered queue", "queueEntryId": "abc" })
        );
    }

    #[test]
    fn enter_queue_request_tolerates_missing_fields() {
        let request: EnterQueueRequest =
            serde_json::from_value(json!({ "carrierId": "c-1", "slotStart": "x" }))
                .expect("deserialize partial request");
        assert_eq!(request.carrier_id.as_deref(), Some("c-1"));
        assert_eq!(request.station_id, None);
        assert_eq!(request.slot_start.as_deref(), Some("x"));
    }

    #[test]
    fn recommendation_serializes_infinity_as_null() {
        let recommendation = Recommendation {
            slot: SlotWindow {
                slot_start_date: datetime!(2026-01-15 12:00 UTC),
                slot_end_date: datetime!(2026-01-15 12:15 UTC),
                slot_key: "12:00".to_string(),
            },
            stations: vec![
                StationMetrics {
                    station_id: "st-1".to_string(),
                    lambda: 0.05,
                    mu: 0.1,
                    rho: 0.5,
                    approximated_waiting_time: 10.0,
                },
                StationMetrics {
                    station_id: "st-2".to_string(),
                    lambda: 0.0,
                    mu: 0.0,
                    rho: f64::INFINITY,
                    approximated_waiting_time: f64::INFINITY,
                },
            ],
            best_station_id: Some("st-1".to_string()),
        };

        let response = RecommendationResponse::from_recommendation(recommendation)
            .expect("format recommendation");
        let value = serde_json::to_value(response).expect("serialize recommendation");

        assert_eq!(
            value,
            json!({
                "slotStartDate": "2026-01-15T12:00:00Z",
                "slotEndDate": "2026-01-15T12:15:00Z",
                "slotKey": "12:00",
                "stations": [
                    {
                        "stationId": "st-1",
                        "lambda": 0.05,
                        "mu": 0.1,
                        "rho": 0.5,
                        "approximatedWaitingTime": 10.0
                    },
                    {
                        "stationId": "st-2",
                        "lambda": 0.0,
                        "mu": 0.0,
                        "rho": null,
                        "approximatedWaitingTime": null
                    }
                ],
                "bestStationId": "st-1"
            })
        );
    }

    #[test]
    fn empty_recommendation_has_null_best_station() {
        let response = RecommendationResponse {
            slot_start_date: "2026-01-15T12:00:00Z".to_string(),
            slot_end_date: "2026-01-15T12:15:00Z".to_string(),
            slot_key: "12:00".to_string(),
            stations: Vec::new(),
            best_station_id: None,
        };
        let value = serde_json::to_value(response).expect("serialize recommendation");
        assert_eq!(value["bestStationId"], serde_json::Value::Null);
        assert_eq!(value["stations"], json!([]));
    }

    #[test]
    fn station_response_uses_persisted_field_names() {
        let station = Station {
            id: "st-1".to_string(),
            status: StationStatus::Maintenance,
            service: ServiceAccumulators {
                total_service_time_min: 30.0,
                completed_jobs_count: 3,
                average_service_time_min: 10.0,
            },
        };
        let value =
            serde_json::to_value(StationResponse::from(station)).expect("serialize station");
        assert_eq!(
            value,
            json!({
                "stationId": "st-1",
                "status": "maintenance",
                "averageServiceTimeMin": 10.0,
                "totalServiceTimeMin": 30.0,
                "completedJobsCount": 3
            })
        );
    }

    #[test]
    fn queue_entry_response_skips_unset_times() {
        let entry = QueueEntry {
            id: "e-1".to_string(),
            carrier_id: "c-1".to_string(),
            station_id: "st-1".to_string(),
            slot_key: "12:45".to_string(),
            status: QueueStatus::Queued,
            created_at: datetime!(2026-01-15 12:30 UTC),
            started_at: None,
            completed_at: None,
            sample_recorded: false,
        };
        let response = QueueEntryResponse::from_entry(entry).expect("format entry");
        let value = serde_json::to_value(response).expect("serialize entry");
        assert_eq!(
            value,
            json!({
                "queueEntryId": "e-1",
                "carrierId": "c-1",
                "stationId": "st-1",
                "slotKey": "12:45",
                "status": "Queued",
                "createdAt": "2026-01-15T12:30:00Z"
            })
        );
    }

    #[test]
    fn health_response_serializes_lowercase_status() {
        let response = HealthResponse {
            status: HealthStatus::Ok,
            timestamp: "2026-01-15T12:30:00Z".to_string(),
        };
        let value = serde_json::to_value(response).expect("serialize health");
        assert_eq!(
            value,
            json!({ "status": "ok", "timestamp": "2026-01-15T12:30:00Z" })
        );
    }
}

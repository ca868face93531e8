use crate::api::responses::{
    EnterQueueRequest, ErrorResponse, HealthResponse, HealthStatus, MessageResponse,
    QueueEntryRequest, QueueEntryResponse, RecommendationRequest, RecommendationResponse,
    StationQueueResponse, StationResponse, StationStatusRequest, format_timestamp,
};
use crate::error::AppError;
use crate::queue::TransitionOutcome;
use crate::slot::parse_timestamp;
use crate::state::AppState;
use crate::store::{QueueEntry, StationStatus};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const INVALID_SLOT_MESSAGE: &str = "Invalid slotStart/slotEnd format";

pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

fn bad_request<T>(message: &str) -> ApiResponse<T> {
    ApiResponse::Error {
        status: StatusCode::BAD_REQUEST,
        body: ErrorResponse {
            error: message.to_string(),
        },
    }
}

fn internal_error<T>(endpoint: &str, message: &str) -> ApiResponse<T> {
    error!(endpoint, message, "Internal error while handling request");
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
        },
    }
}

/// Map a core error onto the wire. Server-side failures are logged and
/// answered with a generic body.
fn error_response<T>(endpoint: &str, err: AppError) -> ApiResponse<T> {
    let (status, message) = match &err {
        AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        AppError::InvalidTimestamp(_) => {
            (StatusCode::BAD_REQUEST, INVALID_SLOT_MESSAGE.to_string())
        }
        AppError::NotFound { kind, .. } => (StatusCode::NOT_FOUND, not_found_message(kind)),
        AppError::InvalidTransition { from, to, .. } => (
            StatusCode::CONFLICT,
            format!("Invalid transition from {from} to {to}"),
        ),
        AppError::TransientStorage { .. } | AppError::Storage(_) | AppError::Internal(_) => {
            return internal_error(endpoint, &err.to_string());
        }
    };
    warn!(endpoint, error = %err, "Request rejected");
    ApiResponse::Error {
        status,
        body: ErrorResponse { error: message },
    }
}

fn not_found_message(kind: &str) -> String {
    match kind {
        "queue entry" => "Queue entry not found".to_string(),
        "station" => "Station not found".to_string(),
        _ => "Not found".to_string(),
    }
}

/// Run a synchronous core operation off the async workers, bounded by the
/// configured request deadline.
async fn run_blocking<T, F>(
    state: &AppState,
    endpoint: &'static str,
    operation: F,
) -> ApiResponse<T>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(operation);
    match tokio::time::timeout(state.request_timeout(), task).await {
        Ok(Ok(Ok(value))) => ApiResponse::Success(value),
        Ok(Ok(Err(err))) => error_response(endpoint, err),
        Ok(Err(join_err)) => internal_error(endpoint, &join_err.to_string()),
        Err(_) => internal_error(endpoint, "request deadline exceeded"),
    }
}

/// Unwrap a JSON body. A body that does not deserialize is logged and
/// treated like a missing one, so clients only ever see the documented 400.
fn json_body<T>(endpoint: &str, payload: Result<Json<T>, JsonRejection>) -> Option<T> {
    match payload {
        Ok(Json(request)) => Some(request),
        Err(rejection) => {
            warn!(endpoint, error = %rejection.body_text(), "Malformed request body");
            None
        }
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub async fn get_health() -> ApiResponse<HealthResponse> {
    build_health_response(OffsetDateTime::now_utc())
}

fn build_health_response(now: OffsetDateTime) -> ApiResponse<HealthResponse> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(HealthResponse {
            status: HealthStatus::Ok,
            timestamp,
        }),
        Err(_) => internal_error("/api/health", "timestamp formatting failure"),
    }
}

pub async fn enter_queue(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EnterQueueRequest>, JsonRejection>,
) -> ApiResponse<MessageResponse> {
    let Some(request) = json_body("/api/enterQueue", payload) else {
        return bad_request("All fields required");
    };
    let (Some(carrier_id), Some(station_id), Some(slot_start), Some(slot_end)) = (
        required(request.carrier_id),
        required(request.station_id),
        required(request.slot_start),
        required(request.slot_end),
    ) else {
        return bad_request("All fields required");
    };

    let shared = Arc::clone(&state);
    run_blocking(&state, "/api/enterQueue", move || {
        let admission = shared.admission();
        let id = admission.enter_queue(&carrier_id, &station_id, &slot_start, &slot_end)?;
        Ok(MessageResponse {
            message: "Entered queue".to_string(),
            queue_entry_id: Some(id),
        })
    })
    .await
}

pub async fn start_service(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueueEntryRequest>, JsonRejection>,
) -> ApiResponse<MessageResponse> {
    let endpoint = "/api/startService";
    let Some(entry_id) = json_body(endpoint, payload).and_then(|r| required(r.queue_entry_id))
    else {
        return bad_request("queueEntryId is required");
    };

    let shared = Arc::clone(&state);
    run_blocking(&state, endpoint, move || {
        let message = match shared.admission().start_service(&entry_id)? {
            TransitionOutcome::Applied => "Service started",
            TransitionOutcome::AlreadyApplied => "Service already started",
        };
        Ok(MessageResponse::new(message))
    })
    .await
}

pub async fn complete_service(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueueEntryRequest>, JsonRejection>,
) -> ApiResponse<MessageResponse> {
    let endpoint = "/api/completeService";
    let Some(entry_id) = json_body(endpoint, payload).and_then(|r| required(r.queue_entry_id))
    else {
        return bad_request("queueEntryId is required");
    };

    let shared = Arc::clone(&state);
    run_blocking(&state, endpoint, move || {
        let message = match shared.admission().complete_service(&entry_id)? {
            TransitionOutcome::Applied => "Service completed",
            TransitionOutcome::AlreadyApplied => "Service already completed",
        };
        Ok(MessageResponse::new(message))
    })
    .await
}

pub async fn get_stations_mm1_for_slot_start(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> ApiResponse<RecommendationResponse> {
    let endpoint = "/api/getStationsMM1ForSlotStart";
    let Some(request) = json_body(endpoint, payload) else {
        return bad_request("slotStart is required");
    };
    let Some(slot_start) = required(request.start_slot_iso) else {
        return bad_request("slotStart is required");
    };
    let slot_end = match required(request.end_slot_iso) {
        Some(slot_end) => slot_end,
        None => match default_slot_end(&state, &slot_start) {
            Ok(slot_end) => slot_end,
            Err(response) => return response,
        },
    };

    let shared = Arc::clone(&state);
    run_blocking(&state, endpoint, move || {
        let recommendation = shared.recommendations().recommend(&slot_start, &slot_end)?;
        RecommendationResponse::from_recommendation(recommendation)
            .map_err(|err| AppError::Internal(format!("slot cannot be formatted: {err}")))
    })
    .await
}

/// A missing end defaults to one slot interval after the start.
fn default_slot_end<T>(state: &AppState, slot_start: &str) -> Result<String, ApiResponse<T>> {
    let start = parse_timestamp(slot_start).map_err(|_| bad_request(INVALID_SLOT_MESSAGE))?;
    let interval = state.recommendations().settings().slot_interval_min;
    let end = start + time::Duration::minutes(i64::from(interval));
    format_timestamp(end).map_err(|_| bad_request(INVALID_SLOT_MESSAGE))
}

pub async fn put_station(
    State(state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
    payload: Result<Json<StationStatusRequest>, JsonRejection>,
) -> ApiResponse<StationResponse> {
    let Some(raw_status) = json_body("/api/stations", payload).and_then(|r| required(r.status))
    else {
        return bad_request("status is required");
    };
    let status: StationStatus = match raw_status.parse() {
        Ok(status) => status,
        Err(message) => return bad_request(&message),
    };

    let shared = Arc::clone(&state);
    run_blocking(&state, "/api/stations", move || {
        shared
            .set_station_status(&station_id, status)
            .map(StationResponse::from)
    })
    .await
}

pub async fn get_station_queue(
    State(state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
) -> ApiResponse<StationQueueResponse> {
    let shared = Arc::clone(&state);
    run_blocking(&state, "/api/stations/queue", move || {
        let entries = shared.admission().station_queue(&station_id)?;
        build_station_queue(station_id, entries, OffsetDateTime::now_utc())
    })
    .await
}

fn build_station_queue(
    station_id: String,
    entries: Vec<QueueEntry>,
    now: OffsetDateTime,
) -> Result<StationQueueResponse, AppError> {
    let format_error = |err: time::error::Format| {
        AppError::Internal(format!("timestamp cannot be formatted: {err}"))
    };
    let entries = entries
        .into_iter()
        .map(QueueEntryResponse::from_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(format_error)?;
    Ok(StationQueueResponse {
        station_id,
        entries,
        timestamp: format_timestamp(now).map_err(format_error)?,
    })
}

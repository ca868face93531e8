use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/enterQueue", post(handlers::enter_queue))
        .route("/api/startService", post(handlers::start_service))
        .route("/api/completeService", post(handlers::complete_service))
        .route(
            "/api/getStationsMM1ForSlotStart",
            post(handlers::get_stations_mm1_for_slot_start),
        )
        .route("/api/stations/{station_id}", put(handlers::put_station))
        .route(
            "/api/stations/{station_id}/queue",
            get(handlers::get_station_queue),
        )
        .with_state(state)
}

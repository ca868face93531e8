use station_flow::store::Store;
use station_flow::store::memory::InMemoryStore;
use station_flow::{api, config, state};
use std::net::SocketAddr;
use std::sync::Arc;

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "station-flow starting"
    );

    let settings = config.service_settings()?;
    tracing::info!(
        history_window_days = settings.recommendation.history_window_days,
        slot_interval_min = settings.recommendation.slot_interval_min,
        max_transaction_attempts = settings.max_transaction_attempts,
        request_timeout_ms = settings.request_timeout.as_millis(),
        "Service settings loaded"
    );

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let state = Arc::new(state::AppState::new(store, settings));

    let seeds = config.station_seeds()?;
    if seeds.is_empty() {
        tracing::warn!("No stations configured in [[stations]]");
    }
    for (station_id, status) in seeds {
        state.set_station_status(&station_id, status)?;
    }

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::gbfs::Fetcher;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router<F: Fetcher + 'static>(state: AppState<F>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/summary", get(summary::<F>))
        .route("/api/stations", get(stations::<F>))
        .route("/api/snapshots", get(snapshots::<F>))
        .route("/api/refresh", post(refresh::<F>))
        .route("/api/poll/start", post(start_poll::<F>))
        .route("/api/poll/stop", post(stop_poll::<F>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Aggregate counters, phase and error.
async fn summary<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Json<SummaryResponse> {
    let pulse = state.poller.state().await;
    let polling = state.poller.is_running().await;
    Json(SummaryResponse::from_state(&pulse, polling))
}

/// Current enriched stations.
async fn stations<F: Fetcher + 'static>(
    State(state): State<AppState<F>>,
) -> Json<StationsResponse> {
    let stations = state.poller.stations().await;
    Json(StationsResponse {
        count: stations.len(),
        stations: stations.iter().map(StationDto::from).collect(),
    })
}

/// Snapshot history with peaks.
async fn snapshots<F: Fetcher + 'static>(
    State(state): State<AppState<F>>,
) -> Json<SnapshotsResponse> {
    let pulse = state.poller.state().await;
    Json(SnapshotsResponse::from(&pulse.history))
}

/// Run a foreground refresh now and return the resulting summary.
async fn refresh<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Response {
    let result = state.poller.refresh_now().await;
    let pulse = state.poller.state().await;
    let polling = state.poller.is_running().await;

    match result {
        Ok(_) => Json(SummaryResponse::from_state(&pulse, polling)).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Start the background poll loop.
async fn start_poll<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Json<PollResponse> {
    let changed = state.poller.start().await;
    Json(PollResponse {
        running: true,
        changed,
    })
}

/// Stop the background poll loop.
async fn stop_poll<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Json<PollResponse> {
    let changed = state.poller.stop().await;
    Json(PollResponse {
        running: false,
        changed,
    })
}

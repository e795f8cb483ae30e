//! Response types for the HTTP API.

use serde::Serialize;

use crate::feed::FeedSources;
use crate::history::SnapshotHistory;
use crate::poller::{Phase, PulseState};
use crate::reconcile::{EnrichedStation, Metric, Metrics, MetricsSnapshot, SystemTotals};

/// `GET /api/summary`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub phase: Phase,
    pub is_loading: bool,
    pub error: Option<String>,
    pub blocking_error: bool,
    pub last_update: Option<i64>,
    pub totals: SystemTotals,
    /// Metrics of the newest snapshot.
    pub latest: Option<Metrics>,
    pub sources: Option<FeedSources>,
    /// Whether either feed was served from stale cache or the built-in data.
    pub degraded: bool,
    pub polling: bool,
    pub snapshot_count: usize,
}

impl SummaryResponse {
    pub fn from_state(state: &PulseState, polling: bool) -> Self {
        Self {
            phase: state.phase,
            is_loading: state.is_loading,
            error: state.error.clone(),
            blocking_error: state.blocking_error,
            last_update: state.last_update,
            totals: state.totals,
            latest: state.history.latest().map(|s| s.metrics),
            sources: state.sources,
            degraded: state
                .sources
                .is_some_and(|s| s.information.is_degraded() || s.status.is_degraded()),
            polling,
            snapshot_count: state.history.len(),
        }
    }
}

/// One station in `GET /api/stations`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDto {
    #[serde(flatten)]
    pub station: EnrichedStation,
    pub is_active: bool,
    pub fill_ratio: Option<f64>,
}

impl From<&EnrichedStation> for StationDto {
    fn from(station: &EnrichedStation) -> Self {
        Self {
            is_active: station.is_active(),
            fill_ratio: station.fill_ratio(),
            station: station.clone(),
        }
    }
}

/// `GET /api/stations`
#[derive(Debug, Serialize)]
pub struct StationsResponse {
    pub count: usize,
    pub stations: Vec<StationDto>,
}

/// Peak values over the retained history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeaksDto {
    pub total_bikes: Option<u64>,
    pub utilization: Option<f64>,
    pub active_stations: Option<usize>,
}

/// Percentage change against the next-older snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesDto {
    pub total_bikes: Option<f64>,
    pub utilization: Option<f64>,
}

/// One entry in `GET /api/snapshots`.
#[derive(Debug, Serialize)]
pub struct SnapshotDto {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    pub changes: ChangesDto,
}

/// `GET /api/snapshots`
#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub capacity: usize,
    pub count: usize,
    pub peaks: PeaksDto,
    /// Newest first.
    pub snapshots: Vec<SnapshotDto>,
}

impl From<&SnapshotHistory> for SnapshotsResponse {
    fn from(history: &SnapshotHistory) -> Self {
        Self {
            capacity: history.capacity(),
            count: history.len(),
            peaks: PeaksDto {
                total_bikes: history.peak_total_bikes(),
                utilization: history.peak_utilization(),
                active_stations: history.peak_active_stations(),
            },
            snapshots: history
                .iter()
                .enumerate()
                .map(|(index, snapshot)| SnapshotDto {
                    snapshot: snapshot.clone(),
                    changes: ChangesDto {
                        total_bikes: history.change(index, Metric::TotalBikes),
                        utilization: history.change(index, Metric::Utilization),
                    },
                })
                .collect(),
        }
    }
}

/// `POST /api/poll/start` and `POST /api/poll/stop`
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub running: bool,
    /// Whether the call changed the poll state.
    pub changed: bool,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

//! Joining the two feeds and deriving system-wide metrics.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::gbfs::{StationInfo, StationStatus};

/// Number of status records kept in each snapshot's trend sample.
pub const SAMPLE_SIZE: usize = 50;

/// A station's metadata joined with its live status, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedStation {
    #[serde(flatten)]
    pub info: StationInfo,
    /// `None` when the status feed has no record for this station.
    pub status: Option<StationStatus>,
}

impl EnrichedStation {
    pub fn station_id(&self) -> &str {
        &self.info.station_id
    }

    pub fn bikes_available(&self) -> u32 {
        self.status.as_ref().map_or(0, |s| s.num_bikes_available)
    }

    pub fn docks_available(&self) -> u32 {
        self.status.as_ref().map_or(0, |s| s.num_docks_available)
    }

    /// Stations without status are never active.
    pub fn is_active(&self) -> bool {
        self.status.as_ref().is_some_and(StationStatus::is_active)
    }

    /// Share of the station's capacity occupied by available bikes.
    ///
    /// `None` without status or when capacity is unknown (zero).
    pub fn fill_ratio(&self) -> Option<f64> {
        let status = self.status.as_ref()?;
        if self.info.capacity == 0 {
            return None;
        }
        Some((f64::from(status.num_bikes_available) / f64::from(self.info.capacity)).min(1.0))
    }
}

/// Left-join metadata with status on `station_id`.
///
/// Metadata order is preserved. Status records with no matching metadata
/// are dropped; if a status ID repeats, the first record wins.
pub fn join(stations: &[StationInfo], status: &[StationStatus]) -> Vec<EnrichedStation> {
    let mut by_id: HashMap<&str, &StationStatus> = HashMap::with_capacity(status.len());
    for record in status {
        match by_id.entry(record.station_id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(_) => {
                warn!(station_id = %record.station_id, "duplicate status record ignored");
            }
        }
    }

    stations
        .iter()
        .map(|info| EnrichedStation {
            info: info.clone(),
            status: by_id.get(info.station_id.as_str()).map(|s| (*s).clone()),
        })
        .collect()
}

/// System-wide aggregate metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_stations: usize,
    pub active_stations: usize,
    pub total_bikes: u64,
    pub total_docks: u64,
    /// Percentage of bike-plus-dock slots holding an available bike.
    #[serde(deserialize_with = "utilization_or_zero")]
    pub utilization: f64,
}

/// A metric that can be read off a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TotalStations,
    ActiveStations,
    TotalBikes,
    TotalDocks,
    Utilization,
}

impl Metrics {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalStations => self.total_stations as f64,
            Metric::ActiveStations => self.active_stations as f64,
            Metric::TotalBikes => self.total_bikes as f64,
            Metric::TotalDocks => self.total_docks as f64,
            Metric::Utilization => self.utilization,
        }
    }
}

/// `bikes / (bikes + docks) * 100`, or 0 when there are no slots at all.
pub fn utilization(total_bikes: u64, total_docks: u64) -> f64 {
    let slots = total_bikes.saturating_add(total_docks);
    if slots == 0 {
        return 0.0;
    }
    total_bikes as f64 / slots as f64 * 100.0
}

/// Aggregate metrics over all status records.
///
/// `station_count` is the number of metadata records; every other figure
/// comes from the status feed.
pub fn compute_metrics(station_count: usize, status: &[StationStatus]) -> Metrics {
    let total_bikes: u64 = status.iter().map(|s| u64::from(s.num_bikes_available)).sum();
    let total_docks: u64 = status.iter().map(|s| u64::from(s.num_docks_available)).sum();
    let active_stations = status.iter().filter(|s| s.is_active()).count();

    Metrics {
        total_stations: station_count,
        active_stations,
        total_bikes,
        total_docks,
        utilization: utilization(total_bikes, total_docks),
    }
}

/// The counters shown to consumers alongside the station list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemTotals {
    pub total_stations: usize,
    pub available_bikes: u64,
    pub available_docks: u64,
    pub active_stations: usize,
}

impl From<&Metrics> for SystemTotals {
    fn from(m: &Metrics) -> Self {
        Self {
            total_stations: m.total_stations,
            available_bikes: m.total_bikes,
            available_docks: m.total_docks,
            active_stations: m.active_stations,
        }
    }
}

/// One station's figures inside a snapshot's trend sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSample {
    pub station_id: String,
    pub bikes: u32,
    pub docks: u32,
    pub is_active: bool,
}

impl From<&StationStatus> for StationSample {
    fn from(s: &StationStatus) -> Self {
        Self {
            station_id: s.station_id.clone(),
            bikes: s.num_bikes_available,
            docks: s.num_docks_available,
            is_active: s.is_active(),
        }
    }
}

/// A recorded observation of the system at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Unique and strictly increasing within a history.
    pub id: i64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub metrics: Metrics,
    #[serde(default)]
    pub station_sample: Vec<StationSample>,
}

/// Build a snapshot of the current feeds, stamped `now`.
pub fn create_snapshot(
    stations: &[StationInfo],
    status: &[StationStatus],
    now: i64,
) -> MetricsSnapshot {
    MetricsSnapshot {
        id: now,
        timestamp: now,
        metrics: compute_metrics(stations.len(), status),
        station_sample: status.iter().take(SAMPLE_SIZE).map(StationSample::from).collect(),
    }
}

/// Persisted snapshots may carry `null` from a NaN utilization.
fn utilization_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 })
}

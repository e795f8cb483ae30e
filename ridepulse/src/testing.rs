//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};

use crate::gbfs::{FetchError, Fetcher, StationInfo, StationStatus};

pub const INFO_URL: &str = "http://feeds.test/station_information.json";
pub const STATUS_URL: &str = "http://feeds.test/station_status.json";

/// Fetcher that replays queued responses per URL.
///
/// When a URL's queue is empty it fails with a network error, which is
/// what an unreachable feed looks like.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, url: &str, value: Value) {
        self.push(url, Ok(value));
    }

    pub fn push_err(&self, url: &str, err: FetchError) {
        self.push(url, Err(err));
    }

    fn push(&self, url: &str, response: Result<Value, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Value, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(FetchError::Network {
                    message: format!("no scripted response for {url}"),
                })
            })
    }
}

pub fn info(id: &str) -> StationInfo {
    StationInfo {
        station_id: id.to_string(),
        name: format!("Station {id}"),
        lat: 40.7,
        lon: -74.0,
        capacity: 40,
        short_name: None,
        region_id: None,
    }
}

/// `(station_id, bikes, docks, active)`
pub fn status(id: &str, bikes: u32, docks: u32, active: bool) -> StationStatus {
    StationStatus {
        station_id: id.to_string(),
        num_bikes_available: bikes,
        num_docks_available: docks,
        is_renting: u8::from(active),
        is_returning: u8::from(active),
        last_reported: 1_700_000_000,
        num_bikes_disabled: None,
        num_docks_disabled: None,
        num_ebikes_available: None,
        is_installed: None,
    }
}

pub fn info_json(ids: &[&str]) -> Value {
    let stations: Vec<StationInfo> = ids.iter().map(|id| info(id)).collect();
    json!({ "data": { "stations": stations } })
}

pub fn status_json(rows: &[(&str, u32, u32, bool)]) -> Value {
    let stations: Vec<StationStatus> = rows
        .iter()
        .map(|&(id, bikes, docks, active)| status(id, bikes, docks, active))
        .collect();
    json!({ "data": { "stations": stations } })
}

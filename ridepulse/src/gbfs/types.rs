//! GBFS feed record types.
//!
//! These are the schema for the two feeds we ingest. Validation happens
//! here, at the ingestion boundary: identifiers must be present, and
//! counters, flags and names that the feed omits (or sends as `null`) are
//! defaulted explicitly. A record that still fails validation is dropped on
//! its own; only a document without `data.stations` is rejected outright.

use std::fmt;
use std::sync::Arc;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// One of the two independently-updated GBFS feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Static station metadata (`station_information.json`).
    StationInformation,
    /// Live availability (`station_status.json`).
    StationStatus,
}

impl Feed {
    /// All feeds, in resolution order.
    pub const ALL: [Feed; 2] = [Feed::StationInformation, Feed::StationStatus];

    /// Logical cache key, which is also the GBFS file stem.
    pub fn key(self) -> &'static str {
        match self {
            Feed::StationInformation => "station_information",
            Feed::StationStatus => "station_status",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Static attributes of a docking station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    #[serde(deserialize_with = "station_id")]
    pub station_id: String,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, deserialize_with = "count")]
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
}

/// Live availability of a docking station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStatus {
    #[serde(deserialize_with = "station_id")]
    pub station_id: String,
    #[serde(default, deserialize_with = "count")]
    pub num_bikes_available: u32,
    #[serde(default, deserialize_with = "count")]
    pub num_docks_available: u32,
    /// 1 when the station is renting bikes out, 0 otherwise.
    #[serde(default, deserialize_with = "flag")]
    pub is_renting: u8,
    /// 1 when the station accepts returns, 0 otherwise.
    #[serde(default, deserialize_with = "flag")]
    pub is_returning: u8,
    /// POSIX timestamp of the station's last report, 0 if unknown.
    #[serde(default, deserialize_with = "timestamp")]
    pub last_reported: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_bikes_disabled: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_docks_disabled: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ebikes_available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_installed: Option<u8>,
}

impl StationStatus {
    /// A station is active when it both rents and accepts returns.
    pub fn is_active(&self) -> bool {
        self.is_renting == 1 && self.is_returning == 1
    }
}

/// A parsed feed payload, as held by the cache.
#[derive(Debug, Clone)]
pub enum FeedPayload {
    Information(Arc<[StationInfo]>),
    Status(Arc<[StationStatus]>),
}

impl FeedPayload {
    /// The feed this payload belongs to.
    pub fn feed(&self) -> Feed {
        match self {
            FeedPayload::Information(_) => Feed::StationInformation,
            FeedPayload::Status(_) => Feed::StationStatus,
        }
    }

    /// Number of station records in the payload.
    pub fn len(&self) -> usize {
        match self {
            FeedPayload::Information(records) => records.len(),
            FeedPayload::Status(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record type carried by one of the feeds.
///
/// Lets the feed client resolve either feed through the same code path
/// while keeping the records strongly typed.
pub trait FeedRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    /// The feed that carries this record type.
    const FEED: Feed;

    fn station_id(&self) -> &str;

    fn into_payload(records: Arc<[Self]>) -> FeedPayload;

    /// Extract records of this type, or `None` if the payload is for the other feed.
    fn from_payload(payload: &FeedPayload) -> Option<Arc<[Self]>>;
}

impl FeedRecord for StationInfo {
    const FEED: Feed = Feed::StationInformation;

    fn station_id(&self) -> &str {
        &self.station_id
    }

    fn into_payload(records: Arc<[Self]>) -> FeedPayload {
        FeedPayload::Information(records)
    }

    fn from_payload(payload: &FeedPayload) -> Option<Arc<[Self]>> {
        match payload {
            FeedPayload::Information(records) => Some(Arc::clone(records)),
            FeedPayload::Status(_) => None,
        }
    }
}

impl FeedRecord for StationStatus {
    const FEED: Feed = Feed::StationStatus;

    fn station_id(&self) -> &str {
        &self.station_id
    }

    fn into_payload(records: Arc<[Self]>) -> FeedPayload {
        FeedPayload::Status(records)
    }

    fn from_payload(payload: &FeedPayload) -> Option<Arc<[Self]>> {
        match payload {
            FeedPayload::Status(records) => Some(Arc::clone(records)),
            FeedPayload::Information(_) => None,
        }
    }
}

/// The GBFS envelope: `{"data": {"stations": [...]}}`.
///
/// Stations stay raw JSON here and are validated one at a time.
#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    data: FeedData,
    #[serde(default, deserialize_with = "optional_timestamp")]
    last_updated: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    stations: Vec<Value>,
}

/// The valid records of one feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed<T> {
    pub records: Vec<T>,
    /// Publisher's `last_updated` (POSIX seconds), when it sent one.
    pub last_updated: Option<i64>,
    /// Records that failed validation and were left out.
    pub dropped: usize,
}

/// Validate a JSON document against the schema for `T`'s feed.
///
/// Fails only when the envelope itself is malformed.
pub fn parse_feed<T: FeedRecord>(value: Value) -> Result<ParsedFeed<T>, serde_json::Error> {
    let envelope: FeedEnvelope = serde_json::from_value(value)?;
    Ok(validate(envelope))
}

/// Like [`parse_feed`], from raw text.
pub fn parse_feed_str<T: FeedRecord>(json: &str) -> Result<ParsedFeed<T>, serde_json::Error> {
    let envelope: FeedEnvelope = serde_json::from_str(json)?;
    Ok(validate(envelope))
}

fn validate<T: FeedRecord>(envelope: FeedEnvelope) -> ParsedFeed<T> {
    let feed = T::FEED;
    let mut records = Vec::with_capacity(envelope.data.stations.len());
    let mut dropped = 0;

    for raw in envelope.data.stations {
        let id = raw_station_id(&raw);
        match serde_json::from_value::<T>(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                dropped += 1;
                warn!(
                    %feed,
                    station_id = %id,
                    error = %e,
                    "dropping invalid station record"
                );
            }
        }
    }

    ParsedFeed {
        records,
        last_updated: envelope.last_updated,
        dropped,
    }
}

/// Best-effort ID of a record that may not validate, for logging.
fn raw_station_id(raw: &Value) -> String {
    match raw.get("station_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => "<missing>".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Station IDs are strings in GBFS 2.x, but some systems publish integers.
fn station_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    let id = match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    };
    if id.trim().is_empty() {
        return Err(D::Error::custom("station_id must not be empty"));
    }
    Ok(id)
}

/// Counters: `null` becomes 0, negatives clamp to 0.
fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

/// Free text: `null` becomes empty.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// POSIX seconds: `null` becomes 0.
fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

/// Envelope timestamps: integers are kept, anything else (GBFS 3.x sends
/// RFC 3339 strings) is ignored.
fn optional_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| v.as_i64()))
}

/// Flags: 0/1 integers (GBFS 2.x) or booleans (GBFS 3.x); `null` becomes 0.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        None => 0,
        Some(RawFlag::Bool(b)) => u8::from(b),
        Some(RawFlag::Int(n)) => u8::from(n != 0),
    })
}

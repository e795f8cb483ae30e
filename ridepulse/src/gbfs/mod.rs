//! GBFS (General Bikeshare Feed Specification) ingestion.
//!
//! The network publishes two feeds that update independently:
//! - `station_information` - slow-changing metadata (name, location, capacity)
//! - `station_status` - live availability (bikes, docks, renting/returning)
//!
//! The two may be transiently out of sync, so a station can appear in one
//! feed and not the other.

mod client;
mod error;
mod fallback;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use error::{FeedError, FetchError};
pub use fallback::FallbackDataset;
pub use types::{
    Feed, FeedPayload, FeedRecord, ParsedFeed, StationInfo, StationStatus, parse_feed,
    parse_feed_str,
};

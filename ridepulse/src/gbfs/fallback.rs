//! Built-in offline dataset.
//!
//! Served only when a feed can be neither fetched nor read from the cache,
//! so the pipeline always has something to reconcile. The data is a small
//! slice of the Citi Bike network embedded at compile time.

use std::sync::Arc;

use super::error::FeedError;
use super::types::{FeedRecord, parse_feed_str};

const STATION_INFORMATION: &str = include_str!("../../data/fallback/station_information.json");
const STATION_STATUS: &str = include_str!("../../data/fallback/station_status.json");

/// Fixed snapshot of both feeds, in GBFS envelope form.
#[derive(Debug, Clone)]
pub struct FallbackDataset {
    information: Arc<str>,
    status: Arc<str>,
}

impl FallbackDataset {
    /// The dataset compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_json(STATION_INFORMATION, STATION_STATUS)
    }

    /// A dataset from arbitrary JSON documents (for testing).
    pub fn from_json(information: impl Into<Arc<str>>, status: impl Into<Arc<str>>) -> Self {
        Self {
            information: information.into(),
            status: status.into(),
        }
    }

    /// Parse the records for `T`'s feed.
    pub fn records<T: FeedRecord>(&self) -> Result<Arc<[T]>, FeedError> {
        let json = match T::FEED {
            super::Feed::StationInformation => &self.information,
            super::Feed::StationStatus => &self.status,
        };

        parse_feed_str::<T>(json)
            .map(|parsed| Arc::from(parsed.records))
            .map_err(|e| FeedError::AllSourcesExhausted {
                feed: T::FEED,
                reason: format!("fallback dataset is malformed: {e}"),
            })
    }
}

impl Default for FallbackDataset {
    fn default() -> Self {
        Self::builtin()
    }
}

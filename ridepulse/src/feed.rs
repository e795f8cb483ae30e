//! Resilient feed client.
//!
//! Each feed resolves independently through the chain
//! fresh cache → live fetch → stale cache → built-in fallback.
//! As long as any tier yields data, callers never see a fetch error;
//! only a malformed fallback dataset can fail a resolution.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::FeedCache;
use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::gbfs::{
    FallbackDataset, FeedError, FeedRecord, FetchError, Fetcher, ParsedFeed, StationInfo,
    StationStatus, parse_feed,
};

/// Which tier of the chain answered a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Cached and within the TTL; no network call made.
    Fresh,
    /// Fetched just now.
    Live,
    /// Cached but past the TTL, served because the fetch failed.
    Stale,
    /// Built-in dataset, served because nothing else was available.
    Fallback,
}

impl Source {
    /// Whether the data is known to be out of date.
    pub fn is_degraded(self) -> bool {
        matches!(self, Source::Stale | Source::Fallback)
    }
}

/// Records for one feed plus where they came from.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub records: Arc<[T]>,
    pub source: Source,
}

/// Where each feed of a combined fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedSources {
    pub information: Source,
    pub status: Source,
}

/// Result of [`FeedClient::fetch_all`].
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub stations: Arc<[StationInfo]>,
    pub status: Arc<[StationStatus]>,
    /// Milliseconds since the epoch when both resolutions completed.
    pub timestamp: i64,
    pub sources: FeedSources,
}

/// Feed client composing a fetcher, the TTL cache and the fallback dataset.
///
/// Constructed once at startup and owned by the poller.
pub struct FeedClient<F> {
    fetcher: F,
    cache: FeedCache,
    fallback: FallbackDataset,
    config: FeedConfig,
    clock: Arc<dyn Clock>,
}

impl<F: Fetcher> FeedClient<F> {
    /// Create a client with the built-in fallback dataset.
    pub fn new(fetcher: F, config: FeedConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_fallback(fetcher, config, clock, FallbackDataset::builtin())
    }

    /// Create a client with a specific fallback dataset.
    pub fn with_fallback(
        fetcher: F,
        config: FeedConfig,
        clock: Arc<dyn Clock>,
        fallback: FallbackDataset,
    ) -> Self {
        Self {
            cache: FeedCache::new(config.ttl, Arc::clone(&clock)),
            fetcher,
            fallback,
            config,
            clock,
        }
    }

    /// Current station metadata.
    pub async fn station_information(&self) -> Result<Resolved<StationInfo>, FeedError> {
        self.resolve::<StationInfo>().await
    }

    /// Current station status.
    pub async fn station_status(&self) -> Result<Resolved<StationStatus>, FeedError> {
        self.resolve::<StationStatus>().await
    }

    /// Resolve both feeds concurrently.
    ///
    /// Fails only if either resolution exhausts every tier.
    pub async fn fetch_all(&self) -> Result<FeedSnapshot, FeedError> {
        let (stations, status) =
            futures::future::join(self.station_information(), self.station_status()).await;
        let (stations, status) = (stations?, status?);

        Ok(FeedSnapshot {
            sources: FeedSources {
                information: stations.source,
                status: status.source,
            },
            stations: stations.records,
            status: status.records,
            timestamp: self.clock.now_millis(),
        })
    }

    /// Resolve one feed through the fallback chain.
    pub async fn resolve<T: FeedRecord>(&self) -> Result<Resolved<T>, FeedError> {
        let feed = T::FEED;

        if let Some(records) = self.cache.get_fresh(feed).await.as_ref().and_then(T::from_payload) {
            debug!(%feed, count = records.len(), "serving fresh cached feed");
            return Ok(Resolved {
                records,
                source: Source::Fresh,
            });
        }

        let err = match self.fetch_live::<T>().await {
            Ok(parsed) => {
                debug!(
                    %feed,
                    count = parsed.records.len(),
                    dropped = parsed.dropped,
                    last_updated = ?parsed.last_updated,
                    "fetched live feed"
                );
                let records: Arc<[T]> = parsed.records.into();
                self.cache.set(T::into_payload(Arc::clone(&records))).await;
                return Ok(Resolved {
                    records,
                    source: Source::Live,
                });
            }
            Err(err) => err,
        };

        warn!(%feed, error = %err, "live feed fetch failed");

        if let Some(records) = self.cache.get(feed).await.as_ref().and_then(T::from_payload) {
            let age = self.cache.age(feed).await.unwrap_or_default();
            warn!(%feed, age_secs = age.as_secs(), "using stale cached feed");
            return Ok(Resolved {
                records,
                source: Source::Stale,
            });
        }

        let records = self.fallback.records::<T>()?;
        warn!(%feed, count = records.len(), "using built-in fallback feed");
        self.cache.set(T::into_payload(Arc::clone(&records))).await;

        Ok(Resolved {
            records,
            source: Source::Fallback,
        })
    }

    async fn fetch_live<T: FeedRecord>(&self) -> Result<ParsedFeed<T>, FetchError> {
        let url = self.config.url(T::FEED);
        let value = self.fetcher.fetch(url, self.config.timeout).await?;
        let parsed = parse_feed::<T>(value).map_err(FetchError::parse)?;

        if parsed.records.is_empty() && parsed.dropped > 0 {
            return Err(FetchError::parse(format_args!(
                "all {} station records failed validation",
                parsed.dropped
            )));
        }
        Ok(parsed)
    }

    /// The cache, for freshness queries.
    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gbfs::Feed;
    use crate::testing::{INFO_URL, STATUS_URL, ScriptedFetcher, info_json, status_json};
    use std::time::Duration;

    fn client(fetcher: ScriptedFetcher) -> (FeedClient<ScriptedFetcher>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = FeedConfig::default().with_urls(INFO_URL, STATUS_URL);
        (FeedClient::new(fetcher, config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn live_fetch_is_cached() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(INFO_URL, info_json(&["72", "79"]));
        let (client, _) = client(fetcher);

        let resolved = client.station_information().await.unwrap();
        assert_eq!(resolved.source, Source::Live);
        assert_eq!(resolved.records.len(), 2);
        assert!(client.cache().is_fresh(Feed::StationInformation).await);
    }

    #[tokio::test]
    async fn fresh_cache_never_calls_network() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(STATUS_URL, status_json(&[("72", 17, 21, true)]));
        let (client, clock) = client(fetcher);

        client.station_status().await.unwrap();
        clock.advance(Duration::from_secs(29));

        let resolved = client.station_status().await.unwrap();
        assert_eq!(resolved.source, Source::Fresh);
        assert_eq!(resolved.records[0].num_bikes_available, 17);
        assert_eq!(client.fetcher.calls(STATUS_URL), 1);
    }

    #[tokio::test]
    async fn expired_cache_refetches() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(STATUS_URL, status_json(&[("72", 17, 21, true)]));
        fetcher.push_ok(STATUS_URL, status_json(&[("72", 4, 34, true)]));
        let (client, clock) = client(fetcher);

        client.station_status().await.unwrap();
        clock.advance(Duration::from_secs(30));

        let resolved = client.station_status().await.unwrap();
        assert_eq!(resolved.source, Source::Live);
        assert_eq!(resolved.records[0].num_bikes_available, 4);
        assert_eq!(client.fetcher.calls(STATUS_URL), 2);
    }

    #[tokio::test]
    async fn stale_cache_beats_fallback_on_failure() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(STATUS_URL, status_json(&[("900", 1, 2, true)]));
        fetcher.push_err(STATUS_URL, FetchError::Http { status: 502 });
        let (client, clock) = client(fetcher);

        client.station_status().await.unwrap();
        clock.advance(Duration::from_secs(90));

        let resolved = client.station_status().await.unwrap();
        assert_eq!(resolved.source, Source::Stale);
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.records[0].station_id, "900");
    }

    #[tokio::test]
    async fn timeout_with_expired_cache_serves_stale() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(INFO_URL, info_json(&["900", "901"]));
        fetcher.push_err(INFO_URL, FetchError::Timeout(Duration::from_secs(10)));
        let (client, clock) = client(fetcher);

        client.station_information().await.unwrap();
        clock.advance(Duration::from_secs(31));

        let resolved = client.station_information().await.unwrap();
        assert_eq!(resolved.source, Source::Stale);
        let ids: Vec<&str> = resolved.records.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["900", "901"]);
        assert_eq!(client.fetcher.calls(INFO_URL), 2);
    }

    #[tokio::test]
    async fn invalid_records_do_not_discard_live_feed() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(
            STATUS_URL,
            serde_json::json!({ "data": { "stations": [
                { "station_id": "900", "num_bikes_available": 4, "num_docks_available": 6,
                  "is_renting": 1, "is_returning": 1, "last_reported": null },
                { "station_id": "901", "num_bikes_available": 2, "num_docks_available": 8,
                  "is_renting": 1, "is_returning": 1, "last_reported": 1_700_000_000 },
                { "num_bikes_available": 9 }
            ]}}),
        );
        fetcher.push_ok(
            INFO_URL,
            serde_json::json!({ "data": { "stations": [
                { "station_id": "900", "name": null, "lat": 40.7, "lon": -74.0 },
                { "station_id": "901", "name": "Pier 40", "lat": 40.72, "lon": -74.01 },
                { "station_id": "902", "name": "Broken", "lat": "north", "lon": -74.0 }
            ]}}),
        );
        let (client, _) = client(fetcher);

        let status = client.station_status().await.unwrap();
        assert_eq!(status.source, Source::Live);
        let ids: Vec<&str> = status.records.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["900", "901"]);
        assert_eq!(status.records[0].last_reported, 0);

        let info = client.station_information().await.unwrap();
        assert_eq!(info.source, Source::Live);
        let ids: Vec<&str> = info.records.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["900", "901"]);
    }

    #[tokio::test]
    async fn feed_with_no_valid_records_is_a_failure() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(
            STATUS_URL,
            serde_json::json!({ "data": { "stations": [{ "station_id": "" }] } }),
        );
        let (client, _) = client(fetcher);

        let resolved = client.station_status().await.unwrap();
        assert_eq!(resolved.source, Source::Fallback);
    }

    #[tokio::test]
    async fn empty_cache_and_failure_serves_fallback_and_seeds_cache() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_err(INFO_URL, FetchError::Timeout(Duration::from_secs(10)));
        let (client, _) = client(fetcher);

        assert!(client.cache().get(Feed::StationInformation).await.is_none());

        let resolved = client.station_information().await.unwrap();
        assert_eq!(resolved.source, Source::Fallback);
        assert_eq!(resolved.records.len(), 5);
        assert!(client.cache().get(Feed::StationInformation).await.is_some());
    }

    #[tokio::test]
    async fn seeded_fallback_is_served_stale_next_time() {
        let fetcher = ScriptedFetcher::new();
        let (client, clock) = client(fetcher);

        let first = client.station_status().await.unwrap();
        assert_eq!(first.source, Source::Fallback);

        clock.advance(Duration::from_secs(60));
        let second = client.station_status().await.unwrap();
        assert_eq!(second.source, Source::Stale);
        assert_eq!(second.records.len(), first.records.len());
    }

    #[tokio::test]
    async fn schema_mismatch_counts_as_failure() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(INFO_URL, serde_json::json!({ "stations": [] }));
        let (client, _) = client(fetcher);

        let resolved = client.station_information().await.unwrap();
        assert_eq!(resolved.source, Source::Fallback);
    }

    #[tokio::test]
    async fn fetch_all_resolves_feeds_independently() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(INFO_URL, info_json(&["72"]));
        fetcher.push_err(STATUS_URL, FetchError::Network { message: "reset".into() });
        let (client, clock) = client(fetcher);

        let snapshot = client.fetch_all().await.unwrap();
        assert_eq!(snapshot.sources.information, Source::Live);
        assert_eq!(snapshot.sources.status, Source::Fallback);
        assert_eq!(snapshot.stations.len(), 1);
        assert_eq!(snapshot.status.len(), 5);
        assert_eq!(snapshot.timestamp, clock.now_millis());
    }

    #[tokio::test]
    async fn malformed_fallback_fails_fetch_all() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_ok(INFO_URL, info_json(&["72"]));
        let clock = Arc::new(ManualClock::new(0));
        let config = FeedConfig::default().with_urls(INFO_URL, STATUS_URL);
        let fallback = FallbackDataset::from_json(r#"{"data":{"stations":[]}}"#, "garbage");
        let client = FeedClient::with_fallback(fetcher, config, clock, fallback);

        let err = client.fetch_all().await.unwrap_err();
        assert!(matches!(
            err,
            FeedError::AllSourcesExhausted {
                feed: Feed::StationStatus,
                ..
            }
        ));
    }

    #[test]
    fn degraded_sources() {
        assert!(!Source::Fresh.is_degraded());
        assert!(!Source::Live.is_degraded());
        assert!(Source::Stale.is_degraded());
        assert!(Source::Fallback.is_degraded());
    }
}

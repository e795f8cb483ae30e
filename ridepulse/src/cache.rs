//! Freshness-tracking cache for feed payloads.
//!
//! Unlike a plain TTL cache, expired entries are kept: when the network is
//! down the feed client still serves the last good payload. Freshness is
//! therefore evaluated on every read against the entry's fetch time rather
//! than by eviction.
//!
//! The key space is the fixed set of feeds, so there is no capacity-based
//! eviction either.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;

use crate::clock::{Clock, duration_millis};
use crate::gbfs::{Feed, FeedPayload};

/// The last successfully obtained payload for a feed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: FeedPayload,
    /// Milliseconds since the epoch when `data` was stored.
    pub fetched_at: i64,
}

impl CacheEntry {
    /// Fresh iff `now - fetched_at < ttl`.
    pub fn is_fresh_at(&self, now: i64, ttl: Duration) -> bool {
        now.saturating_sub(self.fetched_at) < duration_millis(ttl)
    }

    /// Age of the entry at `now`, zero if the clock went backwards.
    pub fn age_at(&self, now: i64) -> Duration {
        let millis = now.saturating_sub(self.fetched_at).max(0);
        Duration::from_millis(u64::try_from(millis).unwrap_or_default())
    }
}

/// Cache of feed payloads keyed by feed.
pub struct FeedCache {
    entries: MokaCache<Feed, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FeedCache {
    /// Create an empty cache with the given freshness window.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(Feed::ALL.len() as u64)
            .build();

        Self {
            entries,
            ttl,
            clock,
        }
    }

    /// Whether `feed` has an entry younger than the TTL.
    pub async fn is_fresh(&self, feed: Feed) -> bool {
        let now = self.clock.now_millis();
        self.entries
            .get(&feed)
            .await
            .is_some_and(|entry| entry.is_fresh_at(now, self.ttl))
    }

    /// The cached payload for `feed`, fresh or stale.
    pub async fn get(&self, feed: Feed) -> Option<FeedPayload> {
        self.entries.get(&feed).await.map(|entry| entry.data)
    }

    /// The cached payload for `feed` only if it is still fresh.
    pub async fn get_fresh(&self, feed: Feed) -> Option<FeedPayload> {
        let now = self.clock.now_millis();
        self.entries
            .get(&feed)
            .await
            .filter(|entry| entry.is_fresh_at(now, self.ttl))
            .map(|entry| entry.data)
    }

    /// Replace the entry for the payload's feed, stamped with the current time.
    pub async fn set(&self, data: FeedPayload) {
        let entry = CacheEntry {
            fetched_at: self.clock.now_millis(),
            data,
        };
        self.entries.insert(entry.data.feed(), entry).await;
    }

    /// How old the cached entry for `feed` is.
    pub async fn age(&self, feed: Feed) -> Option<Duration> {
        let now = self.clock.now_millis();
        self.entries.get(&feed).await.map(|entry| entry.age_at(now))
    }
}

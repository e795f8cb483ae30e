//! Runtime configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::gbfs::Feed;

/// Default station metadata feed (Citi Bike, GBFS 2.3).
pub const DEFAULT_INFORMATION_URL: &str =
    "https://gbfs.citibikenyc.com/gbfs/2.3/en/station_information.json";

/// Default station status feed (Citi Bike, GBFS 2.3).
pub const DEFAULT_STATUS_URL: &str = "https://gbfs.citibikenyc.com/gbfs/2.3/en/station_status.json";

/// How long a cached feed is served without refetching.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Per-request timeout for feed fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Background refresh period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Number of metric snapshots retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// URL of `station_information.json`.
    pub information_url: String,
    /// URL of `station_status.json`.
    pub status_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Freshness window for cached feeds.
    pub ttl: Duration,
}

impl FeedConfig {
    /// Set custom feed URLs (for testing or another network).
    pub fn with_urls(mut self, information: impl Into<String>, status: impl Into<String>) -> Self {
        self.information_url = information.into();
        self.status_url = status.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The URL serving `feed`.
    pub fn url(&self, feed: Feed) -> &str {
        match feed {
            Feed::StationInformation => &self.information_url,
            Feed::StationStatus => &self.status_url,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            information_url: DEFAULT_INFORMATION_URL.to_string(),
            status_url: DEFAULT_STATUS_URL.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            ttl: DEFAULT_TTL,
        }
    }
}

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Snapshot history capacity.
    pub history_capacity: usize,
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Top-level configuration for the `ridepulse` binary.
#[derive(Debug, Clone)]
pub struct PulseConfig {
    pub feeds: FeedConfig,
    pub poll: PollConfig,
    /// File backing the persisted state.
    pub state_path: PathBuf,
    /// Address for the HTTP API.
    pub bind: SocketAddr,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            feeds: FeedConfig::default(),
            poll: PollConfig::default(),
            state_path: PathBuf::from("ridepulse_state.json"),
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl PulseConfig {
    /// Build from `RIDEPULSE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("RIDEPULSE_INFO_URL") {
            config.feeds.information_url = url;
        }
        if let Some(url) = lookup("RIDEPULSE_STATUS_URL") {
            config.feeds.status_url = url;
        }
        if let Some(path) = lookup("RIDEPULSE_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("RIDEPULSE_POLL_SECS") {
            config.poll.interval = Duration::from_secs(parse_secs("RIDEPULSE_POLL_SECS", &secs)?);
        }
        if let Some(secs) = lookup("RIDEPULSE_TIMEOUT_SECS") {
            config.feeds.timeout = Duration::from_secs(parse_secs("RIDEPULSE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(addr) = lookup("RIDEPULSE_BIND") {
            config.bind = addr.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    var: "RIDEPULSE_BIND",
                    value: addr.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(config)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn config_defaults() {
        let config = PulseConfig::default();
        assert_eq!(config.feeds.url(Feed::StationInformation), DEFAULT_INFORMATION_URL);
        assert_eq!(config.feeds.url(Feed::StationStatus), DEFAULT_STATUS_URL);
        assert_eq!(config.feeds.ttl, Duration::from_millis(30_000));
        assert_eq!(config.feeds.timeout, Duration::from_millis(10_000));
        assert_eq!(config.poll.interval, Duration::from_millis(30_000));
        assert_eq!(config.poll.history_capacity, 20);
    }

    #[test]
    fn feed_config_builder() {
        let config = FeedConfig::default()
            .with_urls("http://localhost/info", "http://localhost/status")
            .with_timeout(Duration::from_secs(2))
            .with_ttl(Duration::from_secs(5));

        assert_eq!(config.url(Feed::StationInformation), "http://localhost/info");
        assert_eq!(config.url(Feed::StationStatus), "http://localhost/status");
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.ttl, Duration::from_secs(5));
    }

    #[test]
    fn reads_environment_overrides() {
        let config = PulseConfig::from_lookup(lookup(&[
            ("RIDEPULSE_STATUS_URL", "http://example/status.json"),
            ("RIDEPULSE_POLL_SECS", "45"),
            ("RIDEPULSE_STATE_PATH", "/tmp/pulse.json"),
            ("RIDEPULSE_BIND", "0.0.0.0:8080"),
        ]))
        .unwrap();

        assert_eq!(config.feeds.status_url, "http://example/status.json");
        assert_eq!(config.feeds.information_url, DEFAULT_INFORMATION_URL);
        assert_eq!(config.poll.interval, Duration::from_secs(45));
        assert_eq!(config.state_path, PathBuf::from("/tmp/pulse.json"));
        assert_eq!(config.bind.port(), 8080);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(PulseConfig::from_lookup(lookup(&[("RIDEPULSE_POLL_SECS", "soon")])).is_err());
        assert!(PulseConfig::from_lookup(lookup(&[("RIDEPULSE_POLL_SECS", "0")])).is_err());
        assert!(PulseConfig::from_lookup(lookup(&[("RIDEPULSE_BIND", "nowhere")])).is_err());
    }
}

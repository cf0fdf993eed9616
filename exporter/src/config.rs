use crate::client::DEFAULT_BASE_URL;
use crate::collector::{
    ChartFailurePolicy, CollectionPolicy, DEFAULT_ACTIVITY_WINDOW_SECS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_STALENESS_WINDOW_SECS,
};
use crate::errors::{Error, Result};
use crate::tags::TagSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Exporter settings, read from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub http_addr: String,
    pub poll_interval: Duration,
    pub cutoff_lookback: chrono::Duration,
    pub pass_timeout: Duration,
    pub tags: TagSet,
    pub policy: CollectionPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("http_addr", &self.http_addr)
            .field("poll_interval", &self.poll_interval)
            .field("cutoff_lookback", &self.cutoff_lookback)
            .field("pass_timeout", &self.pass_timeout)
            .field("tags", &self.tags)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| Error::Config(format!("{key} must be set")))
        };

        let api_timeout_ms: u64 = parse_or(&var, "FIREBOARD_API_TIMEOUT_MILLIS", DEFAULT_REQUEST_TIMEOUT_MS);
        let chart_failures = match var("CHART_FAILURE_POLICY") {
            Some(raw) => ChartFailurePolicy::from_str(&raw)?,
            None => ChartFailurePolicy::default(),
        };

        let policy = CollectionPolicy {
            staleness_window: chrono::Duration::seconds(parse_or(
                &var,
                "STALENESS_WINDOW_SECS",
                DEFAULT_STALENESS_WINDOW_SECS,
            )),
            activity_window: chrono::Duration::seconds(parse_or(
                &var,
                "ACTIVITY_WINDOW_SECS",
                DEFAULT_ACTIVITY_WINDOW_SECS,
            )),
            request_timeout: Duration::from_millis(api_timeout_ms.max(1)),
            chart_failures,
            fetch_drive_data: parse_or(&var, "FETCH_DRIVE_DATA", false),
            fetch_realtime_temperatures: parse_or(&var, "FETCH_REALTIME_TEMPERATURES", false),
        };

        Ok(Self {
            api_url: var("FIREBOARD_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            username: required("FIREBOARD_USERNAME")?,
            password: required("FIREBOARD_PASSWORD")?,
            http_addr: var("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:9090".to_string()),
            poll_interval: Duration::from_secs(parse_or(&var, "POLL_INTERVAL_SECS", 60u64).max(1)),
            cutoff_lookback: chrono::Duration::minutes(parse_or(&var, "CUTOFF_LOOKBACK_MINUTES", 60)),
            pass_timeout: Duration::from_secs(parse_or(&var, "PASS_TIMEOUT_SECS", 300u64).max(1)),
            tags: var("METRIC_TAGS")
                .map(|raw| TagSet::parse(&raw))
                .unwrap_or_default(),
            policy,
        })
    }
}

/// Parses `key`, falling back to `default` when it is unset or malformed.
fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring malformed {}='{}', using {:?}", key, raw, default);
            default
        }),
    }
}

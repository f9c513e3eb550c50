use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 10;
pub const QUEUE_WAIT_TIME_SECONDS: i32 = 20;
pub const QUEUE_VISIBILITY_TIMEOUT_SECONDS: i32 = 480;
pub const QUEUE_MAX_MESSAGES: i32 = 10;

/// Values as they arrive from flags or the environment, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    pub cluster: Option<String>,
    pub drain_timeout: Option<String>,
    pub queue_url: Option<String>,
    pub max_concurrency: Option<usize>,
}

/// Where the effective grace period came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraceSource {
    Configured,
    Default,
    /// The configured value could not be used; holds the rejected input.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSettings {
    pub cluster: String,
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl DrainSettings {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub queue_url: String,
    pub wait_time_seconds: i32,
    pub visibility_timeout_seconds: i32,
    pub max_messages: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainerConfig {
    pub drain: DrainSettings,
    pub queue: QueueSettings,
    pub grace_source: GraceSource,
    pub channel_capacity: usize,
    pub max_concurrency: Option<usize>,
}

impl DrainerConfig {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let cluster = non_blank(raw.cluster).ok_or(ConfigError::MissingCluster)?;
        let queue_url = non_blank(raw.queue_url).ok_or(ConfigError::MissingQueue)?;
        if raw.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidConcurrency);
        }

        let (grace_period, grace_source) = parse_grace_period(raw.drain_timeout.as_deref());

        Ok(Self {
            drain: DrainSettings {
                cluster,
                grace_period,
                poll_interval: DEFAULT_POLL_INTERVAL,
            },
            queue: QueueSettings {
                queue_url,
                wait_time_seconds: QUEUE_WAIT_TIME_SECONDS,
                visibility_timeout_seconds: QUEUE_VISIBILITY_TIMEOUT_SECONDS,
                max_messages: QUEUE_MAX_MESSAGES,
            },
            grace_source,
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            max_concurrency: raw.max_concurrency,
        })
    }
}

/// Parses a grace period such as `45m` or `1h 30m`.
///
/// Absent, unparsable and zero values all fall back to one hour.
pub fn parse_grace_period(raw: Option<&str>) -> (Duration, GraceSource) {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return (DEFAULT_GRACE_PERIOD, GraceSource::Default);
    };

    match humantime::parse_duration(value) {
        Ok(duration) if !duration.is_zero() => (duration, GraceSource::Configured),
        _ => (DEFAULT_GRACE_PERIOD, GraceSource::Rejected(value.to_string())),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

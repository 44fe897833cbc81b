use std::time::Duration;

use tracing::warn;

use crate::errors::ChatError;

const DEFAULT_BASE_URL: &str = "http://localhost:8010";

/// Per-deployment settings for the stream coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Base URL of the agent backend; the stream lives at `{base_url}/chat/stream`.
    pub base_url: String,
    /// Maximum silence tolerated while waiting for the first answer token.
    pub idle_timeout: Duration,
    /// Maximum total duration of one run.
    pub overall_timeout: Duration,
    /// Cadence of the synthetic "still working" status line.
    pub heartbeat_interval: Duration,
    /// Interval of the drain loop.
    pub drain_tick: Duration,
    /// TCP/TLS connect timeout for the outbound request.
    pub connect_timeout: Duration,
    /// Surface failures as `Err` items instead of a final text snapshot.
    pub raw_failures: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            idle_timeout: Duration::from_secs(45),
            overall_timeout: Duration::from_secs(180),
            heartbeat_interval: Duration::from_secs(2),
            drain_tick: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(10),
            raw_failures: false,
        }
    }
}

impl StreamConfig {
    /// Creates a config with default thresholds for the given backend.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `MAS_*` environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MAS_BACKEND_URL`
    /// - `MAS_IDLE_TIMEOUT_SECS`, `MAS_OVERALL_TIMEOUT_SECS`, `MAS_HEARTBEAT_INTERVAL_SECS`
    /// - `MAS_DRAIN_TICK_MS`, `MAS_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChatError> {
        let mut config = Self::default();
        if let Some(url) = lookup("MAS_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(secs) = parse_u64(&lookup, "MAS_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "MAS_OVERALL_TIMEOUT_SECS")? {
            config.overall_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "MAS_HEARTBEAT_INTERVAL_SECS")? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "MAS_DRAIN_TICK_MS")? {
            config.drain_tick = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "MAS_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Overrides the backend base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the idle threshold.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Overrides the overall threshold.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Overrides the heartbeat cadence.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Overrides the drain loop interval.
    pub fn drain_tick(mut self, tick: Duration) -> Self {
        self.drain_tick = tick;
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Requests raw failures (`Err` items) instead of caller-facing text.
    pub fn raw_failures(mut self, raw: bool) -> Self {
        self.raw_failures = raw;
        self
    }

    /// Checks that every threshold is usable.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        for (name, value) in [
            ("idle_timeout", self.idle_timeout),
            ("overall_timeout", self.overall_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("drain_tick", self.drain_tick),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ChatError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.heartbeat_interval >= self.idle_timeout {
            warn!(
                heartbeat_ms = self.heartbeat_interval.as_millis() as u64,
                idle_ms = self.idle_timeout.as_millis() as u64,
                "heartbeat interval is not shorter than the idle timeout; no heartbeat will be shown"
            );
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        format!("{}/chat/stream", self.base_url.trim_end_matches('/'))
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, ChatError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ChatError::Config(format!("invalid {key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_deployment_values() {
        let config = StreamConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(45));
        assert_eq!(config.overall_timeout, Duration::from_secs(180));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.drain_tick, Duration::from_millis(10));
        assert!(!config.raw_failures);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = StreamConfig::from_lookup(lookup_from(&[
            ("MAS_BACKEND_URL", "https://agents.example.com/"),
            ("MAS_IDLE_TIMEOUT_SECS", "30"),
            ("MAS_DRAIN_TICK_MS", "25"),
        ]))
        .expect("config");
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.drain_tick, Duration::from_millis(25));
        assert_eq!(config.overall_timeout, Duration::from_secs(180));
        assert_eq!(config.stream_url(), "https://agents.example.com/chat/stream");
    }

    #[test]
    fn invalid_number_is_config_error() {
        let err = StreamConfig::from_lookup(lookup_from(&[("MAS_OVERALL_TIMEOUT_SECS", "soon")]))
            .expect_err("should fail");
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("MAS_OVERALL_TIMEOUT_SECS")));
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let err = StreamConfig::default()
            .drain_tick(Duration::ZERO)
            .validate()
            .expect_err("zero tick");
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("drain_tick")));
    }
}

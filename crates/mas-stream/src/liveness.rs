use std::time::Duration;

use tokio::time::Instant;

use crate::config::StreamConfig;
use crate::errors::FailureReason;

/// Result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    IdleTimeout,
    OverallTimeout,
}

impl Liveness {
    /// Failure to report for a breached threshold.
    pub fn failure(self) -> Option<FailureReason> {
        match self {
            Self::Alive => None,
            Self::IdleTimeout => Some(FailureReason::IdleTimeout),
            Self::OverallTimeout => Some(FailureReason::OverallTimeout),
        }
    }
}

/// Elapsed-time bookkeeping for one run.
///
/// All methods take `now` explicitly; only genuine frames move `last_frame_at`.
#[derive(Debug, Clone)]
pub struct LivenessSupervisor {
    started_at: Instant,
    last_frame_at: Instant,
    last_heartbeat_at: Instant,
    idle_timeout: Duration,
    overall_timeout: Duration,
    heartbeat_interval: Duration,
}

impl LivenessSupervisor {
    /// Starts every clock at `now` with the configured thresholds.
    pub fn new(config: &StreamConfig, now: Instant) -> Self {
        Self {
            started_at: now,
            last_frame_at: now,
            last_heartbeat_at: now,
            idle_timeout: config.idle_timeout,
            overall_timeout: config.overall_timeout,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    /// Restarts every clock at `now`, when the request is actually sent.
    pub fn restart(&mut self, now: Instant) {
        self.started_at = now;
        self.last_frame_at = now;
        self.last_heartbeat_at = now;
    }

    /// Records a frame received from the stream.
    pub fn record_frame(&mut self, now: Instant) {
        self.last_frame_at = now;
    }

    /// Time since the run started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Time since the last frame.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame_at)
    }

    /// Checks both thresholds. The idle threshold only applies while the run is
    /// still waiting for its first answer output.
    pub fn check(&self, now: Instant, awaiting_first_output: bool) -> Liveness {
        if self.elapsed(now) >= self.overall_timeout {
            return Liveness::OverallTimeout;
        }
        if awaiting_first_output && self.idle_for(now) >= self.idle_timeout {
            return Liveness::IdleTimeout;
        }
        Liveness::Alive
    }

    /// Produces a heartbeat line when the cadence has elapsed since the last one.
    pub fn heartbeat(&mut self, now: Instant) -> Option<String> {
        if now.saturating_duration_since(self.last_heartbeat_at) < self.heartbeat_interval {
            return None;
        }
        self.last_heartbeat_at = now;
        Some(format!(
            "Still working… {}s elapsed",
            self.elapsed(now).as_secs()
        ))
    }
}

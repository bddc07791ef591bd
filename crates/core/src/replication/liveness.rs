use dirnet_common::config::p2p::{STARTUP_TIMEOUT_SECS, STEADY_TIMEOUT_SECS};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks how long the room has been silent
///
/// The window starts long enough for a fresh network to form and shrinks
/// once the first heartbeat arrives. It never grows back.
#[derive(Debug, Clone, Copy)]
pub struct LivenessState {
    last_seen: Instant,
    window: Duration,
}

impl LivenessState {
    pub fn new(now: Instant) -> Self {
        Self {
            last_seen: now,
            window: Duration::from_secs(STARTUP_TIMEOUT_SECS),
        }
    }

    pub fn observe_heartbeat(&mut self, now: Instant) {
        self.last_seen = now;
        self.window = self.window.min(Duration::from_secs(STEADY_TIMEOUT_SECS));
    }

    /// Any other valid message proves the room is alive but leaves the
    /// window alone
    pub fn observe_message(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn is_partitioned(&self, now: Instant) -> bool {
        self.silence(now) > self.window
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

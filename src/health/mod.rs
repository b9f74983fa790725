mod checker;

pub use checker::HealthChecker;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Health of a destination as seen by active probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveHealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

impl ActiveHealthState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ActiveHealthState::Healthy,
            2 => ActiveHealthState::Unhealthy,
            _ => ActiveHealthState::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ActiveHealthState::Unknown => 0,
            ActiveHealthState::Healthy => 1,
            ActiveHealthState::Unhealthy => 2,
        }
    }

    #[inline]
    pub fn is_healthy(self) -> bool {
        self == ActiveHealthState::Healthy
    }
}

impl fmt::Display for ActiveHealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActiveHealthState::Unknown => "unknown",
            ActiveHealthState::Healthy => "healthy",
            ActiveHealthState::Unhealthy => "unhealthy",
        })
    }
}

/// Probe bookkeeping for one destination. Written by its `HealthChecker`,
/// read by everyone else.
#[derive(Debug)]
pub struct HealthStatus {
    state: AtomicU8,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self::with_state(ActiveHealthState::Unknown)
    }

    pub fn with_state(state: ActiveHealthState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> ActiveHealthState {
        ActiveHealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ActiveHealthState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Record a successful probe. Returns the new state if it changed.
    pub fn record_success(&self, healthy_threshold: u32) -> Option<ActiveHealthState> {
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let promote = match self.state() {
            ActiveHealthState::Unknown => true,
            ActiveHealthState::Unhealthy => successes >= healthy_threshold.max(1),
            ActiveHealthState::Healthy => false,
        };
        promote.then(|| {
            self.set_state(ActiveHealthState::Healthy);
            ActiveHealthState::Healthy
        })
    }

    /// Record a failed probe. Returns the new state if it changed.
    pub fn record_failure(&self, unhealthy_threshold: u32) -> Option<ActiveHealthState> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.consecutive_successes.store(0, Ordering::Relaxed);

        let demote = match self.state() {
            ActiveHealthState::Unknown => true,
            ActiveHealthState::Healthy => failures >= unhealthy_threshold.max(1),
            ActiveHealthState::Unhealthy => false,
        };
        demote.then(|| {
            self.set_state(ActiveHealthState::Unhealthy);
            ActiveHealthState::Unhealthy
        })
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        let status = HealthStatus::new();
        assert_eq!(status.state(), ActiveHealthState::Unknown);
    }

    #[test]
    fn test_first_probe_settles_unknown() {
        let status = HealthStatus::new();
        assert_eq!(status.record_success(2), Some(ActiveHealthState::Healthy));

        let status = HealthStatus::new();
        assert_eq!(
            status.record_failure(3),
            Some(ActiveHealthState::Unhealthy)
        );
    }

    #[test]
    fn test_healthy_needs_consecutive_failures() {
        let status = HealthStatus::with_state(ActiveHealthState::Healthy);

        assert_eq!(status.record_failure(3), None);
        assert_eq!(status.record_failure(3), None);
        // a success in between resets the streak
        assert_eq!(status.record_success(2), None);
        assert_eq!(status.record_failure(3), None);
        assert_eq!(status.record_failure(3), None);
        assert_eq!(
            status.record_failure(3),
            Some(ActiveHealthState::Unhealthy)
        );
        assert_eq!(status.state(), ActiveHealthState::Unhealthy);
    }

    #[test]
    fn test_unhealthy_recovers_after_threshold() {
        let status = HealthStatus::with_state(ActiveHealthState::Unhealthy);

        assert_eq!(status.record_success(2), None);
        assert_eq!(status.record_success(2), Some(ActiveHealthState::Healthy));
        assert!(status.state().is_healthy());
    }
}

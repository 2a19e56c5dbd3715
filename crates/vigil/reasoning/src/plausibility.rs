//! Causal-plausibility check applied after the numeric update

use chrono::{DateTime, Duration, Utc};
use vigil_types::FailureMode;

/// Decides whether evidence can causally explain an incident.
///
/// Only change-driven modes are checked: a change that lands after the
/// incident started, or long before it, cannot have caused it even when the
/// signal matches numerically.
#[derive(Debug, Clone, Copy)]
pub struct PlausibilityCheck {
    window: Duration,
}

impl Default for PlausibilityCheck {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl PlausibilityCheck {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn with_window_hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    pub fn is_plausible(
        &self,
        mode: FailureMode,
        change_at: Option<DateTime<Utc>>,
        incident_start: DateTime<Utc>,
    ) -> bool {
        if !mode.is_change_driven() {
            return true;
        }
        match change_at {
            None => true,
            Some(at) => at <= incident_start && incident_start - at <= self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_change_shortly_before_incident_is_plausible() {
        let check = PlausibilityCheck::default();
        assert!(check.is_plausible(FailureMode::BadDeployment, Some(at(9, 14)), at(10, 14)));
    }

    #[test]
    fn test_stale_change_is_implausible() {
        // Crash on Sunday, last deploy on Friday.
        let check = PlausibilityCheck::default();
        assert!(!check.is_plausible(FailureMode::BadDeployment, Some(at(17, 13)), at(3, 15)));
    }

    #[test]
    fn test_change_after_incident_is_implausible() {
        let check = PlausibilityCheck::default();
        assert!(!check.is_plausible(FailureMode::ConfigurationError, Some(at(11, 14)), at(10, 14)));
    }

    #[test]
    fn test_non_change_modes_always_plausible() {
        let check = PlausibilityCheck::default();
        assert!(check.is_plausible(FailureMode::ResourceExhaustion, Some(at(0, 1)), at(10, 14)));
    }
}

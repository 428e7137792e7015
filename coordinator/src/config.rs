//! Coordinator timing configuration.
//!
//! Protocol delays are expressed in abstract time units. A unit is one
//! second in production; tests and the simulator shrink it.

use std::time::Duration;

/// Default length of one time unit.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Default capacity of the coordinator inbox.
const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Delays used by the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Wait after a video tab goes away before telling the list agent to resume.
    pub resume_delay: Duration,

    /// Wait after a tab finishes loading before nudging it with `resume-if-running`.
    pub tab_loaded_delay: Duration,

    /// Capacity of the inbox channel.
    pub inbox_capacity: usize,
}

impl CoordinatorConfig {
    /// Derives all delays from the length of one time unit.
    #[must_use]
    pub fn from_unit(unit: Duration) -> Self {
        Self {
            resume_delay: unit,
            tab_loaded_delay: unit,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_unit(DEFAULT_TIME_UNIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_one_second_units() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.resume_delay, Duration::from_secs(1));
        assert_eq!(config.tab_loaded_delay, Duration::from_secs(1));
        assert_eq!(config.inbox_capacity, 256);
    }

    #[test]
    fn from_unit_scales_delays() {
        let config = CoordinatorConfig::from_unit(Duration::from_millis(10));
        assert_eq!(config.resume_delay, Duration::from_millis(10));
        assert_eq!(config.tab_loaded_delay, Duration::from_millis(10));
    }
}

//! Bounded failure counters.

/// Maximum values for the two failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryLimits {
    /// Consecutive failed opens before exhaustion.
    pub max_open_attempts: u32,
    /// Consecutive failed reads before a reopen.
    pub max_read_failures: u32,
}

impl Default for RecoveryLimits {
    fn default() -> Self {
        Self {
            max_open_attempts: 3,
            max_read_failures: 5,
        }
    }
}

impl From<&crate::capture::RecoveryConfig> for RecoveryLimits {
    fn from(config: &crate::capture::RecoveryConfig) -> Self {
        Self {
            max_open_attempts: config.max_open_attempts.max(1),
            max_read_failures: config.max_read_failures.max(1),
        }
    }
}

/// Consecutive failure counts.
///
/// The two counters are independent: a device that opens fine but drops
/// the odd frame only ever touches `read_failures`, while only failed
/// reopens move `open_attempts` toward exhaustion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounters {
    /// Consecutive failed opens.
    pub open_attempts: u32,
    /// Consecutive failed reads since the last success.
    pub read_failures: u32,
}

impl FailureCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Counts a failed open, saturating at `max`. Returns the new count.
    pub(crate) fn bump_open(&mut self, max: u32) -> u32 {
        self.open_attempts = (self.open_attempts + 1).min(max);
        self.open_attempts
    }

    /// Counts a failed read, saturating at `max`. Returns the new count.
    pub(crate) fn bump_read(&mut self, max: u32) -> u32 {
        self.read_failures = (self.read_failures + 1).min(max);
        self.read_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_saturate() {
        let mut counters = FailureCounters::default();
        for _ in 0..10 {
            counters.bump_read(5);
            counters.bump_open(3);
        }
        assert_eq!(counters.read_failures, 5);
        assert_eq!(counters.open_attempts, 3);

        counters.reset();
        assert_eq!(counters, FailureCounters::default());
    }

    #[test]
    fn test_limits_from_config_never_zero() {
        let config = crate::capture::RecoveryConfig {
            max_open_attempts: 0,
            max_read_failures: 0,
            ..Default::default()
        };
        let limits = RecoveryLimits::from(&config);
        assert_eq!(limits.max_open_attempts, 1);
        assert_eq!(limits.max_read_failures, 1);
    }
}

//! Two-tier recovery state machine.
//!
//! Tier one reopens the device a bounded number of times. Tier two,
//! reached when reopening is exhausted, hands over to the remediation
//! hook and halts. The policy does no I/O; the capture loop feeds it
//! outcomes and acts on its decisions.

use super::{FailureCounters, RecoveryLimits};

/// Where the policy is in its escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Reading normally.
    Stable,
    /// Retrying opens at startup.
    OpenRetry,
    /// Reopening after too many consecutive read failures.
    ReadRecovery,
    /// Open attempts used up. Terminal until reset.
    Exhausted,
}

/// What to do after a failed open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDecision {
    /// Below the limit: back off and try again.
    Retry,
    /// Limit reached: run remediation and halt.
    Exhausted,
}

/// What to do after a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Below the limit: keep reading.
    Continue,
    /// Limit reached: start read recovery.
    Escalate,
}

/// Recovery policy tracking both failure counters.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    limits: RecoveryLimits,
    counters: FailureCounters,
    phase: RecoveryPhase,
}

impl RecoveryPolicy {
    pub fn new(limits: RecoveryLimits) -> Self {
        Self {
            limits,
            counters: FailureCounters::default(),
            phase: RecoveryPhase::Stable,
        }
    }

    pub fn limits(&self) -> RecoveryLimits {
        self.limits
    }

    pub fn counters(&self) -> FailureCounters {
        self.counters
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Clears both counters for a fresh session.
    pub fn reset(&mut self) {
        self.counters.reset();
        self.phase = RecoveryPhase::Stable;
    }

    /// Enters the startup open-retry path.
    pub fn begin_open_retry(&mut self) {
        self.phase = RecoveryPhase::OpenRetry;
    }

    /// Enters read recovery. Counters are kept so that repeated
    /// escalations accumulate open attempts.
    pub fn begin_read_recovery(&mut self) {
        self.phase = RecoveryPhase::ReadRecovery;
    }

    /// Any successful open resets both counters.
    pub fn record_open_success(&mut self) {
        if self.counters.open_attempts > 0 {
            tracing::info!(
                attempts = self.counters.open_attempts,
                "Camera recovered after failed opens"
            );
        }
        self.counters.reset();
        self.phase = RecoveryPhase::Stable;
    }

    pub fn record_open_failure(&mut self) -> OpenDecision {
        let attempts = self.counters.bump_open(self.limits.max_open_attempts);
        if attempts >= self.limits.max_open_attempts {
            self.phase = RecoveryPhase::Exhausted;
            OpenDecision::Exhausted
        } else {
            OpenDecision::Retry
        }
    }

    pub fn record_read_success(&mut self) {
        self.counters.read_failures = 0;
    }

    pub fn record_read_failure(&mut self) -> ReadOutcome {
        self.counters.bump_read(self.limits.max_read_failures);
        if self.needs_read_recovery() {
            ReadOutcome::Escalate
        } else {
            ReadOutcome::Continue
        }
    }

    /// Jumps straight to the read-failure limit. Used when the device is
    /// found closed without attempting a read.
    pub fn force_read_escalation(&mut self) {
        self.counters.read_failures = self.limits.max_read_failures;
    }

    pub fn needs_read_recovery(&self) -> bool {
        self.counters.read_failures >= self.limits.max_read_failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == RecoveryPhase::Exhausted
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(RecoveryLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(max_open: u32, max_read: u32) -> RecoveryPolicy {
        RecoveryPolicy::new(RecoveryLimits {
            max_open_attempts: max_open,
            max_read_failures: max_read,
        })
    }

    #[test]
    fn test_starts_stable() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.phase(), RecoveryPhase::Stable);
        assert_eq!(policy.counters(), FailureCounters::default());
    }

    #[test]
    fn test_open_failures_exhaust_at_limit() {
        let mut policy = policy(3, 5);
        policy.begin_open_retry();

        assert_eq!(policy.record_open_failure(), OpenDecision::Retry);
        assert_eq!(policy.record_open_failure(), OpenDecision::Retry);
        assert_eq!(policy.record_open_failure(), OpenDecision::Exhausted);
        assert!(policy.is_exhausted());
        assert_eq!(policy.counters().open_attempts, 3);
    }

    #[test]
    fn test_open_success_resets_everything() {
        let mut policy = policy(3, 5);
        policy.record_read_failure();
        policy.record_open_failure();

        policy.record_open_success();
        assert_eq!(policy.counters(), FailureCounters::default());
        assert_eq!(policy.phase(), RecoveryPhase::Stable);
    }

    #[test]
    fn test_read_success_only_resets_reads() {
        let mut policy = policy(3, 5);
        policy.record_open_failure();
        policy.record_read_failure();

        policy.record_read_success();
        assert_eq!(policy.counters().read_failures, 0);
        assert_eq!(policy.counters().open_attempts, 1);
    }

    #[test]
    fn test_read_escalates_at_limit() {
        let mut policy = policy(3, 5);
        for _ in 0..4 {
            assert_eq!(policy.record_read_failure(), ReadOutcome::Continue);
        }
        assert_eq!(policy.record_read_failure(), ReadOutcome::Escalate);
        assert!(policy.needs_read_recovery());
    }

    #[test]
    fn test_forced_escalation() {
        let mut policy = policy(3, 5);
        policy.force_read_escalation();
        assert!(policy.needs_read_recovery());
        assert_eq!(policy.counters().read_failures, 5);
    }

    #[test]
    fn test_failed_read_recovery_accumulates_open_attempts() {
        let mut policy = policy(3, 2);

        for expected in [OpenDecision::Retry, OpenDecision::Retry, OpenDecision::Exhausted] {
            policy.force_read_escalation();
            policy.begin_read_recovery();
            assert_eq!(policy.record_open_failure(), expected);
        }
        assert!(policy.is_exhausted());
    }

    proptest! {
        #[test]
        fn prop_counters_never_exceed_limits(
            max_open in 1u32..10,
            max_read in 1u32..10,
            events in proptest::collection::vec(0u8..5, 0..200),
        ) {
            let mut policy = policy(max_open, max_read);
            for event in events {
                match event {
                    0 => { policy.record_open_failure(); }
                    1 => policy.record_open_success(),
                    2 => { policy.record_read_failure(); }
                    3 => policy.record_read_success(),
                    _ => policy.force_read_escalation(),
                }
                let counters = policy.counters();
                prop_assert!(counters.open_attempts <= max_open);
                prop_assert!(counters.read_failures <= max_read);
            }
        }

        #[test]
        fn prop_fewer_failures_than_limit_then_success_is_clean(
            max_open in 1u32..10,
            failures in 0u32..10,
        ) {
            prop_assume!(failures < max_open);
            let mut policy = policy(max_open, 5);
            policy.begin_open_retry();
            for _ in 0..failures {
                prop_assert_eq!(policy.record_open_failure(), OpenDecision::Retry);
            }
            policy.record_open_success();
            prop_assert_eq!(policy.counters(), FailureCounters::default());
            prop_assert_eq!(policy.phase(), RecoveryPhase::Stable);
        }
    }
}

//! Failure counting and escalation policy.
//!
//! Device faults are tracked along two independent dimensions: frames
//! that failed to arrive and reopens that failed. Only the second can
//! exhaust recovery and halt the engine.

mod counters;
mod policy;

pub use counters::{FailureCounters, RecoveryLimits};
pub use policy::{OpenDecision, ReadOutcome, RecoveryPhase, RecoveryPolicy};

//! The capture loop.
//!
//! Pulls frames through the device session at a bounded rate and feeds
//! every outcome to the recovery policy. Each iteration is classified
//! as either a device fault (counted, may trigger a reopen) or a soft
//! fault (frame dropped, counters untouched). Nothing escapes the loop:
//! every device call returns a classified outcome.

use super::{EngineEvent, RunState, Shared};
use crate::capture::{Frame, RawFrame};
use crate::processing::ProcessError;
use crate::recovery::{OpenDecision, ReadOutcome, RecoveryPhase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Stop was requested.
    Stopped,
    /// Open attempts were used up.
    Exhausted,
}

/// Result of the startup open-retry path.
enum OpenRetry {
    Opened,
    Exit(LoopExit),
}

/// Result of one read-failure escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Resumed,
    RetryLater,
    Exhausted,
}

/// One read attempt, decided under the session lock.
enum Iteration {
    Frame(RawFrame, u64),
    DeviceFault,
}

/// Runs one capture session to completion. Always releases the device.
pub(super) async fn run(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let device = shared.capture.device_index;
    let exit = drive(&shared, &running).await;

    shared.state.lock().await.session.release().await;

    let final_state = match exit {
        LoopExit::Stopped => RunState::Stopped,
        LoopExit::Exhausted => RunState::Halted,
    };
    shared.set_state(final_state);
    info!(device, state = %final_state, "Capture loop finished");
}

async fn drive(shared: &Shared, running: &AtomicBool) -> LoopExit {
    match open_with_retry(shared, running).await {
        OpenRetry::Opened => {}
        OpenRetry::Exit(exit) => return exit,
    }
    shared.set_state(RunState::Reading);

    let frame_interval = shared.recovery.frame_interval();
    let recovery_pause = shared.recovery.recovery_pause();
    let min_spacing = shared.capture.min_frame_spacing();
    let mut last_emit: Option<Instant> = None;

    while running.load(Ordering::SeqCst) {
        let iteration = {
            let mut state = shared.state.lock().await;
            if !running.load(Ordering::SeqCst) {
                return LoopExit::Stopped;
            }

            if !state.session.is_open() {
                // A failed reopen leaves no handle behind; only report
                // the close when it is news.
                if state.policy.phase() != RecoveryPhase::ReadRecovery {
                    warn!(
                        device = state.session.device_index(),
                        "Camera found closed before read"
                    );
                    shared.emit(EngineEvent::UnexpectedClose);
                }
                state.policy.force_read_escalation();
                Iteration::DeviceFault
            } else {
                match state.session.read_frame().await {
                    Ok(raw) => {
                        state.policy.record_read_success();
                        state.sequence += 1;
                        Iteration::Frame(raw, state.sequence)
                    }
                    Err(e) => {
                        let outcome = state.policy.record_read_failure();
                        let count = state.policy.counters().read_failures;
                        let max = state.policy.limits().max_read_failures;
                        warn!(count, max, error = %e, "Frame read failed");
                        shared.emit(EngineEvent::ReadFailure { count, max });
                        if outcome == ReadOutcome::Escalate {
                            debug!("Read failure limit reached");
                        }
                        Iteration::DeviceFault
                    }
                }
            }
        };

        if let Iteration::Frame(raw, sequence) = iteration {
            match process(shared, raw, sequence).await {
                Ok(frame) => {
                    if let (Some(spacing), Some(last)) = (min_spacing, last_emit) {
                        let elapsed = last.elapsed();
                        if elapsed < spacing {
                            tokio::time::sleep(spacing - elapsed).await;
                        }
                    }
                    trace!(sequence, "Emitting frame");
                    shared.frames.deliver(frame);
                    shared.stats.frames_emitted.fetch_add(1, Ordering::Relaxed);
                    last_emit = Some(Instant::now());
                }
                Err(e) => {
                    warn!(sequence, error = %e, "Frame processing failed, dropping frame");
                    shared.stats.soft_faults.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let decision = {
            let mut state = shared.state.lock().await;
            if !running.load(Ordering::SeqCst) {
                return LoopExit::Stopped;
            }
            if state.policy.needs_read_recovery() {
                Some(recover_after_read_failures(shared, &mut state).await)
            } else {
                None
            }
        };

        match decision {
            Some(Recovery::Exhausted) => {
                exhaust(shared, running).await;
                return LoopExit::Exhausted;
            }
            Some(Recovery::RetryLater) => {
                if running.load(Ordering::SeqCst) {
                    tokio::time::sleep(recovery_pause).await;
                }
            }
            Some(Recovery::Resumed) | None => {}
        }

        if running.load(Ordering::SeqCst) {
            tokio::time::sleep(frame_interval).await;
        }
    }

    LoopExit::Stopped
}

/// Startup path: open, retrying with a fixed backoff until the limit.
async fn open_with_retry(shared: &Shared, running: &AtomicBool) -> OpenRetry {
    let backoff = shared.recovery.open_retry_backoff();

    loop {
        let decision = {
            let mut state = shared.state.lock().await;
            if !running.load(Ordering::SeqCst) {
                return OpenRetry::Exit(LoopExit::Stopped);
            }
            state.policy.begin_open_retry();

            let max = state.policy.limits().max_open_attempts;
            let attempt = state.policy.counters().open_attempts + 1;
            info!(attempt, max, "Opening camera");
            shared.emit(EngineEvent::OpenAttempt { attempt, max });

            match state.session.open().await {
                Ok(()) => {
                    state.policy.record_open_success();
                    shared.emit(EngineEvent::Opened);
                    return OpenRetry::Opened;
                }
                Err(e) => {
                    let decision = state.policy.record_open_failure();
                    let attempt = state.policy.counters().open_attempts;
                    warn!(attempt, max, error = %e, "Camera open failed");
                    shared.emit(EngineEvent::OpenFailed {
                        attempt,
                        max,
                        reason: e.to_string(),
                    });
                    decision
                }
            }
        };

        match decision {
            OpenDecision::Exhausted => {
                exhaust(shared, running).await;
                return OpenRetry::Exit(LoopExit::Exhausted);
            }
            OpenDecision::Retry => {
                if !running.load(Ordering::SeqCst) {
                    return OpenRetry::Exit(LoopExit::Stopped);
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Read-failure escalation: one reopen attempt under the session lock.
///
/// A failed reopen keeps both counters, so repeated escalations walk
/// `open_attempts` toward exhaustion.
async fn recover_after_read_failures(
    shared: &Shared,
    state: &mut super::SessionState,
) -> Recovery {
    shared.set_state(RunState::Recovering);
    state.policy.begin_read_recovery();
    shared.stats.recoveries.fetch_add(1, Ordering::Relaxed);

    let max = state.policy.limits().max_open_attempts;
    warn!(
        read_failures = state.policy.counters().read_failures,
        "Read failure limit reached, reopening camera"
    );
    shared.emit(EngineEvent::RecoveryStarted);

    match state.session.open().await {
        Ok(()) => {
            state.policy.record_open_success();
            info!("Camera recovered after read failures");
            shared.emit(EngineEvent::RecoverySucceeded);
            shared.set_state(RunState::Reading);
            Recovery::Resumed
        }
        Err(e) => {
            let decision = state.policy.record_open_failure();
            let attempt = state.policy.counters().open_attempts;
            warn!(attempt, max, error = %e, "Camera recovery failed");
            match decision {
                OpenDecision::Retry => {
                    shared.emit(EngineEvent::RecoveryFailed { attempt, max });
                    Recovery::RetryLater
                }
                OpenDecision::Exhausted => Recovery::Exhausted,
            }
        }
    }
}

/// Terminal path: remediation once, terminal event, clear the run flag.
async fn exhaust(shared: &Shared, running: &AtomicBool) {
    let attempts = shared.state.lock().await.policy.counters().open_attempts;
    error!(
        device = shared.capture.device_index,
        attempts, "Camera recovery exhausted"
    );
    shared.stats.exhaustions.fetch_add(1, Ordering::Relaxed);

    let hook = Arc::clone(&shared.remediation);
    match tokio::task::spawn_blocking(move || hook.remediate()).await {
        Ok(Ok(())) => info!("Remediation hook completed"),
        Ok(Err(e)) => warn!(error = %e, "Remediation hook failed"),
        Err(e) => warn!(error = %e, "Remediation hook panicked"),
    }

    shared.emit(EngineEvent::Exhausted { attempts });
    running.store(false, Ordering::SeqCst);
}

/// Post-processes a frame on the blocking pool.
async fn process(
    shared: &Shared,
    raw: RawFrame,
    sequence: u64,
) -> Result<Frame, ProcessFault> {
    let processor = Arc::clone(&shared.processor);
    tokio::task::spawn_blocking(move || processor.process(raw, sequence))
        .await
        .map_err(|e| ProcessFault::Worker(e.to_string()))?
        .map_err(ProcessFault::Process)
}

/// A soft fault from post-processing.
#[derive(Debug, thiserror::Error)]
enum ProcessFault {
    #[error(transparent)]
    Process(ProcessError),
    #[error("processing worker failed: {0}")]
    Worker(String),
}

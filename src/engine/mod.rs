//! Capture engine: control surface over the capture loop.
//!
//! The engine owns one device session and runs at most one capture loop
//! at a time on the tokio runtime. Device handle, failure counters and
//! frame sequence live behind a single async mutex; the loop holds it
//! for each device call plus the counter updates that follow, and never
//! across a pacing or backoff sleep.
//!
//! ```text
//! start() ──► capture loop ──► DeviceSession (blocking pool)
//!                 │  ▲
//!                 ▼  │
//!            RecoveryPolicy ──► Remediation (on exhaustion)
//!                 │
//!                 ├──► FrameSink  (processed RGB frames)
//!                 └──► EventSink  (status events)
//! ```

mod capture_loop;
mod events;
pub mod remediation;

pub use events::{EngineEvent, EventSink, FrameSink, NullSink, Severity};
pub use remediation::{
    CommandRemediation, FlagFileRemediation, NoRemediation, Remediation, RemediationError,
};

use crate::capture::{CaptureBackend, CaptureConfig, DeviceSession, RecoveryConfig};
use crate::processing::FrameProcessor;
use crate::recovery::{FailureCounters, RecoveryLimits, RecoveryPolicy};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Lifecycle state of the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not running; no device held.
    Stopped,
    /// Opening the device at startup, including retries.
    Opening,
    /// Reading frames.
    Reading,
    /// Reopening after too many failed reads.
    Recovering,
    /// Recovery exhausted. Only `start()` leaves this state.
    Halted,
}

impl RunState {
    /// Numeric code used for the run state gauge.
    pub fn code(self) -> i64 {
        match self {
            RunState::Stopped => 0,
            RunState::Opening => 1,
            RunState::Reading => 2,
            RunState::Recovering => 3,
            RunState::Halted => 4,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Stopped => "stopped",
            RunState::Opening => "opening",
            RunState::Reading => "reading",
            RunState::Recovering => "recovering",
            RunState::Halted => "halted",
        };
        f.write_str(name)
    }
}

/// Totals for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames delivered to the frame sink.
    pub frames_emitted: u64,
    /// Frames dropped by post-processing.
    pub soft_faults: u64,
    /// Read-failure escalations started.
    pub recoveries: u64,
    /// Exhaustion events.
    pub exhaustions: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    frames_emitted: AtomicU64,
    soft_faults: AtomicU64,
    recoveries: AtomicU64,
    exhaustions: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            soft_faults: self.soft_faults.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.frames_emitted.store(0, Ordering::Relaxed);
        self.soft_faults.store(0, Ordering::Relaxed);
        self.recoveries.store(0, Ordering::Relaxed);
        self.exhaustions.store(0, Ordering::Relaxed);
    }
}

/// Device handle and counters, always mutated together.
struct SessionState {
    session: DeviceSession,
    policy: RecoveryPolicy,
    sequence: u64,
}

struct Shared {
    capture: CaptureConfig,
    recovery: RecoveryConfig,
    processor: Arc<FrameProcessor>,
    state: Mutex<SessionState>,
    run_state: watch::Sender<RunState>,
    stats: StatCounters,
    frames: Arc<dyn FrameSink>,
    events: Arc<dyn EventSink>,
    remediation: Arc<dyn Remediation>,
}

impl Shared {
    fn set_state(&self, state: RunState) {
        let previous = self.run_state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Run state changed");
        }
    }

    fn emit(&self, event: EngineEvent) {
        self.events.emit(event);
    }
}

struct Run {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Builder for [`CaptureEngine`].
pub struct EngineBuilder {
    backend: Arc<dyn CaptureBackend>,
    capture: CaptureConfig,
    recovery: RecoveryConfig,
    frames: Arc<dyn FrameSink>,
    events: Arc<dyn EventSink>,
    remediation: Arc<dyn Remediation>,
}

impl EngineBuilder {
    pub fn capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture = config;
        self
    }

    pub fn recovery_config(mut self, config: RecoveryConfig) -> Self {
        self.recovery = config;
        self
    }

    pub fn frame_sink(mut self, sink: impl FrameSink) -> Self {
        self.frames = Arc::new(sink);
        self
    }

    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.events = Arc::new(sink);
        self
    }

    pub fn remediation(mut self, hook: impl Remediation) -> Self {
        self.remediation = Arc::new(hook);
        self
    }

    pub fn boxed_remediation(mut self, hook: Box<dyn Remediation>) -> Self {
        self.remediation = Arc::from(hook);
        self
    }

    pub fn build(self) -> CaptureEngine {
        let session = DeviceSession::new(self.backend, &self.capture);
        let policy = RecoveryPolicy::new(RecoveryLimits::from(&self.recovery));
        let processor = FrameProcessor::new(
            self.capture.target_width,
            self.capture.target_height,
            self.capture.orientation,
        );
        let (run_state, _) = watch::channel(RunState::Stopped);

        CaptureEngine {
            shared: Arc::new(Shared {
                capture: self.capture,
                recovery: self.recovery,
                processor: Arc::new(processor),
                state: Mutex::new(SessionState {
                    session,
                    policy,
                    sequence: 0,
                }),
                run_state,
                stats: StatCounters::default(),
                frames: self.frames,
                events: self.events,
                remediation: self.remediation,
            }),
            run: Mutex::new(None),
        }
    }
}

/// Self-healing camera capture engine.
pub struct CaptureEngine {
    shared: Arc<Shared>,
    run: Mutex<Option<Run>>,
}

impl CaptureEngine {
    /// Starts building an engine around a capture backend.
    pub fn builder(backend: Arc<dyn CaptureBackend>) -> EngineBuilder {
        EngineBuilder {
            backend,
            capture: CaptureConfig::default(),
            recovery: RecoveryConfig::default(),
            frames: Arc::new(NullSink),
            events: Arc::new(NullSink),
            remediation: Arc::new(NoRemediation),
        }
    }

    /// Starts a fresh capture session.
    ///
    /// If a session is already running it is stopped first and its loop
    /// awaited, so two loops never share the device. Counters and stats
    /// are reset either way. Must be called within a tokio runtime.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        if let Some(previous) = run.take() {
            previous.running.store(false, Ordering::SeqCst);
            if let Err(e) = previous.task.await {
                tracing::warn!(error = %e, "Previous capture loop ended abnormally");
            }
        }

        {
            let mut state = self.shared.state.lock().await;
            state.policy.reset();
            state.sequence = 0;
        }
        self.shared.stats.reset();
        self.shared.set_state(RunState::Opening);

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(capture_loop::run(
            Arc::clone(&self.shared),
            Arc::clone(&running),
        ));
        tracing::info!(
            device = self.shared.capture.device_index,
            "Capture started"
        );
        *run = Some(Run { running, task });
    }

    /// Stops the running session and releases the device.
    ///
    /// Idempotent. Returns once the loop has exited; a pending backoff
    /// sleep is allowed to finish first.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let current = run.take();
        if let Some(current) = &current {
            current.running.store(false, Ordering::SeqCst);
        }

        self.shared.state.lock().await.session.release().await;

        if let Some(current) = current {
            if let Err(e) = current.task.await {
                tracing::warn!(error = %e, "Capture loop ended abnormally");
                self.shared.set_state(RunState::Stopped);
            }
            tracing::info!(
                device = self.shared.capture.device_index,
                "Capture stopped"
            );
        }
    }

    /// Whether a capture loop is currently active.
    pub async fn is_running(&self) -> bool {
        self.run
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::SeqCst))
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        *self.shared.run_state.borrow()
    }

    /// Subscribes to run state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.shared.run_state.subscribe()
    }

    /// Current failure counters.
    pub async fn counters(&self) -> FailureCounters {
        self.shared.state.lock().await.policy.counters()
    }

    /// Whether the device is currently held open.
    pub async fn is_device_open(&self) -> bool {
        self.shared.state.lock().await.session.is_open()
    }

    /// Totals for the current run.
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot()
    }

    pub fn capture_config(&self) -> &CaptureConfig {
        &self.shared.capture
    }

    pub fn recovery_config(&self) -> &RecoveryConfig {
        &self.shared.recovery
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        // Let a detached loop wind down; it releases the device on exit.
        if let Some(run) = self.run.get_mut().as_ref() {
            run.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_codes_distinct() {
        let states = [
            RunState::Stopped,
            RunState::Opening,
            RunState::Reading,
            RunState::Recovering,
            RunState::Halted,
        ];
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert_eq!(RunState::Halted.to_string(), "halted");
    }

    #[test]
    fn test_stats_reset() {
        let stats = StatCounters::default();
        stats.frames_emitted.fetch_add(3, Ordering::Relaxed);
        stats.exhaustions.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.snapshot().frames_emitted, 3);

        stats.reset();
        assert_eq!(stats.snapshot(), EngineStats::default());
    }
}

//! Status events and the sinks that receive them.
//!
//! Delivery is fire-and-forget in both directions: the engine never
//! waits on a sink and a sink cannot push back.

use crate::capture::Frame;
use std::fmt;
use tokio::sync::mpsc;

/// How prominently a consumer should surface an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine, low-noise status.
    Status,
    /// Recovery in progress; worth a notification.
    Alert,
    /// The engine halted and needs intervention.
    Terminal,
}

/// Events emitted by the capture engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// An open is about to be attempted.
    OpenAttempt { attempt: u32, max: u32 },
    /// The device opened.
    Opened,
    /// An open failed.
    OpenFailed { attempt: u32, max: u32, reason: String },
    /// A read failed.
    ReadFailure { count: u32, max: u32 },
    /// The device was found closed before a read.
    UnexpectedClose,
    /// Too many failed reads; reopening.
    RecoveryStarted,
    /// The reopen after read failures succeeded.
    RecoverySucceeded,
    /// The reopen after read failures failed, below the limit.
    RecoveryFailed { attempt: u32, max: u32 },
    /// All open attempts used up; the engine halted.
    Exhausted { attempts: u32 },
}

impl EngineEvent {
    pub fn severity(&self) -> Severity {
        match self {
            EngineEvent::OpenAttempt { .. }
            | EngineEvent::Opened
            | EngineEvent::OpenFailed { .. }
            | EngineEvent::ReadFailure { .. }
            | EngineEvent::RecoverySucceeded => Severity::Status,
            EngineEvent::UnexpectedClose
            | EngineEvent::RecoveryStarted
            | EngineEvent::RecoveryFailed { .. } => Severity::Alert,
            EngineEvent::Exhausted { .. } => Severity::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.severity() == Severity::Terminal
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::OpenAttempt { attempt, max } => {
                write!(f, "opening camera (attempt {}/{})", attempt, max)
            }
            EngineEvent::Opened => write!(f, "camera opened"),
            EngineEvent::OpenFailed {
                attempt,
                max,
                reason,
            } => write!(
                f,
                "failed to open camera (attempt {}/{}): {}",
                attempt, max, reason
            ),
            EngineEvent::ReadFailure { count, max } => {
                write!(f, "failed to read frame ({}/{})", count, max)
            }
            EngineEvent::UnexpectedClose => write!(f, "camera closed unexpectedly"),
            EngineEvent::RecoveryStarted => {
                write!(f, "camera read failing, attempting recovery")
            }
            EngineEvent::RecoverySucceeded => write!(f, "camera recovered"),
            EngineEvent::RecoveryFailed { attempt, max } => write!(
                f,
                "camera recovery failed (open attempt {}/{})",
                attempt, max
            ),
            EngineEvent::Exhausted { attempts } => write!(
                f,
                "camera failed after {} open attempts; check the connection",
                attempts
            ),
        }
    }
}

/// Receives status events.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: EngineEvent);
}

/// Receives processed frames. Takes ownership of each frame.
pub trait FrameSink: Send + Sync + 'static {
    fn deliver(&self, frame: Frame);
}

impl<F> EventSink for F
where
    F: Fn(EngineEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: EngineEvent) {
        self(event)
    }
}

impl EventSink for mpsc::UnboundedSender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

impl<F> FrameSink for F
where
    F: Fn(Frame) + Send + Sync + 'static,
{
    fn deliver(&self, frame: Frame) {
        self(frame)
    }
}

impl FrameSink for mpsc::UnboundedSender<Frame> {
    fn deliver(&self, frame: Frame) {
        if self.send(frame).is_err() {
            tracing::trace!("Frame receiver dropped");
        }
    }
}

/// Bounded channel sink: frames are dropped while the receiver is behind.
impl FrameSink for mpsc::Sender<Frame> {
    fn deliver(&self, frame: Frame) {
        if let Err(e) = self.try_send(frame) {
            tracing::debug!(error = %e, "Frame dropped (receiver behind)");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

impl FrameSink for NullSink {
    fn deliver(&self, _frame: Frame) {}
}

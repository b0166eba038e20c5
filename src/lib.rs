//! Kiosk Camera Library
//!
//! A camera acquisition engine for unattended kiosk devices. It keeps a
//! video feed alive indefinitely on unreliable hardware: USB cameras
//! that disconnect, drivers that hiccup, reads that fail for a while.
//!
//! # Architecture
//!
//! ```text
//! capture (device session) → engine (capture loop) → frame sink
//!               ↑                  ↓
//!          recovery policy ← failure outcomes → event sink
//! ```
//!
//! # Design Principles
//!
//! - **Never wedge**: every device call runs on the blocking pool and
//!   every failure becomes a classified outcome, never a panic in the loop
//! - **Bounded recovery**: consecutive read failures trigger a reopen;
//!   consecutive failed reopens trigger remediation and a terminal halt
//! - **Lenient on frames, strict on opens**: a camera that drops the odd
//!   frame is never escalated like one that cannot be reopened
//!
//! # Example
//!
//! ```no_run
//! use kiosk_camera::capture::{CaptureConfig, MockBackend};
//! use kiosk_camera::engine::{CaptureEngine, EngineEvent};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let (frame_tx, mut frames) = tokio::sync::mpsc::channel(4);
//! let engine = CaptureEngine::builder(Arc::new(MockBackend::new()))
//!     .capture_config(CaptureConfig::for_device(0))
//!     .frame_sink(frame_tx)
//!     .event_sink(|event: EngineEvent| println!("{}", event))
//!     .build();
//!
//! engine.start().await;
//! if let Some(frame) = frames.recv().await {
//!     println!("{}x{} frame", frame.width(), frame.height());
//! }
//! engine.stop().await;
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod engine;
pub mod metrics;
pub mod network;
pub mod processing;
pub mod recovery;

// Re-export commonly used types at crate root
pub use capture::{CaptureBackend, CaptureConfig, DeviceError, FileConfig, Frame, MockBackend};
pub use engine::{CaptureEngine, EngineEvent, EventSink, FrameSink, RunState};
pub use processing::{FrameProcessor, Orientation};
pub use recovery::{FailureCounters, RecoveryPolicy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

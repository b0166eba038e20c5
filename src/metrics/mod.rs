//! Prometheus metrics exporter for camera monitoring.
//!
//! # Metrics Exposed
//!
//! ## Engine State
//! - `kiosk_camera_run_state` - Run state code (0=stopped ... 4=halted)
//! - `kiosk_camera_up` - 1 while frames are being read
//! - `kiosk_camera_open_attempts` - Consecutive failed opens
//! - `kiosk_camera_read_failures` - Consecutive failed reads
//! - `kiosk_network_up` - Network reachability
//!
//! ## Totals
//! - `kiosk_camera_frames_emitted_total` - Frames delivered for display
//! - `kiosk_camera_soft_faults_total` - Frames dropped by post-processing
//! - `kiosk_camera_recoveries_total` - Read-failure recoveries started
//! - `kiosk_camera_exhaustions_total` - Times recovery was exhausted
//!
//! # Example
//!
//! ```no_run
//! use kiosk_camera::engine::{EngineStats, RunState};
//! use kiosk_camera::metrics::{MetricsRegistry, MetricsSnapshot};
//! use kiosk_camera::recovery::FailureCounters;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let snapshot = MetricsSnapshot::from_engine(
//!     RunState::Reading,
//!     FailureCounters::default(),
//!     EngineStats::default(),
//! );
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{ExporterState, MetricsServer, ServerError, SharedExporter};

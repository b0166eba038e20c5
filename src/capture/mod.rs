//! Camera input and device session management.
//!
//! This module provides the backend abstraction over camera hardware,
//! the session that owns one open device handle, and the configuration
//! consumed by the rest of the engine.

mod camera;
mod config;
mod frame;
mod mock;
mod session;
#[cfg(feature = "camera")]
mod webcam;

pub use camera::{CaptureBackend, DeviceError, DeviceHandle};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, MetricsConfig, NetworkConfig, RecoveryConfig,
    RemediationConfig,
};
pub use frame::{Frame, PixelFormat, RawFrame};
pub use mock::{MockBackend, MockHandle, OpenStep, ReadStep};
pub use session::DeviceSession;
#[cfg(feature = "camera")]
pub use webcam::{WebcamBackend, WebcamHandle};

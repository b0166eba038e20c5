//! Capture and recovery configuration.
//!
//! All values are load-time constants for a session. The requested
//! capture resolution is advisory: drivers are free to ignore it.

use crate::processing::Orientation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one capture device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index.
    pub device_index: u32,
    /// Requested capture width in pixels (best-effort).
    pub capture_width: u32,
    /// Requested capture height in pixels (best-effort).
    pub capture_height: u32,
    /// Width of the box emitted frames are resized into.
    pub target_width: u32,
    /// Height of the box emitted frames are resized into.
    pub target_height: u32,
    /// Orientation correction applied before resizing.
    pub orientation: Orientation,
    /// Optional strict frame rate ceiling on emitted frames.
    pub max_fps: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            capture_width: 640,
            capture_height: 480,
            target_width: 400,
            target_height: 300,
            orientation: Orientation::None,
            max_fps: None,
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration for the given device index.
    pub fn for_device(device_index: u32) -> Self {
        Self {
            device_index,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if let Some(fps) = self.max_fps {
            if fps == 0 || fps > 120 {
                return Err(ConfigError::InvalidFrameRate);
            }
        }
        Ok(())
    }

    /// Minimum spacing between emitted frames, if a ceiling is set.
    pub fn min_frame_spacing(&self) -> Option<Duration> {
        self.max_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}

/// Retry limits and fixed delays for the recovery policy.
///
/// Delays are constants, not exponential: a camera either comes back
/// quickly or needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Consecutive failed opens before exhaustion.
    pub max_open_attempts: u32,
    /// Consecutive failed reads before a reopen is attempted.
    pub max_read_failures: u32,
    /// Pause between open retries, in milliseconds.
    pub open_retry_backoff_ms: u64,
    /// Pause after a failed reopen during read recovery, in milliseconds.
    pub recovery_pause_ms: u64,
    /// Fixed pause between loop iterations, in milliseconds.
    pub frame_interval_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_open_attempts: 3,
            max_read_failures: 5,
            open_retry_backoff_ms: 2000,
            recovery_pause_ms: 1000,
            frame_interval_ms: 30,
        }
    }
}

impl RecoveryConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_attempts == 0 || self.max_read_failures == 0 {
            return Err(ConfigError::InvalidLimit);
        }
        Ok(())
    }

    pub fn open_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.open_retry_backoff_ms)
    }

    pub fn recovery_pause(&self) -> Duration {
        Duration::from_millis(self.recovery_pause_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Which last-resort action runs when recovery is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationConfig {
    /// No remediation is available; exhaustion is only reported.
    #[default]
    None,
    /// Run an external program (e.g. a service restart).
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// The program is killed if it runs longer than this.
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
    /// Write a flag file for an external supervisor to pick up.
    FlagFile { path: PathBuf },
}

fn default_command_timeout_secs() -> u64 {
    30
}

/// Network reachability probing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Whether to run the prober at all.
    pub enabled: bool,
    /// Host or address to ping.
    pub target: String,
    /// Seconds between probes.
    pub interval_secs: u64,
    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,
    /// Consecutive failed probes before the network is reported down.
    pub max_failures: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: "8.8.8.8".to_string(),
            interval_secs: 10,
            timeout_secs: 1,
            max_failures: 3,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate ceiling (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("retry limits must be at least 1")]
    InvalidLimit,
    #[error("network probe interval must be at least 1 second")]
    InvalidProbeInterval,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.recovery.validate()?;
        if self.network.enabled && self.network.interval_secs == 0 {
            return Err(ConfigError::InvalidProbeInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.target_height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_zero_limits_invalid() {
        let config = RecoveryConfig {
            max_read_failures: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            device_index = 2
            orientation = "rotate180"

            [recovery]
            max_open_attempts = 7

            [remediation]
            kind = "command"
            program = "systemctl"
            args = ["restart", "kiosk"]
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.device_index, 2);
        assert_eq!(config.capture.capture_width, 640);
        assert_eq!(config.capture.orientation, Orientation::Rotate180);
        assert_eq!(config.recovery.max_open_attempts, 7);
        assert_eq!(config.recovery.max_read_failures, 5);
        assert_eq!(
            config.remediation,
            RemediationConfig::Command {
                program: "systemctl".into(),
                args: vec!["restart".into(), "kiosk".into()],
                timeout_secs: 30,
            }
        );
    }

    #[test]
    fn test_frame_spacing() {
        let config = CaptureConfig {
            max_fps: Some(20),
            ..Default::default()
        };
        assert_eq!(config.min_frame_spacing(), Some(Duration::from_millis(50)));
        assert_eq!(CaptureConfig::default().min_frame_spacing(), None);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            FileConfig::from_toml("[recovery]\nmax_open_attempts = 0\n"),
            Err(ConfigError::InvalidLimit)
        ));
        assert!(matches!(
            FileConfig::from_toml("capture = 3"),
            Err(ConfigError::ParseError(_))
        ));
    }
}

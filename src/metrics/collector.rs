//! Metrics collection and registry.

use crate::engine::{EngineStats, RunState};
use crate::recovery::FailureCounters;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of engine state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Current run state code (see `RunState::code`).
    pub run_state: i64,
    /// Whether the camera is streaming frames.
    pub is_reading: bool,
    /// Consecutive failed opens.
    pub open_attempts: u32,
    /// Consecutive failed reads.
    pub read_failures: u32,
    /// Frames delivered to the frame sink.
    pub frames_emitted: u64,
    /// Frames dropped by post-processing.
    pub soft_faults: u64,
    /// Read-failure recoveries started.
    pub recoveries: u64,
    /// Exhaustion events.
    pub exhaustions: u64,
    /// Network availability, if monitored.
    pub network_available: Option<bool>,
}

impl MetricsSnapshot {
    /// Creates a snapshot from the current state of the capture engine.
    pub fn from_engine(state: RunState, counters: FailureCounters, stats: EngineStats) -> Self {
        Self {
            run_state: state.code(),
            is_reading: state == RunState::Reading,
            open_attempts: counters.open_attempts,
            read_failures: counters.read_failures,
            frames_emitted: stats.frames_emitted,
            soft_faults: stats.soft_faults,
            recoveries: stats.recoveries,
            exhaustions: stats.exhaustions,
            network_available: None,
        }
    }

    pub fn with_network(mut self, available: bool) -> Self {
        self.network_available = Some(available);
        self
    }
}

/// Prometheus metrics registry for camera monitoring.
///
/// Engine stats reset on every `start()`; the exported counters keep
/// growing across restarts.
pub struct MetricsRegistry {
    registry: Registry,

    // State gauges
    run_state: IntGauge,
    camera_up: IntGauge,
    open_attempts: IntGauge,
    read_failures: IntGauge,
    network_up: IntGauge,

    // Counters
    frames_emitted: IntCounter,
    soft_faults: IntCounter,
    recoveries: IntCounter,
    exhaustions: IntCounter,

    last: std::sync::Mutex<EngineStats>,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all camera metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let run_state = IntGauge::new(
            "kiosk_camera_run_state",
            "Engine run state (0=stopped, 1=opening, 2=reading, 3=recovering, 4=halted)",
        )?;
        let camera_up = IntGauge::new(
            "kiosk_camera_up",
            "Whether the camera is streaming frames (1=reading, 0=otherwise)",
        )?;
        let open_attempts = IntGauge::new(
            "kiosk_camera_open_attempts",
            "Consecutive failed camera opens",
        )?;
        let read_failures = IntGauge::new(
            "kiosk_camera_read_failures",
            "Consecutive failed frame reads",
        )?;
        let network_up = IntGauge::new(
            "kiosk_network_up",
            "Network reachability (1=available, 0=unavailable)",
        )?;

        let frames_emitted = IntCounter::new(
            "kiosk_camera_frames_emitted_total",
            "Total frames delivered for display",
        )?;
        let soft_faults = IntCounter::new(
            "kiosk_camera_soft_faults_total",
            "Total frames dropped by post-processing",
        )?;
        let recoveries = IntCounter::new(
            "kiosk_camera_recoveries_total",
            "Total read-failure recoveries started",
        )?;
        let exhaustions = IntCounter::new(
            "kiosk_camera_exhaustions_total",
            "Total times camera recovery was exhausted",
        )?;

        registry.register(Box::new(run_state.clone()))?;
        registry.register(Box::new(camera_up.clone()))?;
        registry.register(Box::new(open_attempts.clone()))?;
        registry.register(Box::new(read_failures.clone()))?;
        registry.register(Box::new(network_up.clone()))?;
        registry.register(Box::new(frames_emitted.clone()))?;
        registry.register(Box::new(soft_faults.clone()))?;
        registry.register(Box::new(recoveries.clone()))?;
        registry.register(Box::new(exhaustions.clone()))?;

        network_up.set(1);

        Ok(Self {
            registry,
            run_state,
            camera_up,
            open_attempts,
            read_failures,
            network_up,
            frames_emitted,
            soft_faults,
            recoveries,
            exhaustions,
            last: std::sync::Mutex::new(EngineStats::default()),
        })
    }

    /// Updates all metrics from a snapshot of engine state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.run_state.set(snapshot.run_state);
        self.camera_up.set(i64::from(snapshot.is_reading));
        self.open_attempts.set(i64::from(snapshot.open_attempts));
        self.read_failures.set(i64::from(snapshot.read_failures));
        if let Some(available) = snapshot.network_available {
            self.network_up.set(i64::from(available));
        }

        // Engine stats restart from zero on a new session; a drop
        // below the last seen value means everything is new.
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let delta = |current: u64, previous: u64| {
            if current >= previous {
                current - previous
            } else {
                current
            }
        };
        self.frames_emitted
            .inc_by(delta(snapshot.frames_emitted, last.frames_emitted));
        self.soft_faults
            .inc_by(delta(snapshot.soft_faults, last.soft_faults));
        self.recoveries
            .inc_by(delta(snapshot.recoveries, last.recoveries));
        self.exhaustions
            .inc_by(delta(snapshot.exhaustions, last.exhaustions));

        *last = EngineStats {
            frames_emitted: snapshot.frames_emitted,
            soft_faults: snapshot.soft_faults,
            recoveries: snapshot.recoveries,
            exhaustions: snapshot.exhaustions,
        };
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frames: u64) -> MetricsSnapshot {
        MetricsSnapshot::from_engine(
            RunState::Reading,
            FailureCounters {
                open_attempts: 0,
                read_failures: 2,
            },
            EngineStats {
                frames_emitted: frames,
                soft_faults: 1,
                recoveries: 0,
                exhaustions: 0,
            },
        )
    }

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(10));

        let output = registry.encode().unwrap();
        assert!(output.contains("kiosk_camera_run_state 2"));
        assert!(output.contains("kiosk_camera_up 1"));
        assert!(output.contains("kiosk_camera_read_failures 2"));
        assert!(output.contains("kiosk_camera_frames_emitted_total 10"));
    }

    #[test]
    fn test_counters_survive_engine_restart() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(10));
        registry.update(&snapshot(15));
        // Restarted session: stats begin again at zero.
        registry.update(&snapshot(4));

        let output = registry.encode().unwrap();
        assert!(output.contains("kiosk_camera_frames_emitted_total 19"));
    }

    #[test]
    fn test_network_gauge() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(0).with_network(false));
        assert!(registry.encode().unwrap().contains("kiosk_network_up 0"));
    }
}

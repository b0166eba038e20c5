//! Network reachability monitoring.
//!
//! A periodic probe with consecutive-failure counting, independent of
//! the capture engine. Only availability transitions are reported.

mod probe;

pub use probe::{PingProbe, Probe};

use crate::capture::NetworkConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A reachability transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    pub available: bool,
    pub message: String,
}

/// Counts consecutive probe failures and reports availability changes.
///
/// Starts out assuming the network is up.
#[derive(Debug, Clone)]
pub struct ReachabilityTracker {
    target: String,
    max_failures: u32,
    failures: u32,
    available: bool,
}

impl ReachabilityTracker {
    pub fn new(target: impl Into<String>, max_failures: u32) -> Self {
        Self {
            target: target.into(),
            max_failures: max_failures.max(1),
            failures: 0,
            available: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Records one probe result. Returns a status only on a transition.
    pub fn record(&mut self, success: bool) -> Option<NetworkStatus> {
        if success {
            self.failures = 0;
            if !self.available {
                self.available = true;
                return Some(NetworkStatus {
                    available: true,
                    message: format!("network available (target: {})", self.target),
                });
            }
            return None;
        }

        self.failures = (self.failures + 1).min(self.max_failures);
        if self.failures >= self.max_failures && self.available {
            self.available = false;
            return Some(NetworkStatus {
                available: false,
                message: format!(
                    "network unavailable: {} probes failed (target: {})",
                    self.failures, self.target
                ),
            });
        }
        None
    }
}

/// Runs a probe periodically and forwards availability transitions.
pub struct NetworkMonitor {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    /// Spawns the monitor loop. The first probe runs after one interval.
    pub fn spawn<P: Probe>(
        probe: P,
        tracker: ReachabilityTracker,
        interval: Duration,
        status_tx: mpsc::UnboundedSender<NetworkStatus>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(monitor_loop(
            probe,
            tracker,
            interval,
            status_tx,
            Arc::clone(&running),
        ));
        tracing::info!("Network monitoring started");
        Self {
            running,
            task: Some(task),
        }
    }

    /// Spawns a ping-based monitor from configuration.
    pub fn from_config(
        config: &NetworkConfig,
        status_tx: mpsc::UnboundedSender<NetworkStatus>,
    ) -> Self {
        let probe = PingProbe::new(
            config.target.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        );
        let tracker = ReachabilityTracker::new(config.target.clone(), config.max_failures);
        Self::spawn(
            probe,
            tracker,
            Duration::from_secs(config.interval_secs.max(1)),
            status_tx,
        )
    }

    /// Stops the loop and waits for it to exit.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            tracing::info!("Network monitoring stopped");
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn monitor_loop<P: Probe>(
    probe: P,
    mut tracker: ReachabilityTracker,
    interval: Duration,
    status_tx: mpsc::UnboundedSender<NetworkStatus>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(interval).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let success = probe.probe().await;
        tracing::trace!(success, "Network probe finished");

        if let Some(status) = tracker.record(success) {
            if status.available {
                tracing::info!(message = %status.message, "Network status changed");
            } else {
                tracing::warn!(message = %status.message, "Network status changed");
            }
            if status_tx.send(status).is_err() {
                break;
            }
        }
    }
}

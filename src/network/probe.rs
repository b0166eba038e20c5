//! Reachability probes.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A single reachability check.
pub trait Probe: Send + Sync + 'static {
    /// Returns true if the target answered.
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Probes a host with the system `ping` command, one packet at a time.
#[derive(Debug, Clone)]
pub struct PingProbe {
    target: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    /// Arguments for one ping with a per-packet timeout.
    pub fn args(&self) -> Vec<String> {
        if cfg!(windows) {
            vec![
                "-n".into(),
                "1".into(),
                "-w".into(),
                self.timeout.as_millis().to_string(),
                self.target.clone(),
            ]
        } else {
            vec![
                "-c".into(),
                "1".into(),
                "-W".into(),
                self.timeout.as_secs().max(1).to_string(),
                self.target.clone(),
            ]
        }
    }
}

impl Probe for PingProbe {
    async fn probe(&self) -> bool {
        let status = Command::new("ping")
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to run ping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_args_end_with_target() {
        let probe = PingProbe::new("10.0.0.1", Duration::from_secs(2));
        let args = probe.args();
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert_eq!(args[1], "1");
        #[cfg(not(windows))]
        assert_eq!(args, ["-c", "1", "-W", "2", "10.0.0.1"]);
    }
}

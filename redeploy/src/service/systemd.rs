//! systemd service controller, local or over ssh

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::service::{ServiceController, ServiceStatus};

/// Drives `systemctl`, through `ssh <host>` when a host is given
#[derive(Debug, Clone)]
pub struct SystemdController {
    /// How often `is-active` is polled while waiting for a state change
    pub poll_interval: Duration,

    /// Extra arguments passed to ssh before the host, e.g. `-o BatchMode=yes`
    pub ssh_args: Vec<String>,
}

impl Default for SystemdController {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            ssh_args: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

impl SystemdController {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, host: Option<&str>, args: &[&str]) -> Command {
        match host {
            Some(host) => {
                let mut cmd = Command::new("ssh");
                cmd.args(&self.ssh_args).arg(host).arg("systemctl").args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new("systemctl");
                cmd.args(args);
                cmd
            }
        }
    }

    async fn transition(
        &self,
        verb: &str,
        target: ServiceStatus,
        name: &str,
        host: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, DeployError> {
        if reached(&target, self.status(name, host).await?.as_ref()) {
            debug!("Service {} already {}", name, target);
            return Ok(true);
        }

        info!("Running systemctl {} {} on {}", verb, name, host.unwrap_or("localhost"));
        let deadline = Instant::now() + timeout;

        // --no-block so the wait below is bounded by our own timeout
        let status = tokio::time::timeout(
            timeout,
            self.command(host, &[verb, "--no-block", name]).status(),
        )
        .await;
        match status {
            Ok(Ok(s)) if s.success() => {}
            Ok(Ok(s)) => {
                warn!("systemctl {} {} exited with {}", verb, name, s);
                return Ok(false);
            }
            Ok(Err(e)) => {
                return Err(DeployError::ServiceError(format!(
                    "Failed to run systemctl {}: {}",
                    verb, e
                )))
            }
            Err(_) => {
                warn!("systemctl {} {} timed out", verb, name);
                return Ok(false);
            }
        }

        while Instant::now() < deadline {
            if reached(&target, self.status(name, host).await?.as_ref()) {
                info!("Service {} is {}", name, target);
                return Ok(true);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        warn!("Service {} did not become {} within {:?}", name, target, timeout);
        Ok(false)
    }
}

/// A failed unit is as good as stopped
fn reached(target: &ServiceStatus, current: Option<&ServiceStatus>) -> bool {
    match (target, current) {
        (ServiceStatus::Stopped, Some(ServiceStatus::Failed)) => true,
        (target, Some(current)) => target == current,
        (_, None) => false,
    }
}

/// Map `systemctl is-active` output to a status
pub fn parse_is_active(output: &str) -> ServiceStatus {
    match output.trim() {
        "active" | "reloading" => ServiceStatus::Running,
        "inactive" => ServiceStatus::Stopped,
        "activating" => ServiceStatus::StartPending,
        "deactivating" => ServiceStatus::StopPending,
        "failed" => ServiceStatus::Failed,
        other => ServiceStatus::Unknown(other.to_string()),
    }
}

#[async_trait]
impl ServiceController for SystemdController {
    async fn stop(
        &self,
        name: &str,
        host: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, DeployError> {
        self.transition("stop", ServiceStatus::Stopped, name, host, timeout)
            .await
    }

    async fn start(
        &self,
        name: &str,
        host: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, DeployError> {
        self.transition("start", ServiceStatus::Running, name, host, timeout)
            .await
    }

    async fn status(
        &self,
        name: &str,
        host: Option<&str>,
    ) -> Result<Option<ServiceStatus>, DeployError> {
        // is-active exits non-zero for anything but "active"; only stdout matters
        let output = match self.command(host, &["is-active", name]).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Unable to query status of {}: {}", name, e);
                return Ok(None);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_is_active(&stdout)))
    }
}

//! Remote shell over ssh
//!
//! Thin pass-through to the vendor CLI on a node: one ssh invocation per
//! command, output returned verbatim for the caller to interpret.

use async_trait::async_trait;
use lifecycle::{LifecycleError, RemoteShell};
use std::env;
use tokio::process::Command;
use tracing::debug;

/// `RemoteShell` implementation shelling out to the system ssh client
pub struct SshShell {
    user: String,
    identity_file: Option<String>,
}

impl SshShell {
    pub fn new(user: String, identity_file: Option<String>) -> Self {
        Self {
            user,
            identity_file,
        }
    }

    /// Build from `HCI_SSH_USER` (default "nutanix") and `HCI_SSH_IDENTITY`
    pub fn from_env() -> Self {
        Self::new(
            env::var("HCI_SSH_USER").unwrap_or_else(|_| "nutanix".to_string()),
            env::var("HCI_SSH_IDENTITY").ok(),
        )
    }

    async fn run(&self, address: &str, command: &str) -> Result<String, LifecycleError> {
        debug!("ssh {}@{}: {}", self.user, address, command);
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes");
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", self.user, address)).arg(command);

        let output = cmd.output().await.map_err(|e| LifecycleError::RemoteShell {
            address: address.to_string(),
            message: format!("failed to spawn ssh: {}", e),
        })?;

        if !output.status.success() {
            return Err(LifecycleError::RemoteShell {
                address: address.to_string(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run_cluster_create(
        &self,
        seed_address: &str,
        cluster_name: &str,
        virtual_address: Option<&str>,
    ) -> Result<String, LifecycleError> {
        let mut command = format!("cluster --cluster_name={} create", cluster_name);
        if let Some(vip) = virtual_address {
            command.push_str(&format!(" --cluster_external_ip={}", vip));
        }
        self.run(seed_address, &command).await
    }

    async fn run_cluster_status(&self, address: &str) -> Result<String, LifecycleError> {
        self.run(address, "cluster status").await
    }
}

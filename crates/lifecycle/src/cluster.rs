//! Cluster formation coordinator
//!
//! Issues the vendor cluster-create command against a seed node and polls
//! cluster status at a fixed interval until the cluster reports up or the
//! configured timeout elapses. The remote-shell transport is an external
//! capability behind the [`RemoteShell`] trait; this module never constructs
//! ssh commands itself. The poll blocks its caller; cancellation is
//! timeout-only. A timeout marks the cluster `error` with no automatic
//! compensation.

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use ledger::{ClusterRecord, ClusterStatus, Ledger};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Remote execution capability against a node address
///
/// Thin pass-through of vendor CLI text; implementations own the transport.
#[async_trait::async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run cluster-create against the seed address
    async fn run_cluster_create(
        &self,
        seed_address: &str,
        cluster_name: &str,
        virtual_address: Option<&str>,
    ) -> Result<String, LifecycleError>;

    /// Run cluster-status against an address, returning the raw CLI output
    async fn run_cluster_status(&self, address: &str) -> Result<String, LifecycleError>;
}

/// Drives cluster creation through the remote shell
pub struct ClusterFormationCoordinator {
    ledger: Arc<dyn Ledger>,
    shell: Arc<dyn RemoteShell>,
    config: Arc<LifecycleConfig>,
}

impl ClusterFormationCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        shell: Arc<dyn RemoteShell>,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        Self {
            ledger,
            shell,
            config,
        }
    }

    /// Create the cluster from its seed node and poll until up or timeout.
    ///
    /// Returns the cluster row in its final state: `created` when the status
    /// output reports up within the budget, `error` on timeout or when the
    /// create command itself fails.
    pub async fn form_cluster(
        &self,
        cluster_name: &str,
        seed_address: &str,
    ) -> Result<ClusterRecord, LifecycleError> {
        let mut cluster = self
            .ledger
            .get_cluster(cluster_name)
            .await?
            .ok_or_else(|| {
                LifecycleError::Validation(format!("unknown cluster {}", cluster_name))
            })?;

        info!(
            "Forming cluster {} from seed {} (virtual address {:?})",
            cluster_name, seed_address, cluster.virtual_address
        );

        if let Err(e) = self
            .shell
            .run_cluster_create(seed_address, cluster_name, cluster.virtual_address.as_deref())
            .await
        {
            cluster.status = ClusterStatus::Error;
            self.ledger.update_cluster(&cluster).await?;
            return Err(e);
        }

        let deadline = Instant::now() + self.config.formation.timeout;
        loop {
            match self.shell.run_cluster_status(seed_address).await {
                Ok(output) if status_reports_up(&output) => {
                    cluster.status = ClusterStatus::Created;
                    self.ledger.update_cluster(&cluster).await?;
                    info!("Cluster {} is up", cluster_name);
                    return Ok(cluster);
                }
                Ok(_) => {}
                // A failed poll is not a failed cluster; keep polling until
                // the deadline decides
                Err(e) => warn!("Cluster status poll against {} failed: {}", seed_address, e),
            }

            if Instant::now() >= deadline {
                warn!(
                    "Cluster {} did not come up within {:?}; marking error",
                    cluster_name, self.config.formation.timeout
                );
                cluster.status = ClusterStatus::Error;
                self.ledger.update_cluster(&cluster).await?;
                return Ok(cluster);
            }
            sleep(self.config.formation.poll_interval).await;
        }
    }
}

/// True when the vendor status output says the cluster is running.
///
/// Accepts both the bare state token and the long-form status line.
pub(crate) fn status_reports_up(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower
        .split_whitespace()
        .any(|token| token == "up" || token == "up,")
        || lower.contains("state of the cluster: start")
}

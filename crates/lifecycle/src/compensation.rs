//! Compensation engine
//!
//! Reverse-order, idempotent, best-effort teardown of everything a node may
//! own: server first (its interfaces go with it), then leftover interfaces,
//! name records, reservations, and finally the ledger rows. Every sub-step
//! runs regardless of the others and produces a structured outcome; the
//! engine aggregates and NEVER raises, so a background reaper cannot fault.
//!
//! An aggregate is successful when more than 80% of its sub-operations
//! succeeded — the slack absorbs expected double-deletes, e.g. an interface
//! already removed as a side effect of server deletion.

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use chrono::{Duration as ChronoDuration, Utc};
use cloud_client::{CloudClientTrait, CloudError, InstanceLifecycleState};
use ledger::{ClusterStatus, DeploymentEvent, Ledger, NodeRecord, NodeStatus, PhaseStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Success threshold for an aggregate cleanup
const SUCCESS_RATIO_THRESHOLD: f64 = 0.8;

/// Result of one teardown sub-operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub message: String,
}

/// Aggregate result of cleaning one node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub node_name: String,
    pub total_operations: usize,
    pub succeeded_operations: usize,
    pub success_ratio: f64,
    pub success: bool,
    pub outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    fn from_outcomes(node_name: &str, outcomes: Vec<CleanupOutcome>) -> Self {
        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let ratio = if total == 0 {
            1.0
        } else {
            succeeded as f64 / total as f64
        };
        Self {
            node_name: node_name.to_string(),
            total_operations: total,
            succeeded_operations: succeeded,
            success_ratio: ratio,
            success: total == 0 || ratio > SUCCESS_RATIO_THRESHOLD,
            outcomes,
        }
    }

    /// A report for a node with nothing left to tear down
    fn noop(node_name: &str) -> Self {
        Self::from_outcomes(node_name, Vec::new())
    }
}

/// Aggregate result of cleaning a whole deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCleanupReport {
    pub deployment_id: String,
    pub node_reports: Vec<CleanupReport>,
    pub cluster_outcomes: Vec<CleanupOutcome>,
    pub success: bool,
}

/// Result of one orphan sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanSweepReport {
    pub scanned: usize,
    pub cleaned: Vec<CleanupReport>,
}

/// Provider-truth verification that a cleanup actually completed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupValidation {
    pub node_name: String,
    pub server_removed: bool,
    pub name_records_removed: bool,
    pub reservations_removed: bool,
}

impl CleanupValidation {
    pub fn passed(&self) -> bool {
        self.server_removed && self.name_records_removed && self.reservations_removed
    }
}

/// Best-effort teardown of node-owned cloud resources
pub struct CompensationEngine {
    cloud: Arc<dyn CloudClientTrait>,
    ledger: Arc<dyn Ledger>,
    config: Arc<LifecycleConfig>,
}

impl CompensationEngine {
    pub fn new(
        cloud: Arc<dyn CloudClientTrait>,
        ledger: Arc<dyn Ledger>,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        Self {
            cloud,
            ledger,
            config,
        }
    }

    /// Tear down everything `name` owns, in reverse creation order.
    ///
    /// Always returns a report; a second call on an already-cleaned node is
    /// a no-op.
    pub async fn cleanup_node(&self, name: &str) -> CleanupReport {
        let node = match self.ledger.get_node(name).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                info!("Cleanup requested for unknown node {}; nothing to do", name);
                return CleanupReport::noop(name);
            }
            Err(e) => {
                warn!("Cleanup of {} could not read the ledger: {}", name, e);
                return CleanupReport::noop(name);
            }
        };
        if node.status == NodeStatus::CleanupCompleted {
            info!("Node {} already cleaned up; nothing to do", name);
            return CleanupReport::noop(name);
        }

        info!("Cleaning up node {} (status {})", name, node.status);
        let mut outcomes = Vec::new();

        // Server first; the provider removes attached interfaces with it
        if let Some(server_id) = node.server_id.as_deref() {
            let result = self.cloud.delete_instance(server_id).await;
            outcomes.push(outcome_of("server", server_id, result));
        }

        // Any interfaces still recorded. Usually already gone with the
        // server; the failed delete is absorbed by the ratio threshold.
        for iface in self.ledger.interfaces_for_node(name).await.unwrap_or_default() {
            let result = self.cloud.delete_vnic(&iface.interface_id).await;
            outcomes.push(outcome_of("interface", &iface.interface_id, result));
            self.retire(self.ledger.delete_interface(&iface.interface_id).await, name);
        }

        for record in self.ledger.name_records_for_node(name).await.unwrap_or_default() {
            let result = self.cloud.delete_dns_record(&record.record_id).await;
            outcomes.push(outcome_of("name_record", &record.record_id, result));
            self.retire(self.ledger.delete_name_record(&record.record_id).await, name);
        }

        for reservation in self.ledger.reservations_for_node(name).await.unwrap_or_default() {
            let result = self.cloud.delete_reservation(&reservation.reservation_id).await;
            outcomes.push(outcome_of(
                "reservation",
                &reservation.reservation_id,
                result,
            ));
            self.retire(
                self.ledger.delete_reservation(&reservation.reservation_id).await,
                name,
            );
        }

        // Release a founding claim that never formed, so the next provision
        // can claim it again
        if let Some(cluster_name) = node.cluster_name.as_deref() {
            if let Ok(Some(cluster)) = self.ledger.get_cluster(cluster_name).await {
                if cluster.founding_node == name && cluster.status == ClusterStatus::Creating {
                    self.retire(self.ledger.delete_cluster(cluster_name).await, name);
                }
            }
        }

        let report = CleanupReport::from_outcomes(name, outcomes);

        // Provider teardown attempted; now retire the identifiers so no row
        // points at a deleted object
        let mut node = node;
        node.addresses.clear();
        node.server_id = None;
        node.management_interface_id = None;
        node.workload_interface_id = None;
        node.status = NodeStatus::CleanupCompleted;
        self.retire(self.ledger.upsert_node(&node).await, name);

        let event_status = if report.success {
            PhaseStatus::Success
        } else {
            PhaseStatus::Failed
        };
        let event = DeploymentEvent::new(
            &node,
            "cleanup",
            event_status,
            format!(
                "{}/{} teardown operations succeeded",
                report.succeeded_operations, report.total_operations
            ),
        );
        self.retire(self.ledger.append_event(&event).await, name);

        info!(
            "Cleanup of {} finished: {}/{} operations succeeded (ratio {:.2})",
            name, report.succeeded_operations, report.total_operations, report.success_ratio
        );
        report
    }

    /// Clean every node belonging to a deployment, plus cluster-level names.
    ///
    /// `deployment_id` resolves through the server id first, then as a node
    /// name prefix. Aggregate success requires every node report to succeed.
    pub async fn cleanup_deployment(&self, deployment_id: &str) -> DeploymentCleanupReport {
        let mut members: Vec<NodeRecord> = Vec::new();
        match self.ledger.find_node_by_server_id(deployment_id).await {
            Ok(Some(node)) => members.push(node),
            Ok(None) => match self.ledger.find_nodes_by_name_prefix(deployment_id).await {
                Ok(nodes) => members = nodes,
                Err(e) => warn!("Deployment {} member lookup failed: {}", deployment_id, e),
            },
            Err(e) => warn!("Deployment {} server-id lookup failed: {}", deployment_id, e),
        }

        if members.is_empty() {
            info!("Deployment {} resolved to no member nodes", deployment_id);
        }

        let member_names: Vec<String> = members.iter().map(|n| n.name.clone()).collect();
        let mut node_reports = Vec::new();
        for name in &member_names {
            node_reports.push(self.cleanup_node(name).await);
        }

        // Cluster-level name cleanup: records registered under the cluster
        // name itself, plus the cluster rows founded by a member
        let mut cluster_outcomes = Vec::new();
        if let Ok(clusters) = self.ledger.list_clusters().await {
            for cluster in clusters
                .into_iter()
                .filter(|c| member_names.contains(&c.founding_node))
            {
                match self
                    .cloud
                    .query_dns_records(&[("name", cluster.name.as_str())], true)
                    .await
                {
                    Ok(records) => {
                        for record in records {
                            let result = self.cloud.delete_dns_record(&record.id).await;
                            cluster_outcomes.push(outcome_of("cluster_record", &record.id, result));
                        }
                    }
                    Err(e) => warn!(
                        "Could not query cluster records for {}: {}",
                        cluster.name, e
                    ),
                }
                self.retire(self.ledger.delete_cluster(&cluster.name).await, &cluster.name);
            }
        }

        let success = node_reports.iter().all(|r| r.success);
        DeploymentCleanupReport {
            deployment_id: deployment_id.to_string(),
            node_reports,
            cluster_outcomes,
            success,
        }
    }

    /// Sweep nodes stuck in failed/error/timed_out older than the threshold
    pub async fn cleanup_orphaned(&self, max_age_hours: u64) -> OrphanSweepReport {
        let candidates = match self.ledger.list_nodes_by_status(&NodeStatus::ORPHANED).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Orphan sweep could not list nodes: {}", e);
                return OrphanSweepReport {
                    scanned: 0,
                    cleaned: Vec::new(),
                };
            }
        };
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours as i64);

        let scanned = candidates.len();
        let mut cleaned = Vec::new();
        for node in candidates {
            // Age from deployment start; stillborn rows age from creation
            let started = match self.ledger.earliest_event(node.id).await {
                Ok(Some(event)) => event.timestamp,
                _ => node.created,
            };
            if started < cutoff {
                info!(
                    "Orphan sweep cleaning node {} ({} since {})",
                    node.name, node.status, started
                );
                cleaned.push(self.cleanup_node(&node.name).await);
            }
        }
        OrphanSweepReport { scanned, cleaned }
    }

    /// Confirm against the PROVIDER that nothing of `name` survives.
    ///
    /// Re-queries by the node's naming conventions rather than trusting the
    /// ledger, guarding against eventual-consistency drift between a
    /// reported delete and provider truth.
    pub async fn validate_cleanup_completion(
        &self,
        name: &str,
    ) -> Result<CleanupValidation, LifecycleError> {
        let instances = self
            .cloud
            .query_instances(&[("display_name", name)], true)
            .await
            .map_err(|e| LifecycleError::provider(format!("instances named {}", name), e))?;
        let server_removed = instances
            .iter()
            .all(|i| i.lifecycle_state == InstanceLifecycleState::Terminated);

        let prefix = format!("{}-", name);
        let records = self
            .cloud
            .query_dns_records(&[("name_contains", prefix.as_str())], true)
            .await
            .map_err(|e| LifecycleError::provider(format!("records for {}", name), e))?;
        let name_records_removed = records.is_empty();

        let mut reservations_removed = true;
        let mut checked_subnets = Vec::new();
        for range in self.config.ranges.values() {
            if checked_subnets.contains(&range.subnet_id) {
                continue;
            }
            checked_subnets.push(range.subnet_id.clone());
            let held = self
                .cloud
                .list_reservations(&range.subnet_id)
                .await
                .map_err(|e| {
                    LifecycleError::provider(format!("subnet {} reservations", range.subnet_id), e)
                })?;
            if held
                .iter()
                .any(|r| r.display_name.as_deref().is_some_and(|d| d.starts_with(&prefix)))
            {
                reservations_removed = false;
            }
        }

        Ok(CleanupValidation {
            node_name: name.to_string(),
            server_removed,
            name_records_removed,
            reservations_removed,
        })
    }

    /// Row retirement failures are logged, never raised
    fn retire(&self, result: Result<(), ledger::LedgerError>, context: &str) {
        if let Err(e) = result {
            warn!("Ledger retirement failed for {}: {}", context, e);
        }
    }
}

fn outcome_of(resource_type: &str, resource_id: &str, result: Result<(), CloudError>) -> CleanupOutcome {
    match result {
        Ok(()) => CleanupOutcome {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            success: true,
            message: "deleted".to_string(),
        },
        Err(e) => CleanupOutcome {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            success: false,
            message: e.to_string(),
        },
    }
}

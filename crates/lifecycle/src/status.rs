//! Deployment status state machine
//!
//! Ingests asynchronous phase reports from the node-side installer, derives a
//! weighted completion percentage from the fixed phase order and per-phase
//! timeout budgets, detects timeouts, and on terminal failure invokes the
//! compensation engine — the only automatic compensation trigger in the
//! system.

use crate::compensation::CompensationEngine;
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use chrono::Utc;
use ledger::{DeploymentEvent, InstallPhase, Ledger, NodeRecord, NodeStatus, PhaseStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// One installer phase report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub server_address: String,
    pub phase: InstallPhase,
    pub status: PhaseStatus,
    pub message: String,
    /// Provider lifecycle state as the installer sees it; recorded only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_lifecycle_status: Option<String>,
}

/// Derived deployment state for a status query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<InstallPhase>,
    pub status: NodeStatus,
    pub progress_percent: f64,
    pub elapsed_seconds: i64,
    pub timed_out: bool,
}

/// Phase-report ingestion and progress derivation
pub struct StatusMachine {
    ledger: Arc<dyn Ledger>,
    compensation: Arc<CompensationEngine>,
    config: Arc<LifecycleConfig>,
}

impl StatusMachine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        compensation: Arc<CompensationEngine>,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        Self {
            ledger,
            compensation,
            config,
        }
    }

    /// Ingest one phase report.
    ///
    /// The event is appended unconditionally; the node status transition
    /// depends on the report: `health_validation`+`success` is terminal
    /// success, any `failed` is terminal failure (compensation runs), and
    /// everything else becomes the composite `{phase}_{status}` marker.
    pub async fn report_phase(&self, report: PhaseReport) -> Result<(), LifecycleError> {
        let mut node = self.resolve(&report.server_address).await?;

        let mut message = report.message.clone();
        if let Some(lifecycle) = &report.provider_lifecycle_status {
            message.push_str(&format!(" (provider: {})", lifecycle));
        }
        self.ledger
            .append_event(&DeploymentEvent::new(
                &node,
                report.phase.as_str(),
                report.status,
                message,
            ))
            .await?;

        node.current_phase = Some(report.phase);
        match (report.phase, report.status) {
            (InstallPhase::HealthValidation, PhaseStatus::Success) => {
                node.status = NodeStatus::Deployed;
                node.progress_percent = 100.0;
                self.ledger.upsert_node(&node).await?;
                info!("Node {} deployed", node.name);
            }
            (phase, PhaseStatus::Failed) => {
                node.status = NodeStatus::Failed;
                self.ledger.upsert_node(&node).await?;
                error!(
                    "Node {} failed in phase {}: {}",
                    node.name, phase, report.message
                );
                let cleanup = self.compensation.cleanup_node(&node.name).await;
                info!(
                    "Compensation after failure of {}: {}/{} operations succeeded (success: {})",
                    node.name,
                    cleanup.succeeded_operations,
                    cleanup.total_operations,
                    cleanup.success
                );
            }
            (phase, status) => {
                let progress = self.progress_percent(Some(phase), &node).await?;
                node.status = NodeStatus::Installing(phase, status);
                node.progress_percent = progress;
                self.ledger.upsert_node(&node).await?;
            }
        }
        Ok(())
    }

    /// Derive the deployment state for one node address
    pub async fn deployment_status(
        &self,
        address: &str,
    ) -> Result<DeploymentStatus, LifecycleError> {
        let node = self.resolve(address).await?;
        let elapsed_seconds = self.elapsed_seconds(&node).await?;

        let progress_percent = match node.status {
            NodeStatus::Deployed => 100.0,
            _ => self.progress_percent(node.current_phase, &node).await?,
        };

        let total = self.config.phase_timeouts.total().as_secs() as i64;
        let timed_out = !node.status.is_terminal() && elapsed_seconds > total;

        Ok(DeploymentStatus {
            phase: node.current_phase,
            status: node.status,
            progress_percent,
            elapsed_seconds,
            timed_out,
        })
    }

    /// Scan in-flight nodes and fail the ones past their total budget.
    ///
    /// Each timed-out node is marked, logged, and compensated exactly like a
    /// failed report. Returns the names that timed out. Callers own the
    /// cadence; there is no internal scheduler.
    pub async fn detect_timeouts(&self) -> Result<Vec<String>, LifecycleError> {
        let total = self.config.phase_timeouts.total().as_secs() as i64;
        let mut timed_out = Vec::new();

        for mut node in self.ledger.list_nodes().await? {
            if node.status.is_terminal() {
                continue;
            }
            let elapsed = self.elapsed_seconds(&node).await?;
            if elapsed <= total {
                continue;
            }

            error!(
                "Node {} exceeded its {}s deployment budget ({}s elapsed); marking timed out",
                node.name, total, elapsed
            );
            node.status = NodeStatus::TimedOut;
            self.ledger.upsert_node(&node).await?;
            let cleanup = self.compensation.cleanup_node(&node.name).await;
            info!(
                "Compensation after timeout of {}: {}/{} operations succeeded (success: {})",
                node.name,
                cleanup.succeeded_operations,
                cleanup.total_operations,
                cleanup.success
            );
            timed_out.push(node.name);
        }
        Ok(timed_out)
    }

    async fn resolve(&self, address: &str) -> Result<NodeRecord, LifecycleError> {
        self.ledger
            .find_node_by_address(address)
            .await?
            .ok_or_else(|| {
                LifecycleError::Validation(format!("no node holds address {}", address))
            })
    }

    async fn elapsed_seconds(&self, node: &NodeRecord) -> Result<i64, LifecycleError> {
        let started = match self.ledger.earliest_event(node.id).await? {
            Some(event) => event.timestamp,
            None => node.created,
        };
        Ok((Utc::now() - started).num_seconds().max(0))
    }

    /// Weighted progress.
    ///
    /// progress = (Σ budgets strictly before current
    ///             + clamp(elapsed − time to current, 0, current budget))
    ///            / Σ all budgets × 100
    ///
    /// Only the current phase's fixed position matters, so repeated or
    /// out-of-order reports cannot corrupt the figure.
    async fn progress_percent(
        &self,
        current: Option<InstallPhase>,
        node: &NodeRecord,
    ) -> Result<f64, LifecycleError> {
        let phase = current.unwrap_or(InstallPhase::IpxeBoot);
        let elapsed = self.elapsed_seconds(node).await? as f64;

        let timeouts = &self.config.phase_timeouts;
        let before = timeouts.before(phase).as_secs_f64();
        let budget = timeouts.budget(phase).as_secs_f64();
        let total = timeouts.total().as_secs_f64();
        if total <= 0.0 {
            return Ok(0.0);
        }

        let in_phase = (elapsed - before).clamp(0.0, budget);
        Ok((((before + in_phase) / total) * 100.0).clamp(0.0, 100.0))
    }
}

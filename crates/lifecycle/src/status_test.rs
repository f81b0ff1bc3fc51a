//! Unit tests for the deployment status state machine

#[cfg(test)]
mod tests {
    use crate::error::LifecycleError;
    use crate::status::PhaseReport;
    use crate::test_utils::{harness, node_spec, TestHarness};
    use chrono::{Duration, Utc};
    use ledger::{
        DeploymentEvent, InstallPhase, Ledger, NodeStatus, PhaseStatus,
    };

    fn report(phase: InstallPhase, status: PhaseStatus) -> PhaseReport {
        PhaseReport {
            server_address: "10.0.0.10".to_string(),
            phase,
            status,
            message: "ok".to_string(),
            provider_lifecycle_status: None,
        }
    }

    async fn provisioned_harness() -> TestHarness {
        let h = harness();
        h.orchestrator.provision(node_spec("node-a")).await.unwrap();
        h
    }

    /// Push node-a's deployment start past the total phase budget
    async fn backdate_start(h: &TestHarness) {
        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        let total = h.config.phase_timeouts.total();
        let mut backdated = DeploymentEvent::new(
            &node,
            "provisioning",
            PhaseStatus::InProgress,
            "backdated start",
        );
        backdated.timestamp = Utc::now()
            - Duration::from_std(total).unwrap()
            - Duration::minutes(5);
        h.ledger.append_event(&backdated).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_address_is_a_client_error_with_no_side_effects() {
        let h = provisioned_harness().await;
        let result = h
            .status
            .report_phase(PhaseReport {
                server_address: "10.0.0.99".to_string(),
                phase: InstallPhase::IpxeBoot,
                status: PhaseStatus::InProgress,
                message: "boot".to_string(),
                provider_lifecycle_status: None,
            })
            .await;
        assert!(matches!(result, Err(LifecycleError::Validation(_))));

        // Only the deployment-start event exists
        assert_eq!(h.ledger.events_for_node("node-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_report_sets_composite_marker() {
        let h = provisioned_harness().await;
        h.status
            .report_phase(report(InstallPhase::IpxeBoot, PhaseStatus::InProgress))
            .await
            .unwrap();

        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(
            node.status,
            NodeStatus::Installing(InstallPhase::IpxeBoot, PhaseStatus::InProgress)
        );
        assert_eq!(node.status.to_string(), "ipxe_boot_in_progress");
        assert_eq!(node.current_phase, Some(InstallPhase::IpxeBoot));
    }

    #[tokio::test]
    async fn test_in_order_reports_yield_monotonic_progress_to_100() {
        let h = provisioned_harness().await;

        let mut last_progress = 0.0;
        for phase in InstallPhase::ALL {
            h.status
                .report_phase(report(phase, PhaseStatus::InProgress))
                .await
                .unwrap();
            let status = h.status.deployment_status("10.0.0.10").await.unwrap();
            assert!(
                status.progress_percent >= last_progress,
                "progress regressed at {}: {} < {}",
                phase,
                status.progress_percent,
                last_progress
            );
            assert!(status.progress_percent <= 100.0);
            assert!(!status.timed_out);
            last_progress = status.progress_percent;
        }

        h.status
            .report_phase(report(InstallPhase::HealthValidation, PhaseStatus::Success))
            .await
            .unwrap();
        let done = h.status.deployment_status("10.0.0.10").await.unwrap();
        assert_eq!(done.status, NodeStatus::Deployed);
        assert_eq!(done.progress_percent, 100.0);
        assert!(!done.timed_out);
    }

    #[tokio::test]
    async fn test_repeated_reports_do_not_corrupt_progress() {
        let h = provisioned_harness().await;
        h.status
            .report_phase(report(InstallPhase::ImageDownload, PhaseStatus::InProgress))
            .await
            .unwrap();
        let first = h.status.deployment_status("10.0.0.10").await.unwrap();

        // The same phase reported again derives the same figure
        h.status
            .report_phase(report(InstallPhase::ImageDownload, PhaseStatus::InProgress))
            .await
            .unwrap();
        let second = h.status.deployment_status("10.0.0.10").await.unwrap();
        assert!((second.progress_percent - first.progress_percent).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_failed_report_marks_failed_and_triggers_compensation() {
        let h = provisioned_harness().await;
        h.status
            .report_phase(PhaseReport {
                server_address: "10.0.0.10".to_string(),
                phase: InstallPhase::Installation,
                status: PhaseStatus::Failed,
                message: "disk mismatch".to_string(),
                provider_lifecycle_status: Some("RUNNING".to_string()),
            })
            .await
            .unwrap();

        // Compensation ran: provider resources gone, row retired
        assert_eq!(h.cloud.instance_count(), 0);
        assert_eq!(h.cloud.reservation_count(), 0);
        assert_eq!(h.cloud.dns_record_count(), 0);
        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::CleanupCompleted);

        // Event log keeps the failure and the cleanup outcome
        let events = h.ledger.events_for_node("node-a").await.unwrap();
        let phases: Vec<&str> = events.iter().map(|e| e.phase.as_str()).collect();
        assert!(phases.contains(&"installation"));
        assert_eq!(phases.last(), Some(&"cleanup"));
    }

    #[tokio::test]
    async fn test_timed_out_iff_elapsed_exceeds_total_budget() {
        let h = provisioned_harness().await;

        let fresh = h.status.deployment_status("10.0.0.10").await.unwrap();
        assert!(!fresh.timed_out);

        // Backdate the deployment start past the total budget
        backdate_start(&h).await;

        let stale = h.status.deployment_status("10.0.0.10").await.unwrap();
        assert!(stale.timed_out);
    }

    #[tokio::test]
    async fn test_no_timeout_after_terminal_success() {
        let h = provisioned_harness().await;
        h.status
            .report_phase(report(InstallPhase::HealthValidation, PhaseStatus::Success))
            .await
            .unwrap();

        backdate_start(&h).await;

        let status = h.status.deployment_status("10.0.0.10").await.unwrap();
        assert!(!status.timed_out, "terminal report suppresses timeout");
        assert_eq!(status.progress_percent, 100.0);
    }

    #[tokio::test]
    async fn test_detect_timeouts_compensates_expired_nodes() {
        let h = provisioned_harness().await;

        backdate_start(&h).await;

        let timed_out = h.status.detect_timeouts().await.unwrap();
        assert_eq!(timed_out, vec!["node-a".to_string()]);

        assert_eq!(h.cloud.instance_count(), 0);
        assert_eq!(h.cloud.reservation_count(), 0);
        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::CleanupCompleted);

        // A second scan finds nothing in flight
        assert!(h.status.detect_timeouts().await.unwrap().is_empty());
    }
}

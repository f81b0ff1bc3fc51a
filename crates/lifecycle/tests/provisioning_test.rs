//! End-to-end tests over the full engine stack
//!
//! Drives the orchestrator, status machine, and compensation engine together
//! against the mock provider and the in-memory ledger, the way provisiond
//! wires them.

use cloud_client::{CloudClientTrait, MockCloudClient};
use ledger::{AddressType, InstallPhase, Ledger, MemoryLedger, NodeStatus, PhaseStatus};
use lifecycle::{
    AddressRange, CompensationEngine, FormationConfig, LifecycleConfig, NodeSpec, PhaseTimeouts,
    ProvisioningOrchestrator, StatusMachine,
};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

struct Stack {
    cloud: MockCloudClient,
    ledger: Arc<MemoryLedger>,
    orchestrator: ProvisioningOrchestrator,
    compensation: Arc<CompensationEngine>,
    status: StatusMachine,
}

fn config() -> LifecycleConfig {
    let range = |subnet: &str, first, last| AddressRange {
        subnet_id: subnet.to_string(),
        base: Ipv4Addr::new(10, 0, 0, 0),
        first_offset: first,
        last_offset: last,
    };
    let mut ranges = BTreeMap::new();
    ranges.insert(AddressType::Management, range("subnet-mgmt", 10, 60));
    ranges.insert(AddressType::Ahv, range("subnet-mgmt", 10, 60));
    ranges.insert(AddressType::Cvm, range("subnet-mgmt", 10, 60));
    ranges.insert(AddressType::Workload, range("subnet-mgmt", 10, 60));
    ranges.insert(AddressType::Cluster, range("subnet-mgmt", 200, 210));

    let budgets = InstallPhase::ALL
        .iter()
        .map(|p| (*p, Duration::from_secs(600)))
        .collect();

    LifecycleConfig {
        ranges,
        dns_zone: "hci.internal".to_string(),
        cluster_name: "cluster01".to_string(),
        boot_image_id: "img-foundation".to_string(),
        callback_url: "http://provisiond.hci.internal/v1/phase-reports".to_string(),
        management_policy_ids: vec!["nsg-mgmt".to_string(), "nsg-intra".to_string()],
        workload_policy_ids: vec!["nsg-wkld".to_string()],
        phase_timeouts: PhaseTimeouts::new(budgets),
        formation: FormationConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        },
    }
}

fn stack() -> Stack {
    let cloud = MockCloudClient::new("http://mock-cloud");
    let ledger = Arc::new(MemoryLedger::new());
    let config = Arc::new(config());

    let cloud_dyn: Arc<dyn CloudClientTrait> = Arc::new(cloud.clone());
    let ledger_dyn: Arc<dyn Ledger> = ledger.clone();

    let orchestrator = ProvisioningOrchestrator::new(
        Arc::clone(&cloud_dyn),
        Arc::clone(&ledger_dyn),
        Arc::clone(&config),
    );
    let compensation = Arc::new(CompensationEngine::new(
        Arc::clone(&cloud_dyn),
        Arc::clone(&ledger_dyn),
        Arc::clone(&config),
    ));
    let status = StatusMachine::new(ledger_dyn, Arc::clone(&compensation), config);

    Stack {
        cloud,
        ledger,
        orchestrator,
        compensation,
        status,
    }
}

fn spec(name: &str) -> NodeSpec {
    NodeSpec {
        name: name.to_string(),
        profile: Some("hci-large".to_string()),
        role: Some("hypervisor".to_string()),
        storage_template: None,
        cluster_operation_hint: None,
    }
}

fn report(phase: InstallPhase, status: PhaseStatus) -> lifecycle::PhaseReport {
    lifecycle::PhaseReport {
        server_address: "10.0.0.10".to_string(),
        phase,
        status,
        message: "ok".to_string(),
        provider_lifecycle_status: None,
    }
}

#[tokio::test]
async fn first_node_lifecycle_from_provision_to_deployed() {
    let s = stack();

    s.orchestrator.provision(spec("node-a")).await.unwrap();

    // First node: offsets 10..13 plus the cluster address at 200
    let node = s.ledger.get_node("node-a").await.unwrap().unwrap();
    assert_eq!(node.address(AddressType::Management), Some("10.0.0.10"));
    assert_eq!(node.address(AddressType::Ahv), Some("10.0.0.11"));
    assert_eq!(node.address(AddressType::Cvm), Some("10.0.0.12"));
    assert_eq!(node.address(AddressType::Workload), Some("10.0.0.13"));
    assert_eq!(node.address(AddressType::Cluster), Some("10.0.0.200"));
    assert_eq!(s.cloud.dns_record_count(), 5);
    assert_eq!(s.cloud.vnic_count(), 2);
    assert_eq!(s.cloud.instance_count(), 1);

    // The installer walks every phase in order
    for phase in InstallPhase::ALL {
        s.status
            .report_phase(report(phase, PhaseStatus::InProgress))
            .await
            .unwrap();
        if phase != InstallPhase::HealthValidation {
            s.status
                .report_phase(report(phase, PhaseStatus::Success))
                .await
                .unwrap();
        }
    }
    s.status
        .report_phase(report(InstallPhase::HealthValidation, PhaseStatus::Success))
        .await
        .unwrap();

    let final_status = s.status.deployment_status("10.0.0.10").await.unwrap();
    assert_eq!(final_status.status, NodeStatus::Deployed);
    assert_eq!(final_status.progress_percent, 100.0);
    assert!(!final_status.timed_out);

    let node = s.ledger.get_node("node-a").await.unwrap().unwrap();
    assert_eq!(node.status, NodeStatus::Deployed);
}

#[tokio::test]
async fn failed_step_leaves_state_that_cleanup_fully_reverses() {
    let s = stack();

    // Interface creation fails after addresses and names succeeded
    s.cloud.fail_once("create_vnic", "vnic quota exceeded");
    let err = s.orchestrator.provision(spec("node-a")).await.unwrap_err();
    assert!(err.to_string().contains("create_interfaces"));

    // Operator-invoked compensation
    let cleanup = s.compensation.cleanup_node("node-a").await;
    assert!(cleanup.success);
    assert!(cleanup.success_ratio >= 0.8);

    // Provider-truth validation passes every check
    let validation = s
        .compensation
        .validate_cleanup_completion("node-a")
        .await
        .unwrap();
    assert!(validation.passed());

    let node = s.ledger.get_node("node-a").await.unwrap().unwrap();
    assert_eq!(node.status, NodeStatus::CleanupCompleted);

    // The name is free again
    s.orchestrator.provision(spec("node-a")).await.unwrap();
}

#[tokio::test]
async fn installer_failure_mid_deployment_compensates_automatically() {
    let s = stack();
    s.orchestrator.provision(spec("node-a")).await.unwrap();

    s.status
        .report_phase(report(InstallPhase::IpxeBoot, PhaseStatus::InProgress))
        .await
        .unwrap();
    s.status
        .report_phase(report(InstallPhase::StorageDiscovery, PhaseStatus::Failed))
        .await
        .unwrap();

    // The status machine triggered the compensation engine on its own
    assert_eq!(s.cloud.instance_count(), 0);
    assert_eq!(s.cloud.vnic_count(), 0);
    assert_eq!(s.cloud.dns_record_count(), 0);
    assert_eq!(s.cloud.reservation_count(), 0);

    let validation = s
        .compensation
        .validate_cleanup_completion("node-a")
        .await
        .unwrap();
    assert!(validation.passed());
}

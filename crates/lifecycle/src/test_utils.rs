//! Shared fixtures for lifecycle unit tests
//!
//! Builds the full engine stack over `MockCloudClient` + `MemoryLedger` so
//! every test exercises the same wiring the service uses.

use crate::compensation::CompensationEngine;
use crate::config::test_fixtures::test_config;
use crate::config::LifecycleConfig;
use crate::orchestrator::{NodeSpec, ProvisioningOrchestrator};
use crate::status::StatusMachine;
use cloud_client::{CloudClientTrait, MockCloudClient};
use ledger::{Ledger, MemoryLedger};
use std::sync::Arc;

pub struct TestHarness {
    pub cloud: MockCloudClient,
    pub ledger: Arc<MemoryLedger>,
    pub config: Arc<LifecycleConfig>,
    pub orchestrator: ProvisioningOrchestrator,
    pub compensation: Arc<CompensationEngine>,
    pub status: StatusMachine,
}

/// Engine stack over mocks with the default test config
pub fn harness() -> TestHarness {
    let cloud = MockCloudClient::new("http://mock-cloud");
    let ledger = Arc::new(MemoryLedger::new());
    let config = Arc::new(test_config());

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
    let status = StatusMachine::new(
        ledger_dyn,
        Arc::clone(&compensation),
        Arc::clone(&config),
    );

    TestHarness {
        cloud,
        ledger,
        config,
        orchestrator,
        compensation,
        status,
    }
}

/// A provisioning request for `name` with typical fields filled in
pub fn node_spec(name: &str) -> NodeSpec {
    NodeSpec {
        name: name.to_string(),
        profile: Some("hci-large".to_string()),
        role: Some("hypervisor".to_string()),
        storage_template: Some("all-flash".to_string()),
        cluster_operation_hint: None,
    }
}

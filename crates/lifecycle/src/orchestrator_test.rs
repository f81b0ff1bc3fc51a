//! Unit tests for the provisioning orchestrator

#[cfg(test)]
mod tests {
    use crate::error::{LifecycleError, ProvisionStep};
    use crate::test_utils::{harness, node_spec};
    use cloud_client::CloudClientTrait;
    use ledger::{AddressType, ClusterStatus, Ledger, NodeStatus};

    #[tokio::test]
    async fn test_first_node_provisions_full_resource_set() {
        let h = harness();

        let receipt = h.orchestrator.provision(node_spec("node-a")).await.unwrap();
        assert!(receipt.estimated_completion > chrono::Utc::now());

        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Provisioning);
        assert_eq!(node.id, receipt.node_id);

        // First node reserves all five types at the first free offsets
        assert_eq!(node.address(AddressType::Management), Some("10.0.0.10"));
        assert_eq!(node.address(AddressType::Ahv), Some("10.0.0.11"));
        assert_eq!(node.address(AddressType::Cvm), Some("10.0.0.12"));
        assert_eq!(node.address(AddressType::Workload), Some("10.0.0.13"));
        assert_eq!(node.address(AddressType::Cluster), Some("10.0.0.200"));

        // Five A-records: four per-type names plus the fixed cluster name
        let records = h.ledger.name_records_for_node("node-a").await.unwrap();
        let mut names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "cluster01",
                "node-a-ahv",
                "node-a-cvm",
                "node-a-mgmt",
                "node-a-workload",
            ]
        );

        // Two interfaces, both attached to the server at launch
        assert_eq!(h.ledger.interfaces_for_node("node-a").await.unwrap().len(), 2);
        let server_id = node.server_id.expect("server id persisted");
        let instance = h.cloud.get_instance(&server_id).await.unwrap();
        assert_eq!(instance.vnic_ids.len(), 2);
        assert_eq!(instance.image_id, "img-foundation");
        assert!(instance.user_data.is_some());

        // Founding claim recorded with the cluster virtual address
        let cluster = h.ledger.get_cluster("cluster01").await.unwrap().unwrap();
        assert_eq!(cluster.founding_node, "node-a");
        assert_eq!(cluster.status, ClusterStatus::Creating);
        assert_eq!(cluster.virtual_address.as_deref(), Some("10.0.0.200"));

        // Deployment-start event appended
        let events = h.ledger.events_for_node("node-a").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, "provisioning");
    }

    #[tokio::test]
    async fn test_later_node_skips_cluster_address() {
        let h = harness();
        h.orchestrator.provision(node_spec("node-a")).await.unwrap();

        // node-a reaches deployed, so node-b is not a first node
        let mut node_a = h.ledger.get_node("node-a").await.unwrap().unwrap();
        node_a.status = NodeStatus::Deployed;
        h.ledger.upsert_node(&node_a).await.unwrap();

        h.orchestrator.provision(node_spec("node-b")).await.unwrap();
        let node_b = h.ledger.get_node("node-b").await.unwrap().unwrap();
        assert_eq!(node_b.addresses.len(), 4);
        assert!(node_b.address(AddressType::Cluster).is_none());
        assert!(node_b.cluster_name.is_none());

        let records = h.ledger.name_records_for_node("node-b").await.unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_first_provisions_single_founding_winner() {
        let h = harness();

        let (a, b) = tokio::join!(
            h.orchestrator.provision(node_spec("node-a")),
            h.orchestrator.provision(node_spec("node-b")),
        );
        a.unwrap();
        b.unwrap();

        let nodes = h.ledger.list_nodes().await.unwrap();
        let cluster_holders: Vec<&str> = nodes
            .iter()
            .filter(|n| n.address(AddressType::Cluster).is_some())
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(cluster_holders.len(), 1, "exactly one founding node");

        let cluster = h.ledger.get_cluster("cluster01").await.unwrap().unwrap();
        assert_eq!(cluster.founding_node, cluster_holders[0]);
    }

    #[tokio::test]
    async fn test_allocation_failure_unwinds_step_one_completely() {
        let h = harness();
        // Every cluster offset is already held, so the last allocation of the
        // founding node runs out of range
        for offset in 200..=210 {
            h.cloud.add_reservation("subnet-mgmt", &format!("10.0.0.{}", offset));
        }
        let seeded = h.cloud.reservation_count();

        let result = h.orchestrator.provision(node_spec("node-a")).await;
        match result {
            Err(LifecycleError::Provisioning { step, node, source }) => {
                assert_eq!(step, ProvisionStep::AllocateAddresses);
                assert_eq!(node, "node-a");
                assert!(matches!(*source, LifecycleError::Capacity { .. }));
            }
            other => panic!("expected step-tagged capacity error, got {:?}", other.err()),
        }

        // No durable partial state: provider reservations released, rows gone
        assert_eq!(h.cloud.reservation_count(), seeded);
        assert!(h.ledger.get_node("node-a").await.unwrap().is_none());
        assert!(h.ledger.reservations_for_node("node-a").await.unwrap().is_empty());
        assert!(h.ledger.get_cluster("cluster01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interface_failure_surfaces_error_without_self_unwind() {
        let h = harness();
        h.cloud.fail_once("create_vnic", "vnic quota exceeded");

        let result = h.orchestrator.provision(node_spec("node-a")).await;
        match result {
            Err(LifecycleError::Provisioning { step, .. }) => {
                assert_eq!(step, ProvisionStep::CreateInterfaces);
            }
            other => panic!("expected step-tagged error, got {:?}", other.err()),
        }

        // Durable partial state remains for the compensation engine
        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Provisioning);
        assert_eq!(node.addresses.len(), 5);
        assert_eq!(h.ledger.name_records_for_node("node-a").await.unwrap().len(), 5);
        assert!(h.cloud.reservation_count() >= 5);
    }

    #[tokio::test]
    async fn test_existing_name_requires_cleanup_first() {
        let h = harness();
        h.orchestrator.provision(node_spec("node-a")).await.unwrap();

        let again = h.orchestrator.provision(node_spec("node-a")).await;
        assert!(matches!(again, Err(LifecycleError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reprovision_allowed_after_cleanup() {
        let h = harness();
        h.orchestrator.provision(node_spec("node-a")).await.unwrap();
        let report = h.compensation.cleanup_node("node-a").await;
        assert!(report.success);

        h.orchestrator.provision(node_spec("node-a")).await.unwrap();
        let node = h.ledger.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Provisioning);
    }

    #[tokio::test]
    async fn test_malformed_name_rejected_before_side_effects() {
        let h = harness();
        for bad in ["", "node a", "-node", "node_a"] {
            let result = h.orchestrator.provision(node_spec(bad)).await;
            assert!(matches!(result, Err(LifecycleError::Validation(_))), "{:?}", bad);
        }
        assert_eq!(h.cloud.reservation_count(), 0);
        assert!(h.ledger.list_nodes().await.unwrap().is_empty());
    }
}

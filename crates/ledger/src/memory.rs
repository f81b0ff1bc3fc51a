//! In-process ledger
//!
//! Keeps every table in memory behind a mutex. Suitable for a single-process
//! deployment and for tests; durability belongs to a store implementing the
//! same trait.

use crate::error::LedgerError;
use crate::ledger_trait::Ledger;
use crate::models::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory `Ledger` implementation
#[derive(Clone, Default)]
pub struct MemoryLedger {
    nodes: Arc<Mutex<HashMap<String, NodeRecord>>>,
    reservations: Arc<Mutex<HashMap<String, ReservationRecord>>>,
    name_records: Arc<Mutex<HashMap<String, NameRecord>>>,
    interfaces: Arc<Mutex<HashMap<String, InterfaceRecord>>>,
    events: Arc<Mutex<Vec<DeploymentEvent>>>,
    clusters: Arc<Mutex<HashMap<String, ClusterRecord>>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn upsert_node(&self, node: &NodeRecord) -> Result<(), LedgerError> {
        self.nodes
            .lock()
            .unwrap()
            .insert(node.name.clone(), node.clone());
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<NodeRecord>, LedgerError> {
        Ok(self.nodes.lock().unwrap().get(name).cloned())
    }

    async fn find_node_by_address(&self, address: &str) -> Result<Option<NodeRecord>, LedgerError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .find(|n| n.addresses.values().any(|b| b.address == address))
            .cloned())
    }

    async fn find_node_by_server_id(
        &self,
        server_id: &str,
    ) -> Result<Option<NodeRecord>, LedgerError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .find(|n| n.server_id.as_deref() == Some(server_id))
            .cloned())
    }

    async fn find_nodes_by_name_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<NodeRecord>, LedgerError> {
        let mut nodes: Vec<NodeRecord> = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.name.starts_with(prefix))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn list_nodes_by_status(
        &self,
        statuses: &[NodeStatus],
    ) -> Result<Vec<NodeRecord>, LedgerError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| statuses.contains(&n.status))
            .cloned()
            .collect())
    }

    async fn count_nodes_by_status(&self, status: &NodeStatus) -> Result<u64, LedgerError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.status == *status)
            .count() as u64)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, LedgerError> {
        Ok(self.nodes.lock().unwrap().values().cloned().collect())
    }

    async fn delete_node(&self, name: &str) -> Result<(), LedgerError> {
        self.nodes.lock().unwrap().remove(name);
        Ok(())
    }

    async fn insert_reservation(&self, row: &ReservationRecord) -> Result<(), LedgerError> {
        let mut reservations = self.reservations.lock().unwrap();
        if reservations
            .values()
            .any(|r| r.address == row.address && r.address_type == row.address_type)
        {
            return Err(LedgerError::Conflict(format!(
                "active {} reservation already holds {}",
                row.address_type, row.address
            )));
        }
        reservations.insert(row.reservation_id.clone(), row.clone());
        Ok(())
    }

    async fn reservations_for_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<ReservationRecord>, LedgerError> {
        let mut rows: Vec<ReservationRecord> = self
            .reservations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.node_name == node_name)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.address_type);
        Ok(rows)
    }

    async fn delete_reservation(&self, reservation_id: &str) -> Result<(), LedgerError> {
        self.reservations.lock().unwrap().remove(reservation_id);
        Ok(())
    }

    async fn insert_name_record(&self, row: &NameRecord) -> Result<(), LedgerError> {
        self.name_records
            .lock()
            .unwrap()
            .insert(row.record_id.clone(), row.clone());
        Ok(())
    }

    async fn name_records_for_node(&self, node_name: &str) -> Result<Vec<NameRecord>, LedgerError> {
        let mut rows: Vec<NameRecord> = self
            .name_records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.node_name == node_name)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn delete_name_record(&self, record_id: &str) -> Result<(), LedgerError> {
        self.name_records.lock().unwrap().remove(record_id);
        Ok(())
    }

    async fn insert_interface(&self, row: &InterfaceRecord) -> Result<(), LedgerError> {
        self.interfaces
            .lock()
            .unwrap()
            .insert(row.interface_id.clone(), row.clone());
        Ok(())
    }

    async fn interfaces_for_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<InterfaceRecord>, LedgerError> {
        Ok(self
            .interfaces
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.node_name == node_name)
            .cloned()
            .collect())
    }

    async fn delete_interface(&self, interface_id: &str) -> Result<(), LedgerError> {
        self.interfaces.lock().unwrap().remove(interface_id);
        Ok(())
    }

    async fn append_event(&self, event: &DeploymentEvent) -> Result<(), LedgerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn events_for_node(&self, node_name: &str) -> Result<Vec<DeploymentEvent>, LedgerError> {
        let mut events: Vec<DeploymentEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.node_name == node_name)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn earliest_event(
        &self,
        node_id: uuid::Uuid,
    ) -> Result<Option<DeploymentEvent>, LedgerError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.node_id == node_id)
            .min_by_key(|e| e.timestamp)
            .cloned())
    }

    async fn insert_cluster_if_absent(&self, row: &ClusterRecord) -> Result<bool, LedgerError> {
        let mut clusters = self.clusters.lock().unwrap();
        if clusters.contains_key(&row.name) {
            return Ok(false);
        }
        clusters.insert(row.name.clone(), row.clone());
        Ok(true)
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterRecord>, LedgerError> {
        Ok(self.clusters.lock().unwrap().get(name).cloned())
    }

    async fn update_cluster(&self, row: &ClusterRecord) -> Result<(), LedgerError> {
        let mut clusters = self.clusters.lock().unwrap();
        if !clusters.contains_key(&row.name) {
            return Err(LedgerError::NotFound(format!(
                "cluster {} not found",
                row.name
            )));
        }
        clusters.insert(row.name.clone(), row.clone());
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<(), LedgerError> {
        self.clusters.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, LedgerError> {
        Ok(self.clusters.lock().unwrap().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reservation(id: &str, address: &str, address_type: AddressType) -> ReservationRecord {
        ReservationRecord {
            reservation_id: id.to_string(),
            address: address.to_string(),
            address_type,
            node_name: "node-a".to_string(),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_reservation_of_same_type_conflicts() {
        let ledger = MemoryLedger::new();
        ledger
            .insert_reservation(&reservation("res-1", "10.0.0.10", AddressType::Management))
            .await
            .unwrap();

        let duplicate = ledger
            .insert_reservation(&reservation("res-2", "10.0.0.10", AddressType::Management))
            .await;
        assert!(matches!(duplicate, Err(LedgerError::Conflict(_))));

        // Same address under another type is allowed
        ledger
            .insert_reservation(&reservation("res-3", "10.0.0.10", AddressType::Cluster))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cluster_claim_is_first_writer_wins() {
        let ledger = MemoryLedger::new();
        let claim = ClusterRecord {
            name: "cluster01".to_string(),
            virtual_address: None,
            dns_name: None,
            founding_node: "node-a".to_string(),
            node_count: 1,
            status: ClusterStatus::Creating,
            created: Utc::now(),
        };
        assert!(ledger.insert_cluster_if_absent(&claim).await.unwrap());

        let rival = ClusterRecord {
            founding_node: "node-b".to_string(),
            ..claim.clone()
        };
        assert!(!ledger.insert_cluster_if_absent(&rival).await.unwrap());

        let stored = ledger.get_cluster("cluster01").await.unwrap().unwrap();
        assert_eq!(stored.founding_node, "node-a");
    }

    #[tokio::test]
    async fn address_lookup_resolves_any_binding() {
        let ledger = MemoryLedger::new();
        let mut node = NodeRecord::new("node-a");
        node.addresses.insert(
            AddressType::Cvm,
            AddressBinding {
                address: "10.0.0.12".to_string(),
                reservation_id: "res-9".to_string(),
            },
        );
        ledger.upsert_node(&node).await.unwrap();

        let found = ledger.find_node_by_address("10.0.0.12").await.unwrap();
        assert_eq!(found.map(|n| n.name), Some("node-a".to_string()));
        assert!(ledger.find_node_by_address("10.0.0.99").await.unwrap().is_none());
    }
}

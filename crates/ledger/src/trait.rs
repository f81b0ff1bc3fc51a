//! Ledger trait — the storage seam
//!
//! Every operation touches a single row; saga resumability comes from
//! idempotent upserts keyed by node name, not from transactions. The concrete
//! `MemoryLedger` implements this trait; a SQL store would slot in behind it.

use crate::error::LedgerError;
use crate::models::*;

/// Deployment ledger operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    // Node rows
    /// Insert or replace the row for `node.name`
    async fn upsert_node(&self, node: &NodeRecord) -> Result<(), LedgerError>;
    async fn get_node(&self, name: &str) -> Result<Option<NodeRecord>, LedgerError>;
    /// Resolve any bound address (management, ahv, cvm, workload, cluster) to its node
    async fn find_node_by_address(&self, address: &str) -> Result<Option<NodeRecord>, LedgerError>;
    async fn find_node_by_server_id(&self, server_id: &str) -> Result<Option<NodeRecord>, LedgerError>;
    /// LIKE 'prefix%' lookup for deployment membership
    async fn find_nodes_by_name_prefix(&self, prefix: &str) -> Result<Vec<NodeRecord>, LedgerError>;
    async fn list_nodes_by_status(&self, statuses: &[NodeStatus]) -> Result<Vec<NodeRecord>, LedgerError>;
    async fn count_nodes_by_status(&self, status: &NodeStatus) -> Result<u64, LedgerError>;
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, LedgerError>;
    /// Remove a node row outright. Only the in-call step-1 unwind uses this;
    /// everything later retires the row through `cleanup_completed` instead.
    async fn delete_node(&self, name: &str) -> Result<(), LedgerError>;

    // Reservation rows
    /// Insert a reservation row; rejects a second active reservation of the
    /// same type on the same address
    async fn insert_reservation(&self, row: &ReservationRecord) -> Result<(), LedgerError>;
    async fn reservations_for_node(&self, node_name: &str) -> Result<Vec<ReservationRecord>, LedgerError>;
    /// Retire a reservation row; absent rows are a no-op
    async fn delete_reservation(&self, reservation_id: &str) -> Result<(), LedgerError>;

    // Name-record rows
    async fn insert_name_record(&self, row: &NameRecord) -> Result<(), LedgerError>;
    async fn name_records_for_node(&self, node_name: &str) -> Result<Vec<NameRecord>, LedgerError>;
    /// Retire a name-record row; absent rows are a no-op
    async fn delete_name_record(&self, record_id: &str) -> Result<(), LedgerError>;

    // Interface rows
    async fn insert_interface(&self, row: &InterfaceRecord) -> Result<(), LedgerError>;
    async fn interfaces_for_node(&self, node_name: &str) -> Result<Vec<InterfaceRecord>, LedgerError>;
    /// Retire an interface row; absent rows are a no-op
    async fn delete_interface(&self, interface_id: &str) -> Result<(), LedgerError>;

    // Event log
    async fn append_event(&self, event: &DeploymentEvent) -> Result<(), LedgerError>;
    /// Events for a node name in ascending timestamp order, across incarnations
    async fn events_for_node(&self, node_name: &str) -> Result<Vec<DeploymentEvent>, LedgerError>;
    /// Earliest event of one node incarnation; its timestamp is the
    /// deployment start
    async fn earliest_event(&self, node_id: uuid::Uuid) -> Result<Option<DeploymentEvent>, LedgerError>;

    // Cluster rows
    /// Unique-name insert: returns true if this call created the row, false
    /// if a cluster with that name already exists. Serializes the
    /// founding-node decision.
    async fn insert_cluster_if_absent(&self, row: &ClusterRecord) -> Result<bool, LedgerError>;
    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterRecord>, LedgerError>;
    async fn update_cluster(&self, row: &ClusterRecord) -> Result<(), LedgerError>;
    /// Remove a cluster row; absent rows are a no-op
    async fn delete_cluster(&self, name: &str) -> Result<(), LedgerError>;
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, LedgerError>;
}

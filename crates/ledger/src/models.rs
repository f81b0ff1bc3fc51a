//! Ledger row types
//!
//! One struct per persisted table plus the shared lifecycle enums. Wire names
//! are camelCase to match the service API payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Address categories a node reserves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Hypervisor management network
    Management,
    /// AHV hypervisor address
    Ahv,
    /// Controller VM address
    Cvm,
    /// Workload/data network
    Workload,
    /// Cluster virtual address, reserved by the founding node only
    Cluster,
}

impl AddressType {
    /// The per-node types every provision reserves, in allocation order
    pub const NODE_TYPES: [AddressType; 4] = [
        AddressType::Management,
        AddressType::Ahv,
        AddressType::Cvm,
        AddressType::Workload,
    ];

    /// Suffix used in DNS record names and reservation display names
    pub fn suffix(self) -> &'static str {
        match self {
            AddressType::Management => "mgmt",
            AddressType::Ahv => "ahv",
            AddressType::Cvm => "cvm",
            AddressType::Workload => "workload",
            AddressType::Cluster => "cluster",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressType::Management => "management",
            AddressType::Ahv => "ahv",
            AddressType::Cvm => "cvm",
            AddressType::Workload => "workload",
            AddressType::Cluster => "cluster",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installer phases in their fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    IpxeBoot,
    ConfigDownload,
    FoundationStart,
    StorageDiscovery,
    ImageDownload,
    Installation,
    ClusterFormation,
    DnsRegistration,
    HealthValidation,
}

impl InstallPhase {
    /// All phases, in order
    pub const ALL: [InstallPhase; 9] = [
        InstallPhase::IpxeBoot,
        InstallPhase::ConfigDownload,
        InstallPhase::FoundationStart,
        InstallPhase::StorageDiscovery,
        InstallPhase::ImageDownload,
        InstallPhase::Installation,
        InstallPhase::ClusterFormation,
        InstallPhase::DnsRegistration,
        InstallPhase::HealthValidation,
    ];

    /// Zero-based position in the fixed phase order
    pub fn position(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstallPhase::IpxeBoot => "ipxe_boot",
            InstallPhase::ConfigDownload => "config_download",
            InstallPhase::FoundationStart => "foundation_start",
            InstallPhase::StorageDiscovery => "storage_discovery",
            InstallPhase::ImageDownload => "image_download",
            InstallPhase::Installation => "installation",
            InstallPhase::ClusterFormation => "cluster_formation",
            InstallPhase::DnsRegistration => "dns_registration",
            InstallPhase::HealthValidation => "health_validation",
        }
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstallPhase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown install phase: {}", s))
    }
}

/// Status carried by a phase report and by deployment events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    InProgress,
    Success,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Success => "success",
            PhaseStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(PhaseStatus::InProgress),
            "success" => Ok(PhaseStatus::Success),
            "failed" => Ok(PhaseStatus::Failed),
            other => Err(format!("unknown phase status: {}", other)),
        }
    }
}

/// Node lifecycle status
///
/// Transient installer progress is the composite `{phase}_{status}` marker,
/// so the row serializes the whole enum through its string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeStatus {
    /// Orchestration started, server not yet reporting
    Provisioning,
    /// Composite transient marker from phase ingestion, e.g. `ipxe_boot_in_progress`
    Installing(InstallPhase, PhaseStatus),
    /// Terminal success
    Deployed,
    /// Terminal failure reported by the installer
    Failed,
    /// Operator- or system-marked error
    Error,
    /// Phase budget exhausted with no terminal report
    TimedOut,
    /// Compensation finished for this node
    CleanupCompleted,
    /// Logically destroyed by decommission
    Decommissioned,
}

impl NodeStatus {
    /// Statuses the orphan reaper sweeps
    pub const ORPHANED: [NodeStatus; 3] =
        [NodeStatus::Failed, NodeStatus::Error, NodeStatus::TimedOut];

    /// True once no further phase reports are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Deployed
                | NodeStatus::Failed
                | NodeStatus::Error
                | NodeStatus::TimedOut
                | NodeStatus::CleanupCompleted
                | NodeStatus::Decommissioned
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Provisioning => f.write_str("provisioning"),
            NodeStatus::Installing(phase, status) => {
                write!(f, "{}_{}", phase.as_str(), status.as_str())
            }
            NodeStatus::Deployed => f.write_str("deployed"),
            NodeStatus::Failed => f.write_str("failed"),
            NodeStatus::Error => f.write_str("error"),
            NodeStatus::TimedOut => f.write_str("timed_out"),
            NodeStatus::CleanupCompleted => f.write_str("cleanup_completed"),
            NodeStatus::Decommissioned => f.write_str("decommissioned"),
        }
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for NodeStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        match s.as_str() {
            "provisioning" => return Ok(NodeStatus::Provisioning),
            "deployed" => return Ok(NodeStatus::Deployed),
            "failed" => return Ok(NodeStatus::Failed),
            "error" => return Ok(NodeStatus::Error),
            "timed_out" => return Ok(NodeStatus::TimedOut),
            "cleanup_completed" => return Ok(NodeStatus::CleanupCompleted),
            "decommissioned" => return Ok(NodeStatus::Decommissioned),
            _ => {}
        }
        for status in [PhaseStatus::InProgress, PhaseStatus::Success, PhaseStatus::Failed] {
            let tail = format!("_{}", status.as_str());
            if let Some(phase_str) = s.strip_suffix(&tail) {
                if let Ok(phase) = InstallPhase::from_str(phase_str) {
                    return Ok(NodeStatus::Installing(phase, status));
                }
            }
        }
        Err(format!("unknown node status: {}", s))
    }
}

/// An address a node holds, with the provider reservation backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBinding {
    pub address: String,
    pub reservation_id: String,
}

/// One bare-metal compute node and everything it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: Uuid,

    /// Unique node name; the upsert key for every orchestration step
    pub name: String,

    pub status: NodeStatus,

    /// Hardware profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Cluster role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_template: Option<String>,

    /// Cluster this node belongs to (set on the founding node at claim time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Provider server id, set once the bare-metal instance exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// Reserved addresses by type
    #[serde(default)]
    pub addresses: BTreeMap<AddressType, AddressBinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_interface_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_interface_id: Option<String>,

    /// Derived installer completion, 0..=100
    pub progress_percent: f64,

    /// Most recently reported installer phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<InstallPhase>,

    pub created: DateTime<Utc>,
}

impl NodeRecord {
    /// A fresh row at orchestration start
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: NodeStatus::Provisioning,
            profile: None,
            role: None,
            storage_template: None,
            cluster_name: None,
            server_id: None,
            addresses: BTreeMap::new(),
            management_interface_id: None,
            workload_interface_id: None,
            progress_percent: 0.0,
            current_phase: None,
            created: Utc::now(),
        }
    }

    /// The address bound for a given type, if reserved
    pub fn address(&self, address_type: AddressType) -> Option<&str> {
        self.addresses.get(&address_type).map(|b| b.address.as_str())
    }
}

/// A provider-tracked claim on one subnet address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    /// Provider reservation id (row key)
    pub reservation_id: String,
    pub address: String,
    pub address_type: AddressType,
    /// Owning node name
    pub node_name: String,
    pub created: DateTime<Utc>,
}

/// A DNS record a node owns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRecord {
    /// Provider record id (row key)
    pub record_id: String,
    pub name: String,
    pub record_type: String,
    pub value: String,
    /// Owning node name
    pub node_name: String,
    pub created: DateTime<Utc>,
}

/// Network interface categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Management,
    Workload,
}

/// A virtual network interface a node owns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRecord {
    /// Provider interface id (row key)
    pub interface_id: String,
    pub name: String,
    pub interface_type: InterfaceType,
    /// Owning node name
    pub node_name: String,
    pub created: DateTime<Utc>,
}

/// Append-only installer progress event
///
/// Never mutated. A node's deployment start is the earliest event timestamp
/// of its current row (`node_id`), so a re-provisioned name starts a fresh
/// clock while the named history stays queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    pub id: Uuid,
    /// Row id of the node incarnation this event belongs to
    pub node_id: Uuid,
    pub node_name: String,
    /// Phase string as reported; free-form for orchestrator bookkeeping events
    pub phase: String,
    pub status: PhaseStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentEvent {
    pub fn new(
        node: &NodeRecord,
        phase: impl Into<String>,
        status: PhaseStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node.id,
            node_name: node.name.clone(),
            phase: phase.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Cluster lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Creating,
    Created,
    Error,
}

/// One virtualization cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    /// Unique cluster name; inserting it is the founding-node claim
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
    pub founding_node: String,
    pub node_count: u32,
    pub status: ClusterStatus,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_round_trips_through_strings() {
        let composite = NodeStatus::Installing(InstallPhase::ImageDownload, PhaseStatus::InProgress);
        let s = String::from(composite.clone());
        assert_eq!(s, "image_download_in_progress");
        assert_eq!(NodeStatus::try_from(s).unwrap(), composite);

        let plain = NodeStatus::CleanupCompleted;
        assert_eq!(NodeStatus::try_from(String::from(plain.clone())).unwrap(), plain);
    }

    #[test]
    fn unknown_node_status_is_rejected() {
        assert!(NodeStatus::try_from("warming_up".to_string()).is_err());
        assert!(NodeStatus::try_from("not_a_phase_failed".to_string()).is_err());
    }

    #[test]
    fn phase_positions_follow_declaration_order() {
        assert_eq!(InstallPhase::IpxeBoot.position(), 0);
        assert_eq!(InstallPhase::HealthValidation.position(), 8);
        for pair in InstallPhase::ALL.windows(2) {
            assert!(pair[0].position() < pair[1].position());
        }
    }
}

//! Cloud provider API models
//!
//! These models match the provider's REST serializers for the resources the
//! node-lifecycle services touch: subnet address reservations, DNS records,
//! VNICs, and bare-metal instances. Provider identifiers are opaque strings.

use serde::{Deserialize, Serialize};

/// Subnet address reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IpReservation {
    pub id: String,
    pub subnet_id: String,
    /// Dotted-quad address without prefix length, e.g. "10.0.0.10"
    pub address: String,
    pub display_name: Option<String>,
    pub created: String, // ISO 8601 datetime
}

/// Request body for reserving an address in a subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReserveAddressRequest {
    pub address: String,
    pub display_name: Option<String>,
}

/// DNS zone record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DnsRecord {
    pub id: String,
    pub zone: String,
    pub name: String,
    pub record_type: DnsRecordType,
    pub value: String,
    pub ttl: u32,
    pub created: String, // ISO 8601 datetime
}

/// Request body for creating a DNS record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateDnsRecordRequest {
    pub zone: String,
    pub name: String,
    pub record_type: DnsRecordType,
    pub value: String,
    pub ttl: Option<u32>,
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "PTR")]
    Ptr,
}

/// Virtual network interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Vnic {
    pub id: String,
    pub display_name: String,
    pub subnet_id: String,
    /// Reservation whose address this interface carries
    pub reservation_id: String,
    pub security_policy_ids: Vec<String>,
    pub created: String, // ISO 8601 datetime
}

/// Request body for creating a VNIC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateVnicRequest {
    pub display_name: String,
    pub subnet_id: String,
    pub reservation_id: String,
    pub security_policy_ids: Vec<String>,
}

/// Bare-metal instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Instance {
    pub id: String,
    pub display_name: String,
    pub image_id: String,
    pub lifecycle_state: InstanceLifecycleState,
    /// VNICs attached at launch
    pub vnic_ids: Vec<String>,
    pub created: String, // ISO 8601 datetime
}

/// Request body for launching a bare-metal instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateInstanceRequest {
    pub display_name: String,
    pub image_id: String,
    pub vnic_ids: Vec<String>,
    /// Opaque bootstrap payload, base64-encoded
    pub user_data: Option<String>,
}

/// Provider-side instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceLifecycleState {
    Provisioning,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
}

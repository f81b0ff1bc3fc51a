//! CloudClient trait for mocking
//!
//! This trait abstracts the cloud provider client so the orchestrator,
//! compensation engine, and tests can swap implementations. The concrete
//! `CloudClient` implements it; unit tests use `MockCloudClient`.

use crate::error::CloudError;
use crate::models::*;

/// Trait for cloud provider API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Every call maps to exactly one provider request; deletes are expected to be
/// idempotent on the provider side or to report `NotFound`.
#[async_trait::async_trait]
pub trait CloudClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), CloudError>;

    // Address reservations
    async fn list_reservations(&self, subnet_id: &str) -> Result<Vec<IpReservation>, CloudError>;
    async fn reserve_address(&self, subnet_id: &str, request: ReserveAddressRequest) -> Result<IpReservation, CloudError>;
    async fn delete_reservation(&self, id: &str) -> Result<(), CloudError>;

    // DNS records
    async fn create_dns_record(&self, request: CreateDnsRecordRequest) -> Result<DnsRecord, CloudError>;
    async fn query_dns_records(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<DnsRecord>, CloudError>;
    async fn delete_dns_record(&self, id: &str) -> Result<(), CloudError>;

    // Network interfaces
    async fn create_vnic(&self, request: CreateVnicRequest) -> Result<Vnic, CloudError>;
    async fn delete_vnic(&self, id: &str) -> Result<(), CloudError>;

    // Bare-metal instances
    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<Instance, CloudError>;
    async fn get_instance(&self, id: &str) -> Result<Instance, CloudError>;
    async fn query_instances(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Instance>, CloudError>;
    async fn delete_instance(&self, id: &str) -> Result<(), CloudError>;
}

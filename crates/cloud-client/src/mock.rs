//! Mock CloudClient for unit testing
//!
//! This module provides a mock implementation of CloudClientTrait that can be
//! used in unit tests without a real provider. Resources live in memory, and
//! individual operations can be armed to fail once to exercise saga abort and
//! compensation paths.

use crate::cloud_trait::CloudClientTrait;
use crate::error::CloudError;
use crate::models::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock CloudClient for testing
///
/// Stores resources in memory and can be configured to return specific
/// failures for testing different scenarios.
#[derive(Clone)]
pub struct MockCloudClient {
    base_url: String,
    // In-memory storage for resources
    reservations: Arc<Mutex<HashMap<String, IpReservation>>>,
    dns_records: Arc<Mutex<HashMap<String, DnsRecord>>>,
    vnics: Arc<Mutex<HashMap<String, Vnic>>>,
    instances: Arc<Mutex<HashMap<String, Instance>>>,
    // Operations armed to fail exactly once: op name -> message
    fail_once: Arc<Mutex<HashMap<String, String>>>,
    // Counter for generating IDs
    next_id: Arc<Mutex<u64>>,
}

impl MockCloudClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reservations: Arc::new(Mutex::new(HashMap::new())),
            dns_records: Arc::new(Mutex::new(HashMap::new())),
            vnics: Arc::new(Mutex::new(HashMap::new())),
            instances: Arc::new(Mutex::new(HashMap::new())),
            fail_once: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// Arm an operation to fail once with the given message.
    ///
    /// Operation names match the trait methods: "reserve_address",
    /// "create_dns_record", "create_vnic", "create_instance",
    /// "delete_instance", etc.
    pub fn fail_once(&self, op: &str, message: &str) {
        self.fail_once
            .lock()
            .unwrap()
            .insert(op.to_string(), message.to_string());
    }

    fn take_failure(&self, op: &str) -> Option<CloudError> {
        self.fail_once
            .lock()
            .unwrap()
            .remove(op)
            .map(CloudError::Api)
    }

    /// Seed a provider-held reservation (for test setup)
    pub fn add_reservation(&self, subnet_id: &str, address: &str) -> IpReservation {
        let id = format!("res-{}", self.next_id());
        let reservation = IpReservation {
            id: id.clone(),
            subnet_id: subnet_id.to_string(),
            address: address.to_string(),
            display_name: None,
            created: Self::now(),
        };
        self.reservations.lock().unwrap().insert(id, reservation.clone());
        reservation
    }

    /// Number of reservations currently held (for assertions)
    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().unwrap().len()
    }

    /// Number of DNS records currently held (for assertions)
    pub fn dns_record_count(&self) -> usize {
        self.dns_records.lock().unwrap().len()
    }

    /// Number of VNICs currently held (for assertions)
    pub fn vnic_count(&self) -> usize {
        self.vnics.lock().unwrap().len()
    }

    /// Number of instances currently held (for assertions)
    pub fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CloudClientTrait for MockCloudClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), CloudError> {
        Ok(())
    }

    async fn list_reservations(&self, subnet_id: &str) -> Result<Vec<IpReservation>, CloudError> {
        if let Some(e) = self.take_failure("list_reservations") {
            return Err(e);
        }
        Ok(self
            .reservations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.subnet_id == subnet_id)
            .cloned()
            .collect())
    }

    async fn reserve_address(
        &self,
        subnet_id: &str,
        request: ReserveAddressRequest,
    ) -> Result<IpReservation, CloudError> {
        if let Some(e) = self.take_failure("reserve_address") {
            return Err(e);
        }
        let mut reservations = self.reservations.lock().unwrap();
        if reservations
            .values()
            .any(|r| r.subnet_id == subnet_id && r.address == request.address)
        {
            return Err(CloudError::Conflict(format!(
                "address {} already reserved in subnet {}",
                request.address, subnet_id
            )));
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let current = *next;
            *next += 1;
            format!("res-{}", current)
        };
        let reservation = IpReservation {
            id: id.clone(),
            subnet_id: subnet_id.to_string(),
            address: request.address,
            display_name: request.display_name,
            created: Self::now(),
        };
        reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn delete_reservation(&self, id: &str) -> Result<(), CloudError> {
        if let Some(e) = self.take_failure("delete_reservation") {
            return Err(e);
        }
        self.reservations
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("reservation {} not found", id)))
    }

    async fn create_dns_record(
        &self,
        request: CreateDnsRecordRequest,
    ) -> Result<DnsRecord, CloudError> {
        if let Some(e) = self.take_failure("create_dns_record") {
            return Err(e);
        }
        let id = format!("rec-{}", self.next_id());
        let record = DnsRecord {
            id: id.clone(),
            zone: request.zone,
            name: request.name,
            record_type: request.record_type,
            value: request.value,
            ttl: request.ttl.unwrap_or(300),
            created: Self::now(),
        };
        self.dns_records.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn query_dns_records(
        &self,
        filters: &[(&str, &str)],
        _fetch_all: bool,
    ) -> Result<Vec<DnsRecord>, CloudError> {
        if let Some(e) = self.take_failure("query_dns_records") {
            return Err(e);
        }
        Ok(self
            .dns_records
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                filters.iter().all(|(k, v)| match *k {
                    "zone" => r.zone == *v,
                    "name" => r.name == *v,
                    "name_contains" => r.name.contains(v),
                    "value" => r.value == *v,
                    _ => true,
                })
            })
            .cloned()
            .collect())
    }

    async fn delete_dns_record(&self, id: &str) -> Result<(), CloudError> {
        if let Some(e) = self.take_failure("delete_dns_record") {
            return Err(e);
        }
        self.dns_records
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("dns record {} not found", id)))
    }

    async fn create_vnic(&self, request: CreateVnicRequest) -> Result<Vnic, CloudError> {
        if let Some(e) = self.take_failure("create_vnic") {
            return Err(e);
        }
        let id = format!("vnic-{}", self.next_id());
        let vnic = Vnic {
            id: id.clone(),
            display_name: request.display_name,
            subnet_id: request.subnet_id,
            reservation_id: request.reservation_id,
            security_policy_ids: request.security_policy_ids,
            created: Self::now(),
        };
        self.vnics.lock().unwrap().insert(id, vnic.clone());
        Ok(vnic)
    }

    async fn delete_vnic(&self, id: &str) -> Result<(), CloudError> {
        if let Some(e) = self.take_failure("delete_vnic") {
            return Err(e);
        }
        self.vnics
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("vnic {} not found", id)))
    }

    async fn create_instance(
        &self,
        request: CreateInstanceRequest,
    ) -> Result<Instance, CloudError> {
        if let Some(e) = self.take_failure("create_instance") {
            return Err(e);
        }
        let id = format!("srv-{}", self.next_id());
        let instance = Instance {
            id: id.clone(),
            display_name: request.display_name,
            image_id: request.image_id,
            lifecycle_state: InstanceLifecycleState::Provisioning,
            vnic_ids: request.vnic_ids,
            created: Self::now(),
        };
        self.instances.lock().unwrap().insert(id, instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, id: &str) -> Result<Instance, CloudError> {
        if let Some(e) = self.take_failure("get_instance") {
            return Err(e);
        }
        self.instances
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("instance {} not found", id)))
    }

    async fn query_instances(
        &self,
        filters: &[(&str, &str)],
        _fetch_all: bool,
    ) -> Result<Vec<Instance>, CloudError> {
        if let Some(e) = self.take_failure("query_instances") {
            return Err(e);
        }
        Ok(self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|i| {
                filters.iter().all(|(k, v)| match *k {
                    "display_name" => i.display_name == *v,
                    _ => true,
                })
            })
            .cloned()
            .collect())
    }

    async fn delete_instance(&self, id: &str) -> Result<(), CloudError> {
        if let Some(e) = self.take_failure("delete_instance") {
            return Err(e);
        }
        let removed = self.instances.lock().unwrap().remove(id);
        match removed {
            Some(instance) => {
                // Instance teardown takes its attached VNICs with it,
                // like the real provider does.
                let mut vnics = self.vnics.lock().unwrap();
                for vnic_id in &instance.vnic_ids {
                    vnics.remove(vnic_id);
                }
                Ok(())
            }
            None => Err(CloudError::NotFound(format!("instance {} not found", id))),
        }
    }
}

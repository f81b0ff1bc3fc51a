//! Provisioning orchestrator
//!
//! The saga that turns a node specification into address reservations, DNS
//! records, network interfaces, and a running bare-metal server. Steps run in
//! strict order, each external call executes exactly once per attempt, and
//! every created identifier is persisted to the ledger as soon as the
//! provider returns it (idempotent upsert keyed by node name), so a later
//! cleanup or retry reads back exactly what exists.
//!
//! Failure policy: a step-1 failure unwinds only this call's reservations —
//! no durable state survives. From step 2 on the orchestrator does NOT
//! self-unwind; it surfaces a step-tagged error and the compensation engine
//! owns the teardown, because "create failed mid-way" and "created fully but
//! failed later" need the same reverse teardown.

use crate::allocator::AddressAllocator;
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, ProvisionStep};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use cloud_client::{
    CloudClientTrait, CreateDnsRecordRequest, CreateInstanceRequest, CreateVnicRequest,
    DnsRecordType,
};
use ledger::{
    AddressBinding, AddressType, ClusterRecord, ClusterStatus, DeploymentEvent, InterfaceRecord,
    InterfaceType, Ledger, NameRecord, NodeRecord, NodeStatus, PhaseStatus, ReservationRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_template: Option<String>,
    /// Hint forwarded to cluster tooling; not interpreted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_operation_hint: Option<String>,
}

/// What a successful `provision` returns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReceipt {
    pub node_id: Uuid,
    pub correlation_id: Uuid,
    pub estimated_completion: DateTime<Utc>,
}

/// Bootstrap payload handed to the installer as instance user data
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapData {
    node_id: Uuid,
    callback: String,
}

/// Sequences allocation, name registration, interface creation, persistence,
/// and bare-metal deployment
pub struct ProvisioningOrchestrator {
    cloud: Arc<dyn CloudClientTrait>,
    ledger: Arc<dyn Ledger>,
    config: Arc<LifecycleConfig>,
    allocator: AddressAllocator,
}

impl ProvisioningOrchestrator {
    pub fn new(
        cloud: Arc<dyn CloudClientTrait>,
        ledger: Arc<dyn Ledger>,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        let allocator = AddressAllocator::new(Arc::clone(&cloud), Arc::clone(&config));
        Self {
            cloud,
            ledger,
            config,
            allocator,
        }
    }

    /// Run the full provisioning saga for one node
    pub async fn provision(&self, spec: NodeSpec) -> Result<ProvisionReceipt, LifecycleError> {
        Self::validate_spec(&spec)?;
        if let Some(existing) = self.ledger.get_node(&spec.name).await? {
            if !matches!(
                existing.status,
                NodeStatus::CleanupCompleted | NodeStatus::Decommissioned
            ) {
                return Err(LifecycleError::Validation(format!(
                    "node {} already exists with status {}; clean it up before re-provisioning",
                    spec.name, existing.status
                )));
            }
        }

        let correlation_id = Uuid::new_v4();
        info!(
            "Provisioning node {} (correlation {})",
            spec.name, correlation_id
        );

        let mut node = NodeRecord::new(&spec.name);
        node.profile = spec.profile.clone();
        node.role = spec.role.clone();
        node.storage_template = spec.storage_template.clone();

        // Step 1: addresses. The founding claim is decided through the
        // ledger's unique cluster insert, not a bare count, so two
        // concurrent first provisions cannot both reserve a cluster address.
        let founding = self.claim_founding_role(&spec.name).await?;
        if founding {
            node.cluster_name = Some(self.config.cluster_name.clone());
        }
        if let Err(e) = self.allocate_addresses(&mut node, founding).await {
            self.unwind_allocation(&node, founding).await;
            return Err(e.in_step(ProvisionStep::AllocateAddresses, &spec.name));
        }

        // Step 2: DNS records
        if let Err(e) = self.register_names(&node).await {
            return Err(e.in_step(ProvisionStep::RegisterNames, &spec.name));
        }

        // Step 3: interfaces
        if let Err(e) = self.create_interfaces(&mut node).await {
            return Err(e.in_step(ProvisionStep::CreateInterfaces, &spec.name));
        }

        // Step 4: the completed row, still `provisioning`
        if let Err(e) = self.ledger.upsert_node(&node).await {
            return Err(
                LifecycleError::from(e).in_step(ProvisionStep::PersistNode, &spec.name)
            );
        }

        // Step 5: bare-metal server
        if let Err(e) = self.deploy_server(&mut node).await {
            return Err(e.in_step(ProvisionStep::DeployServer, &spec.name));
        }

        // Step 6: deployment-start event
        let start = DeploymentEvent::new(
            &node,
            "provisioning",
            PhaseStatus::InProgress,
            format!("bare-metal server {} requested", node.server_id.as_deref().unwrap_or("?")),
        );
        if let Err(e) = self.ledger.append_event(&start).await {
            return Err(LifecycleError::from(e).in_step(ProvisionStep::RecordEvent, &spec.name));
        }

        let estimated_completion = Utc::now()
            + chrono::Duration::from_std(self.config.phase_timeouts.total())
                .unwrap_or_else(|_| chrono::Duration::hours(3));
        info!(
            "Node {} provisioned: server {}, estimated completion {}",
            node.name,
            node.server_id.as_deref().unwrap_or("?"),
            estimated_completion
        );
        Ok(ProvisionReceipt {
            node_id: node.id,
            correlation_id,
            estimated_completion,
        })
    }

    fn validate_spec(spec: &NodeSpec) -> Result<(), LifecycleError> {
        if spec.name.is_empty() {
            return Err(LifecycleError::Validation("node name is required".to_string()));
        }
        if !spec
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
            || spec.name.starts_with('-')
        {
            return Err(LifecycleError::Validation(format!(
                "node name {} must be a DNS label (alphanumerics and dashes)",
                spec.name
            )));
        }
        Ok(())
    }

    /// Decide whether this node founds the cluster.
    ///
    /// "First node" means no node is deployed yet AND this call wins the
    /// unique-name cluster insert. The insert serializes concurrent first
    /// provisions; the loser proceeds without a cluster address.
    async fn claim_founding_role(&self, node_name: &str) -> Result<bool, LifecycleError> {
        let deployed = self
            .ledger
            .count_nodes_by_status(&NodeStatus::Deployed)
            .await?;
        if deployed > 0 {
            return Ok(false);
        }
        let claim = ClusterRecord {
            name: self.config.cluster_name.clone(),
            virtual_address: None,
            dns_name: Some(format!(
                "{}.{}",
                self.config.cluster_name, self.config.dns_zone
            )),
            founding_node: node_name.to_string(),
            node_count: 1,
            status: ClusterStatus::Creating,
            created: Utc::now(),
        };
        let won = self.ledger.insert_cluster_if_absent(&claim).await?;
        if won {
            info!(
                "Node {} claimed the founding role for cluster {}",
                node_name, self.config.cluster_name
            );
        }
        Ok(won)
    }

    /// Step 1 body: reserve every address, persisting each as it lands
    async fn allocate_addresses(
        &self,
        node: &mut NodeRecord,
        founding: bool,
    ) -> Result<(), LifecycleError> {
        self.ledger.upsert_node(node).await?;

        let mut claimed = HashSet::new();
        let mut types: Vec<AddressType> = AddressType::NODE_TYPES.to_vec();
        if founding {
            types.push(AddressType::Cluster);
        }

        for address_type in types {
            let reservation = self
                .allocator
                .allocate(&node.name, address_type, &mut claimed)
                .await?;
            // Bind on the row first so a persistence failure still unwinds
            // the provider reservation
            node.addresses.insert(
                address_type,
                AddressBinding {
                    address: reservation.address.clone(),
                    reservation_id: reservation.id.clone(),
                },
            );
            self.ledger
                .insert_reservation(&ReservationRecord {
                    reservation_id: reservation.id,
                    address: reservation.address,
                    address_type,
                    node_name: node.name.clone(),
                    created: Utc::now(),
                })
                .await?;
            self.ledger.upsert_node(node).await?;
        }

        if founding {
            if let Some(mut cluster) = self.ledger.get_cluster(&self.config.cluster_name).await? {
                cluster.virtual_address =
                    node.address(AddressType::Cluster).map(str::to_string);
                self.ledger.update_cluster(&cluster).await?;
            }
        }
        Ok(())
    }

    /// In-call unwind of a failed step 1: release what this call reserved and
    /// drop the rows, leaving no durable state behind.
    async fn unwind_allocation(&self, node: &NodeRecord, founding: bool) {
        for (address_type, binding) in &node.addresses {
            if let Err(e) = self.cloud.delete_reservation(&binding.reservation_id).await {
                warn!(
                    "Failed to release {} reservation {} while unwinding {}: {}",
                    address_type, binding.reservation_id, node.name, e
                );
            }
            if let Err(e) = self.ledger.delete_reservation(&binding.reservation_id).await {
                warn!(
                    "Failed to retire reservation row {} while unwinding {}: {}",
                    binding.reservation_id, node.name, e
                );
            }
        }
        if founding {
            match self.ledger.get_cluster(&self.config.cluster_name).await {
                Ok(Some(cluster)) if cluster.founding_node == node.name => {
                    if let Err(e) = self.ledger.delete_cluster(&cluster.name).await {
                        warn!("Failed to release founding claim for {}: {}", node.name, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read cluster row while unwinding {}: {}", node.name, e),
            }
        }
        if let Err(e) = self.ledger.delete_node(&node.name).await {
            warn!("Failed to drop node row while unwinding {}: {}", node.name, e);
        }
    }

    /// Step 2 body: one A-record per reserved address, the fixed cluster name
    /// for the cluster address
    async fn register_names(&self, node: &NodeRecord) -> Result<(), LifecycleError> {
        for (address_type, binding) in &node.addresses {
            let record_name = if *address_type == AddressType::Cluster {
                self.config.cluster_name.clone()
            } else {
                format!("{}-{}", node.name, address_type.suffix())
            };
            let record = self
                .cloud
                .create_dns_record(CreateDnsRecordRequest {
                    zone: self.config.dns_zone.clone(),
                    name: record_name.clone(),
                    record_type: DnsRecordType::A,
                    value: binding.address.clone(),
                    ttl: None,
                })
                .await
                .map_err(|e| LifecycleError::provider(format!("A-record {}", record_name), e))?;
            self.ledger
                .insert_name_record(&NameRecord {
                    record_id: record.id,
                    name: record_name,
                    record_type: "A".to_string(),
                    value: binding.address.clone(),
                    node_name: node.name.clone(),
                    created: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    /// Step 3 body: management and workload interfaces bound to their
    /// reservations
    async fn create_interfaces(&self, node: &mut NodeRecord) -> Result<(), LifecycleError> {
        let mgmt_id = self
            .create_interface(node, AddressType::Management, InterfaceType::Management)
            .await?;
        node.management_interface_id = Some(mgmt_id);
        self.ledger.upsert_node(node).await?;

        let wkld_id = self
            .create_interface(node, AddressType::Workload, InterfaceType::Workload)
            .await?;
        node.workload_interface_id = Some(wkld_id);
        self.ledger.upsert_node(node).await?;
        Ok(())
    }

    async fn create_interface(
        &self,
        node: &NodeRecord,
        address_type: AddressType,
        interface_type: InterfaceType,
    ) -> Result<String, LifecycleError> {
        let binding = node.addresses.get(&address_type).ok_or_else(|| {
            LifecycleError::Validation(format!(
                "node {} has no {} reservation to bind",
                node.name, address_type
            ))
        })?;
        let range = self.config.range(address_type)?;
        let policies = match interface_type {
            InterfaceType::Management => self.config.management_policy_ids.clone(),
            InterfaceType::Workload => self.config.workload_policy_ids.clone(),
        };
        let display_name = format!("{}-{}", node.name, address_type.suffix());
        let vnic = self
            .cloud
            .create_vnic(CreateVnicRequest {
                display_name: display_name.clone(),
                subnet_id: range.subnet_id.clone(),
                reservation_id: binding.reservation_id.clone(),
                security_policy_ids: policies,
            })
            .await
            .map_err(|e| LifecycleError::provider(format!("vnic {}", display_name), e))?;
        self.ledger
            .insert_interface(&InterfaceRecord {
                interface_id: vnic.id.clone(),
                name: display_name,
                interface_type,
                node_name: node.name.clone(),
                created: Utc::now(),
            })
            .await?;
        Ok(vnic.id)
    }

    /// Step 5 body: launch the bare-metal server with both interfaces and
    /// the bootstrap user data
    async fn deploy_server(&self, node: &mut NodeRecord) -> Result<(), LifecycleError> {
        let bootstrap = BootstrapData {
            node_id: node.id,
            callback: self.config.callback_url.clone(),
        };
        let user_data =
            base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(&bootstrap)?);

        let mut vnic_ids = Vec::new();
        vnic_ids.extend(node.management_interface_id.clone());
        vnic_ids.extend(node.workload_interface_id.clone());

        let instance = self
            .cloud
            .create_instance(CreateInstanceRequest {
                display_name: node.name.clone(),
                image_id: self.config.boot_image_id.clone(),
                vnic_ids,
                user_data: Some(user_data),
            })
            .await
            .map_err(|e| LifecycleError::provider(format!("server {}", node.name), e))?;

        node.server_id = Some(instance.id);
        self.ledger.upsert_node(node).await?;
        Ok(())
    }
}

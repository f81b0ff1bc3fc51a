//! Address allocator
//!
//! Finds a free address for one type by scanning its configured range in
//! ascending offset order. The scan reads the provider's reservation list —
//! never a local counter — so concurrent allocations against the same subnet
//! are caught either by the list or by a reserve-time conflict, which is
//! treated as "taken, keep scanning".

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use cloud_client::{CloudClientTrait, CloudError, IpReservation, ReserveAddressRequest};
use ledger::AddressType;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Scans subnet ranges for free addresses
pub struct AddressAllocator {
    cloud: Arc<dyn CloudClientTrait>,
    config: Arc<LifecycleConfig>,
}

impl AddressAllocator {
    pub fn new(cloud: Arc<dyn CloudClientTrait>, config: Arc<LifecycleConfig>) -> Self {
        Self { cloud, config }
    }

    /// Reserve the first free address of `address_type` for `node_name`.
    ///
    /// `claimed` carries the addresses already taken earlier in the same
    /// provisioning call, so one node never collides with itself when two
    /// types share a subnet. Successful reservations are added to it.
    pub async fn allocate(
        &self,
        node_name: &str,
        address_type: AddressType,
        claimed: &mut HashSet<String>,
    ) -> Result<IpReservation, LifecycleError> {
        let range = self.config.range(address_type)?;

        let held: HashSet<String> = self
            .cloud
            .list_reservations(&range.subnet_id)
            .await
            .map_err(|e| {
                LifecycleError::provider(format!("subnet {} reservations", range.subnet_id), e)
            })?
            .into_iter()
            .map(|r| r.address)
            .collect();

        for offset in range.offsets() {
            let address = range.address_at(offset).to_string();
            if held.contains(&address) || claimed.contains(&address) {
                continue;
            }

            let request = ReserveAddressRequest {
                address: address.clone(),
                display_name: Some(format!("{}-{}", node_name, address_type.suffix())),
            };
            match self.cloud.reserve_address(&range.subnet_id, request).await {
                Ok(reservation) => {
                    info!(
                        "Reserved {} address {} for node {} (offset {})",
                        address_type, address, node_name, offset
                    );
                    claimed.insert(address);
                    return Ok(reservation);
                }
                Err(CloudError::Conflict(msg)) => {
                    // Another caller won this offset between our list and our
                    // reserve; rescan continues at the next offset.
                    debug!(
                        "Offset {} ({}) taken mid-scan for {}: {}",
                        offset, address, node_name, msg
                    );
                    continue;
                }
                Err(e) => {
                    return Err(LifecycleError::provider(
                        format!("{} reservation {}", address_type, address),
                        e,
                    ));
                }
            }
        }

        Err(LifecycleError::Capacity {
            address_type,
            subnet_id: range.subnet_id.clone(),
        })
    }
}

//! Lifecycle error taxonomy
//!
//! One variant per failure class the services distinguish. Compensation never
//! surfaces these — it aggregates per-suboperation outcomes instead — so the
//! taxonomy covers configuration, provisioning, ingestion, and formation.

use cloud_client::CloudError;
use ledger::{AddressType, LedgerError};
use std::fmt;
use thiserror::Error;

/// Orchestrator saga steps, for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    AllocateAddresses,
    RegisterNames,
    CreateInterfaces,
    PersistNode,
    DeployServer,
    RecordEvent,
}

impl ProvisionStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisionStep::AllocateAddresses => "allocate_addresses",
            ProvisionStep::RegisterNames => "register_names",
            ProvisionStep::CreateInterfaces => "create_interfaces",
            ProvisionStep::PersistNode => "persist_node",
            ProvisionStep::DeployServer => "deploy_server",
            ProvisionStep::RecordEvent => "record_event",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the lifecycle core
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Missing or malformed required settings; fatal at startup, never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No free address left in the scanned range
    #[error("Capacity exhausted: no free {address_type} address in subnet {subnet_id}")]
    Capacity {
        address_type: AddressType,
        subnet_id: String,
    },

    /// A provider call failed; always carries the resource it was touching
    #[error("Provider call failed for {resource}: {source}")]
    ProviderCall {
        resource: String,
        #[source]
        source: CloudError,
    },

    /// Ledger failure; surfaced to the caller, no automatic compensation
    /// since node state is unknown
    #[error("Persistence failed: {0}")]
    Persistence(#[from] LedgerError),

    /// Malformed request or unknown node/address; rejected before side effects
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON serialization error (bootstrap payloads)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A saga step failed; names the step and node so the operator can invoke
    /// cleanup
    #[error("Provisioning step {step} failed for node {node}: {source}")]
    Provisioning {
        step: ProvisionStep,
        node: String,
        #[source]
        source: Box<LifecycleError>,
    },

    /// Remote-shell command failed during cluster formation
    #[error("Remote shell failed against {address}: {message}")]
    RemoteShell { address: String, message: String },
}

impl LifecycleError {
    /// Wrap an error with the saga step and node it occurred in
    pub fn in_step(self, step: ProvisionStep, node: &str) -> Self {
        LifecycleError::Provisioning {
            step,
            node: node.to_string(),
            source: Box::new(self),
        }
    }

    /// Tag a provider error with the resource being touched
    pub fn provider(resource: impl Into<String>, source: CloudError) -> Self {
        LifecycleError::ProviderCall {
            resource: resource.into(),
            source,
        }
    }
}

//! Cloud VPC REST API Client
//!
//! A Rust client library for the cloud resource provider used by the HCI
//! node-lifecycle services. Provides type-safe models and methods for
//! subnet address reservations, DNS records, virtual network interfaces,
//! and bare-metal instances.
//!
//! # Example
//!
//! ```no_run
//! use cloud_client::{CloudClient, CloudClientTrait, ReserveAddressRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client
//! let client = CloudClient::new(
//!     "https://vpc.cloud.example".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! // Reserve an address in a subnet
//! let request = ReserveAddressRequest {
//!     address: "10.0.0.10".to_string(),
//!     display_name: Some("node-a-management".to_string()),
//! };
//! let reservation = client.reserve_address("subnet-mgmt", request).await?;
//!
//! // List everything the provider holds in that subnet
//! let reservations = client.list_reservations("subnet-mgmt").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Address reservations**: reserve, list, and release subnet addresses
//! - **DNS records**: create, query, and delete zone records
//! - **Network interfaces**: create and delete VNICs bound to reservations
//! - **Bare-metal instances**: launch, query, and terminate servers
//! - **Pagination**: support for fetching all pages of large result sets

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cloud_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::CloudClient;
pub use common::PaginatedResponse;
pub use error::CloudError;
pub use models::*;
pub use cloud_trait::CloudClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockCloudClient;

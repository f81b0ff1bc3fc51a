//! Integration tests for the cloud client
//!
//! These tests require a reachable provider API.
//! Set CLOUD_API_URL and CLOUD_API_TOKEN environment variables to run.

use cloud_client::{CloudClient, CloudClientTrait, ReserveAddressRequest};

#[tokio::test]
#[ignore] // Requires a reachable provider API
async fn test_client_creation() {
    let url = std::env::var("CLOUD_API_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("CLOUD_API_TOKEN")
        .expect("CLOUD_API_TOKEN environment variable must be set");

    let client = CloudClient::new(url, token).expect("Failed to create client");

    client.validate_token().await.expect("Failed to validate token");
}

#[tokio::test]
#[ignore]
async fn test_list_reservations() {
    let url = std::env::var("CLOUD_API_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("CLOUD_API_TOKEN")
        .expect("CLOUD_API_TOKEN environment variable must be set");
    let subnet = std::env::var("CLOUD_TEST_SUBNET")
        .expect("CLOUD_TEST_SUBNET environment variable must be set");

    let client = CloudClient::new(url, token).expect("Failed to create client");

    let reservations = client.list_reservations(&subnet).await
        .expect("Failed to list reservations");

    println!("Found {} reservations", reservations.len());
}

#[tokio::test]
#[ignore]
async fn test_reserve_and_release() {
    let url = std::env::var("CLOUD_API_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("CLOUD_API_TOKEN")
        .expect("CLOUD_API_TOKEN environment variable must be set");
    let subnet = std::env::var("CLOUD_TEST_SUBNET")
        .expect("CLOUD_TEST_SUBNET environment variable must be set");
    let address = std::env::var("CLOUD_TEST_ADDRESS")
        .expect("CLOUD_TEST_ADDRESS environment variable must be set");

    let client = CloudClient::new(url, token).expect("Failed to create client");

    let reservation = client.reserve_address(&subnet, ReserveAddressRequest {
        address,
        display_name: Some("integration-test".to_string()),
    }).await.expect("Failed to reserve address");

    client.delete_reservation(&reservation.id).await
        .expect("Failed to release reservation");
}

//! Cloud provider API client
//!
//! Implements the REST client for the VPC provider endpoints the
//! node-lifecycle services consume: /v1/subnets, /v1/ip-reservations,
//! /v1/dns/records, /v1/vnics, and /v1/instances.

use crate::cloud_trait::CloudClientTrait;
use crate::common::{query::query_resources, HttpClient};
use crate::error::CloudError;
use crate::models::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Cloud provider API client
pub struct CloudClient {
    http: HttpClient,
}

impl CloudClient {
    /// Create a new cloud client
    ///
    /// # Arguments
    /// * `base_url` - Provider base URL (e.g., "https://vpc.cloud.example")
    /// * `token` - API token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CloudError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    /// Map a non-success response to the error taxonomy
    async fn handle_response<T: DeserializeOwned>(
        &self,
        op: &str,
        response: reqwest::Response,
    ) -> Result<T, CloudError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(CloudError::Http);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(op, status, body))
    }

    /// Like `handle_response` but for endpoints returning no body (deletes)
    async fn handle_empty(&self, op: &str, response: reqwest::Response) -> Result<(), CloudError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(op, status, body))
    }

    fn status_error(op: &str, status: reqwest::StatusCode, body: String) -> CloudError {
        match status.as_u16() {
            401 | 403 => CloudError::Authentication(format!("{}: {} - {}", op, status, body)),
            404 => CloudError::NotFound(format!("{}: {}", op, body)),
            409 => CloudError::Conflict(format!("{}: {}", op, body)),
            400 | 422 => CloudError::InvalidRequest(format!("{}: {}", op, body)),
            _ => CloudError::Api(format!("{}: {} - {}", op, status, body)),
        }
    }

    async fn get<T: DeserializeOwned>(&self, op: &str, path: &str) -> Result<T, CloudError> {
        debug!("GET {}", path);
        let response = self.http.client()
            .get(self.http.build_url(path))
            .header("Authorization", self.http.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;
        self.handle_response(op, response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        op: &str,
        path: &str,
        body: &B,
    ) -> Result<T, CloudError> {
        debug!("POST {}", path);
        let response = self.http.client()
            .post(self.http.build_url(path))
            .header("Authorization", self.http.auth_header())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        self.handle_response(op, response).await
    }

    async fn delete(&self, op: &str, path: &str) -> Result<(), CloudError> {
        debug!("DELETE {}", path);
        let response = self.http.client()
            .delete(self.http.build_url(path))
            .header("Authorization", self.http.auth_header())
            .send()
            .await?;
        self.handle_empty(op, response).await
    }
}

#[async_trait::async_trait]
impl CloudClientTrait for CloudClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate the API token by making a simple authenticated request.
    ///
    /// Tests connectivity and token validity before proceeding with
    /// operations, using the lightweight status endpoint.
    async fn validate_token(&self) -> Result<(), CloudError> {
        debug!("Validating provider token and connectivity");
        let response = self.http.client()
            .get(self.http.build_url("/v1/status"))
            .header("Authorization", self.http.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == 401 || status == 403 {
            return Err(CloudError::Authentication(format!(
                "Invalid token: {} - {}",
                status, body
            )));
        }

        if !status.is_success() {
            return Err(CloudError::Api(format!(
                "Failed to validate token: {} - {}",
                status, body
            )));
        }

        debug!("Token validated successfully");
        Ok(())
    }

    async fn list_reservations(&self, subnet_id: &str) -> Result<Vec<IpReservation>, CloudError> {
        self.http
            .fetch_all_pages(self.http.build_url(&format!(
                "/v1/subnets/{}/ip-reservations",
                subnet_id
            )))
            .await
    }

    async fn reserve_address(
        &self,
        subnet_id: &str,
        request: ReserveAddressRequest,
    ) -> Result<IpReservation, CloudError> {
        self.post(
            "reserve address",
            &format!("/v1/subnets/{}/ip-reservations", subnet_id),
            &request,
        )
        .await
    }

    async fn delete_reservation(&self, id: &str) -> Result<(), CloudError> {
        self.delete("delete reservation", &format!("/v1/ip-reservations/{}", id))
            .await
    }

    async fn create_dns_record(
        &self,
        request: CreateDnsRecordRequest,
    ) -> Result<DnsRecord, CloudError> {
        self.post("create dns record", "/v1/dns/records", &request).await
    }

    async fn query_dns_records(
        &self,
        filters: &[(&str, &str)],
        fetch_all: bool,
    ) -> Result<Vec<DnsRecord>, CloudError> {
        query_resources(&self.http, "dns/records", filters, fetch_all).await
    }

    async fn delete_dns_record(&self, id: &str) -> Result<(), CloudError> {
        self.delete("delete dns record", &format!("/v1/dns/records/{}", id))
            .await
    }

    async fn create_vnic(&self, request: CreateVnicRequest) -> Result<Vnic, CloudError> {
        self.post("create vnic", "/v1/vnics", &request).await
    }

    async fn delete_vnic(&self, id: &str) -> Result<(), CloudError> {
        self.delete("delete vnic", &format!("/v1/vnics/{}", id)).await
    }

    async fn create_instance(
        &self,
        request: CreateInstanceRequest,
    ) -> Result<Instance, CloudError> {
        self.post("create instance", "/v1/instances", &request).await
    }

    async fn get_instance(&self, id: &str) -> Result<Instance, CloudError> {
        self.get("get instance", &format!("/v1/instances/{}", id)).await
    }

    async fn query_instances(
        &self,
        filters: &[(&str, &str)],
        fetch_all: bool,
    ) -> Result<Vec<Instance>, CloudError> {
        query_resources(&self.http, "instances", filters, fetch_all).await
    }

    async fn delete_instance(&self, id: &str) -> Result<(), CloudError> {
        self.delete("delete instance", &format!("/v1/instances/{}", id))
            .await
    }
}

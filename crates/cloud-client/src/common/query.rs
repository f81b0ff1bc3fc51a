//! Query utilities for the cloud API
//!
//! Provides helpers for building queries and handling pagination.

use crate::common::{HttpClient, PaginatedResponse};
use crate::error::CloudError;
use serde::Deserialize;

/// Query resources with optional filtering and pagination
pub async fn query_resources<T: for<'de> Deserialize<'de>>(
    http: &HttpClient,
    endpoint: &str,
    filters: &[(&str, &str)],
    fetch_all: bool,
) -> Result<Vec<T>, CloudError> {
    let mut url = format!("/v1/{}", endpoint);

    if !filters.is_empty() {
        let query_string = http.build_query_string(filters);
        url = format!("{}?{}", url, query_string);
    }

    if fetch_all {
        http.fetch_all_pages(http.build_url(&url)).await
    } else {
        let response = http.client()
            .get(http.build_url(&url))
            .header("Authorization", http.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Api(format!(
                "Failed to query {}: {} - {}",
                endpoint, status, body
            )));
        }

        let page: PaginatedResponse<T> = response.json().await?;
        Ok(page.results)
    }
}

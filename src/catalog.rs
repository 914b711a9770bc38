//! Bucket Catalog Client
//!
//! Read-only HTTP client for the server's bucket catalog. The catalog only
//! seeds the list of selectable buckets; whether a bucket is active is
//! derived from registry membership, never stored.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::registry::SubscriptionRegistry;

/// A named metric stream the user can choose to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Unique bucket name
    pub name: String,
}

impl Bucket {
    /// Whether this bucket is currently subscribed.
    pub fn is_active(&self, registry: &SubscriptionRegistry) -> bool {
        registry.has_bucket(&self.name)
    }
}

/// Errors from catalog requests.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("catalog request timed out")]
    Timeout,

    #[error("catalog unavailable")]
    Unavailable,

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("invalid catalog payload: {0}")]
    Decode(String),
}

/// HTTP client for the bucket catalog endpoint.
pub struct CatalogClient {
    client: Client,
    base_url: String,
}

impl CatalogClient {
    /// Create a client rooted at `base_url` with a request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the available buckets.
    pub async fn fetch_buckets(&self) -> Result<Vec<Bucket>, CatalogError> {
        let url = format!("{}/api/buckets", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CatalogError::Timeout
            } else if e.is_connect() {
                CatalogError::Unavailable
            } else {
                CatalogError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let buckets = response
            .json::<Vec<Bucket>>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;

        tracing::debug!(count = buckets.len(), "fetched bucket catalog");
        Ok(buckets)
    }
}

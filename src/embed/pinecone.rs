use crate::embed::{VectorIndex, VectorPoint};
use crate::error::{LorevatError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorPoint],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

/// Pinecone serverless index client.
///
/// Upserts go to the index's data-plane host (`https://<index>-<project>.svc.
/// <region>.pinecone.io`) with the API key in the `Api-Key` header.
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl PineconeIndex {
    pub fn new(host: String, api_key: String, namespace: Option<String>) -> Result<Self> {
        let host = host.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LorevatError::Upsert(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, host, api_key, namespace })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest {
            vectors: &points,
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.host))
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LorevatError::Upsert(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(LorevatError::Upsert(format!(
                "Pinecone upsert failed {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

//! Client for a text-embeddings-inference style `/embed` server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::models::{DEFAULT_TEI_URL, EmbeddingConfig};

/// Instruction type for embedding generation.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum InstructionType {
    Document,
    Query,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
    instruction_type: InstructionType,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Body of `/info`. Servers that omit it are still considered healthy.
#[derive(Debug, Default, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    model_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeiProvider {
    client: Client,
    base_url: String,
    batch_size: usize,
    dimension: usize,
    query_prefix: Option<String>,
}

impl TeiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config
                .url
                .as_deref()
                .unwrap_or(DEFAULT_TEI_URL)
                .trim_end_matches('/')
                .to_string(),
            batch_size: (config.batch_size as usize).max(1),
            dimension: config.dimension as usize,
            query_prefix: config.query_prefix.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_with_type(
        &self,
        texts: &[String],
        instruction_type: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = EmbedRequest {
                inputs: batch,
                truncate: Some(true),
                instruction_type,
            };

            let response = self
                .client
                .post(format!("{}/embed", self.base_url))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EmbeddingError::Timeout
                    } else if e.is_connect() {
                        EmbeddingError::ConnectionError(e.to_string())
                    } else {
                        EmbeddingError::RequestError(e)
                    }
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::ServerError(format!(
                    "status {}: {}",
                    status, body
                )));
            }

            let EmbedResponse(embeddings) = response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for TeiProvider {
    fn name(&self) -> &str {
        "tei"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_with_type(texts, InstructionType::Document).await
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServerError(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }

        if let Ok(info) = self.client.get(format!("{}/info", self.base_url)).send().await {
            let info: InfoResponse = info.json().await.unwrap_or_default();
            debug!(url = %self.base_url, model = ?info.model_id, "embedding server healthy");
        }
        Ok(())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let query = match &self.query_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };
        self.embed_with_type(&[query], InstructionType::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

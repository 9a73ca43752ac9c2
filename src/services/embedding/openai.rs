//! OpenAI-compatible `/v1/embeddings` provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::{ConfigError, EmbeddingError};
use crate::models::{DEFAULT_OPENAI_URL, EmbeddingConfig, OPENAI_API_KEY_ENV};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Only the text-embedding-3 family accepts a reduced size.
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingCredential(format!(
                    "{OPENAI_API_KEY_ENV} is required for the openai embedding provider"
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        let base_url = config
            .url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url,
            dimension: config.dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn requested_dimensions(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }

    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions(),
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
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

        let mut parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(model = %self.model, inputs = batch.len(), "requesting embeddings");
            embeddings.extend(self.embed_single_batch(batch).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let provider = OpenAiProvider::new(&config()).unwrap();
        assert_eq!(provider.base_url(), DEFAULT_OPENAI_URL);
        assert_eq!(provider.dimension(), 3072);
        assert_eq!(provider.requested_dimensions(), Some(3072));
    }

    #[test]
    fn test_base_url_trimming() {
        let provider = OpenAiProvider::new(&EmbeddingConfig {
            url: Some("http://localhost:8080/".to_string()),
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            ..config()
        })
        .unwrap();
        assert_eq!(provider.base_url(), "http://localhost:8080");
        assert_eq!(provider.requested_dimensions(), None);
    }

    #[test]
    fn test_blank_key_is_missing() {
        let result = OpenAiProvider::new(&EmbeddingConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(EmbeddingError::Config(ConfigError::MissingCredential(_)))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["hello".to_string()];
        let request = EmbedRequest {
            model: "text-embedding-3-large",
            input: &input,
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-3-large", "input": ["hello"]})
        );
    }
}

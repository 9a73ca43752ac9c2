//! Embedding providers.
//!
//! Every provider maps text to a vector of a fixed, declared dimension. The
//! provider is chosen by the `embedding.provider` key through
//! [`create_provider`].

mod onnx;
mod openai;
mod tei;

pub use onnx::{OnnxEmbeddingModel, OnnxProvider};
pub use openai::OpenAiProvider;
pub use tei::TeiProvider;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigError, EmbeddingError};
use crate::models::EmbeddingConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed documents, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Whether the backing service answers. Local and hosted providers
    /// without a health endpoint report healthy.
    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }

    /// Embed a search query. Providers with instruction-tuned models override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }
}

/// Provider keys known to [`create_provider`].
pub const PROVIDERS: [&str; 3] = ["openai", "tei", "onnx"];

/// Build the provider named by `config.provider`.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "tei" | "http" => Ok(Arc::new(TeiProvider::new(config)?)),
        "onnx" => Ok(Arc::new(OnnxProvider::load(config)?)),
        other => Err(ConfigError::unsupported("embedding provider", other).into()),
    }
}

/// Normalize a vector to unit length.
pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "bedrock".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(
            err,
            EmbeddingError::Config(ConfigError::UnsupportedType { kind: "embedding provider", .. })
        ));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(
            err,
            EmbeddingError::Config(ConfigError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_tei_provider_builds() {
        let config = EmbeddingConfig {
            provider: "tei".to_string(),
            dimension: 1024,
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "tei");
        assert_eq!(provider.dimension(), 1024);
    }

    #[test]
    fn test_normalize() {
        let v = normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}

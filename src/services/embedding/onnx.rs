//! Local ONNX Runtime embedding model.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::{EmbeddingProvider, normalize};
use crate::error::{ConfigError, EmbeddingError, ModelError};
use crate::models::EmbeddingConfig;

pub struct OnnxEmbeddingModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxEmbeddingModel {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.display().to_string()));
        }
        if !tokenizer_path.exists() {
            return Err(ModelError::NotFound(tokenizer_path.display().to_string()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(model = %model_path.display(), dimension = config.dimension, "loaded ONNX model");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension as usize,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut position_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
                position_ids[i * max_len + j] = j as i64;
            }
        }

        // Index of the last real token per row, for last-token pooling.
        let last_tokens: Vec<usize> = encodings
            .iter()
            .map(|e| {
                e.get_attention_mask()
                    .iter()
                    .rposition(|&m| m == 1)
                    .unwrap_or(0)
            })
            .collect();

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let position_ids_tensor = Tensor::from_array(([batch_size, max_len], position_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                position_ids_tensor
            ])
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let shape = output_array.shape();
        let width = *shape.last().unwrap_or(&0);
        if width < self.dimension {
            return Err(ModelError::InferenceError(format!(
                "model output has {} dimensions, configured {}",
                width, self.dimension
            )));
        }

        let embeddings = match shape.len() {
            3 => (0..batch_size)
                .map(|i| {
                    let last = last_tokens[i];
                    let embedding: Vec<f32> = (0..self.dimension)
                        .map(|d| output_array[[i, last, d]])
                        .collect();
                    normalize(&embedding)
                })
                .collect(),
            2 => (0..batch_size)
                .map(|i| {
                    let embedding: Vec<f32> =
                        (0..self.dimension).map(|d| output_array[[i, d]]).collect();
                    normalize(&embedding)
                })
                .collect(),
            _ => {
                return Err(ModelError::InferenceError(format!(
                    "unexpected output shape: {:?}",
                    shape
                )));
            }
        };

        Ok(embeddings)
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// [`EmbeddingProvider`] over an in-process [`OnnxEmbeddingModel`].
/// Inference runs on the blocking thread pool.
pub struct OnnxProvider {
    model: Arc<OnnxEmbeddingModel>,
    batch_size: usize,
    query_prefix: Option<String>,
}

impl OnnxProvider {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_path.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(
                "embedding.model_path is required for the onnx provider".to_string(),
            )
        })?;

        let model = OnnxEmbeddingModel::load(config, model_dir)?;
        Ok(Self {
            model: Arc::new(model),
            batch_size: (config.batch_size as usize).max(1),
            query_prefix: config.query_prefix.clone(),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut embeddings = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size) {
                embeddings.extend(model.embed(batch)?);
            }
            Ok::<_, ModelError>(embeddings)
        })
        .await
        .map_err(|e| ModelError::InferenceError(format!("inference task failed: {e}")))?
        .map_err(EmbeddingError::from)
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxProvider {
    fn name(&self) -> &str {
        "onnx"
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.to_vec()).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let query = match &self.query_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };
        self.run(vec![query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_path() {
        let config = EmbeddingConfig {
            provider: "onnx".to_string(),
            ..Default::default()
        };
        let err = OnnxProvider::load(&config).err().unwrap();
        assert!(matches!(
            err,
            EmbeddingError::Config(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            provider: "onnx".to_string(),
            model_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = OnnxProvider::load(&config).err().unwrap();
        assert!(matches!(err, EmbeddingError::Model(ModelError::NotFound(_))));
    }
}

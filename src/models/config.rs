use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_PROVIDER: &str = "openai";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 3072;
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_TEI_URL: &str = "http://localhost:11411";
pub const DEFAULT_VECTOR_DRIVER: &str = "qdrant";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_INDEX_NAME: &str = "rags-index";
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 40;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";
pub const DATABASE_URL_ENV: &str = "RAGS_DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rags").join("config.toml"))
    }

    /// Load the user config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Fill credentials from the process environment. Values already present
    /// in the file win.
    #[must_use]
    pub fn with_env_credentials(mut self) -> Self {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var(OPENAI_API_KEY_ENV).ok();
        }
        if self.vector_store.api_key.is_none() {
            self.vector_store.api_key = std::env::var(QDRANT_API_KEY_ENV).ok();
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV)
            && matches!(
                self.vector_store.driver.parse::<VectorDriver>(),
                Ok(VectorDriver::Postgres)
            )
        {
            self.vector_store.url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.ingest.validate()?;

        let expected = self.vector_store.index.dimension as usize;
        let actual = self.embedding.dimension as usize;
        if expected != actual {
            return Err(ConfigError::DimensionMismatch { expected, actual });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.search.default_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "search.default_top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider key: `openai`, `tei` or `onnx`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    /// Base URL for HTTP providers. Each provider has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Prepended to queries, not documents. Used by instruction-tuned models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_prefix: Option<String>,
}

fn default_embedding_provider() -> String {
    DEFAULT_EMBEDDING_PROVIDER.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    16
}

fn default_max_tokens() -> u32 {
    8192
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            url: None,
            api_key: None,
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
            model_path: None,
            query_prefix: None,
        }
    }
}

/// Vector store backends known to the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDriver {
    Memory,
    Qdrant,
    Postgres,
}

impl FromStr for VectorDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(VectorDriver::Memory),
            "qdrant" => Ok(VectorDriver::Qdrant),
            "postgres" | "postgresql" | "pgvector" => Ok(VectorDriver::Postgres),
            other => Err(ConfigError::unsupported("vector store driver", other)),
        }
    }
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Memory => write!(f, "memory"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Driver key: `memory`, `qdrant` or `postgres`.
    #[serde(default = "default_vector_driver")]
    pub driver: String,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// PostgreSQL schema for the vector table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,

    #[serde(default)]
    pub index: IndexConfig,
}

fn default_vector_driver() -> String {
    DEFAULT_VECTOR_DRIVER.to_string()
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: default_vector_driver(),
            url: default_qdrant_url(),
            api_key: None,
            schema: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
            index: IndexConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    Dot,
}

impl FromStr for DistanceMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "euclid" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot" | "inner" => Ok(DistanceMetric::Dot),
            other => Err(ConfigError::unsupported("distance metric", other)),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Dot => write!(f, "dot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default)]
    pub distance_metric: DistanceMetric,

    /// Stored with each vector but never indexed for filtering.
    #[serde(default = "default_non_filterable_keys")]
    pub non_filterable_metadata_keys: Vec<String>,
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_non_filterable_keys() -> Vec<String> {
    vec!["content".to_string(), "source".to_string()]
}

impl IndexConfig {
    pub fn is_filterable(&self, key: &str) -> bool {
        !self.non_filterable_metadata_keys.iter().any(|k| k == key)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            dimension: default_embedding_dimension(),
            distance_metric: DistanceMetric::default(),
            non_filterable_metadata_keys: default_non_filterable_keys(),
        }
    }
}

/// Smallest unit a chunk boundary may fall on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Paragraph,
    Sentence,
    #[default]
    Word,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of the previous chunk repeated at the start of the next one.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub min_granularity: Granularity,

    /// Chunks counting more tokens than this are re-split.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Chunks larger than this many UTF-8 bytes are re-split.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// `tokenizer.json` used to count tokens. Without it counts are estimated
    /// from byte-level pre-tokenization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_chunk_size() -> usize {
    6000
}

fn default_chunk_overlap() -> usize {
    500
}

fn default_token_limit() -> usize {
    8192
}

fn default_max_chunk_bytes() -> usize {
    40960
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.token_limit must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_bytes < 4 {
            return Err(ConfigError::ValidationError(
                "chunking.max_chunk_bytes must hold at least one character (4 bytes)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_granularity: Granularity::default(),
            token_limit: default_token_limit(),
            max_chunk_bytes: default_max_chunk_bytes(),
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Embedding calls in flight per document.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// Drop and recreate the index before filling it.
    #[serde(default)]
    pub recreate_index: bool,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default)]
    pub follow_links: bool,

    /// Attempts per embedding or upsert call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry, doubled per attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_upsert_batch_size() -> usize {
    DEFAULT_UPSERT_BATCH_SIZE
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.concurrency must be at least 1".to_string(),
            ));
        }
        if self.upsert_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.upsert_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            upsert_batch_size: default_upsert_batch_size(),
            recreate_index: false,
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            follow_links: false,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_format: OutputFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.vector_store.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(config.vector_store.index.dimension, 3072);
        assert_eq!(config.ingest.upsert_batch_size, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "tei"
            dimension = 1024

            [vector_store]
            driver = "memory"

            [vector_store.index]
            dimension = 1024
            distance_metric = "dot"

            [chunking]
            chunk_size = 800
            chunk_overlap = 100
            min_granularity = "sentence"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, "tei");
        assert_eq!(config.embedding.timeout_secs, 120);
        assert_eq!(config.vector_store.index.distance_metric, DistanceMetric::Dot);
        assert_eq!(config.vector_store.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(config.chunking.min_granularity, Granularity::Sentence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut config = Config::default();
        config.embedding.dimension = 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DimensionMismatch {
                expected: 3072,
                actual: 1024
            })
        ));
    }

    #[test]
    fn test_chunking_validation() {
        let ok = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 99,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let zero = ChunkingConfig {
            chunk_size: 0,
            chunk_overlap: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let overlap = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(overlap.validate().is_err());

        let tiny_bytes = ChunkingConfig {
            max_chunk_bytes: 2,
            ..Default::default()
        };
        assert!(tiny_bytes.validate().is_err());

        let no_tokens = ChunkingConfig {
            token_limit: 0,
            ..Default::default()
        };
        assert!(no_tokens.validate().is_err());
    }

    #[test]
    fn test_vector_driver_parse() {
        assert_eq!("qdrant".parse::<VectorDriver>().unwrap(), VectorDriver::Qdrant);
        assert_eq!(
            "pgvector".parse::<VectorDriver>().unwrap(),
            VectorDriver::Postgres
        );
        assert!(matches!(
            "s3".parse::<VectorDriver>(),
            Err(ConfigError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.embedding.api_key = Some("sk-secret".to_string());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("sk-secret"));
    }

    #[test]
    fn test_non_filterable_keys() {
        let index = IndexConfig::default();
        assert!(!index.is_filterable("content"));
        assert!(!index.is_filterable("source"));
        assert!(index.is_filterable("page"));
    }
}

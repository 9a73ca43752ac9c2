mod config;
mod document;
mod ingest;
mod search;

pub use config::{
    ChunkingConfig, Config, DATABASE_URL_ENV, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_INDEX_NAME, DEFAULT_OPENAI_URL, DEFAULT_QDRANT_URL,
    DEFAULT_TEI_URL, DistanceMetric, EmbeddingConfig, Granularity, IndexConfig, IngestConfig,
    OPENAI_API_KEY_ENV, QDRANT_API_KEY_ENV, SearchConfig, VectorDriver, VectorStoreConfig,
};
pub use document::{Chunk, Document, IndexedVector, Metadata, MetadataValue, keys};
pub use ingest::{DocumentReport, Failure, FailureKind, IngestSummary};
pub use search::{OutputFormat, QueryResult, ScoredVector};

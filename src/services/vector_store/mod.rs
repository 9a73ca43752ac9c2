//! Vector store abstraction layer.
//!
//! Every backend is bound to a single [`IndexConfig`] at construction and
//! exposes the same lifecycle, write and query operations, so the driver can
//! switch stores through configuration alone.

mod memory;
mod pgvector;
mod qdrant;

pub use memory::MemoryStore;
pub use pgvector::PgVectorStore;
pub use qdrant::QdrantStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, IndexConfig, IndexedVector, ScoredVector, VectorDriver, VectorStoreConfig};

/// Index information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub points_count: u64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Driver name, for logs and status output.
    fn name(&self) -> &'static str;

    fn index_config(&self) -> &IndexConfig;

    /// Vector length the index accepts.
    fn dimension(&self) -> usize {
        self.index_config().dimension as usize
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Returns None if the index doesn't exist.
    async fn index_info(&self) -> Result<Option<IndexInfo>, VectorStoreError>;

    /// Create the index if it doesn't exist.
    async fn create_index(&self) -> Result<(), VectorStoreError>;

    /// Drop the index and everything in it. A missing index is not an error.
    async fn delete_index(&self) -> Result<(), VectorStoreError>;

    /// Insert or replace vectors by key.
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError>;

    /// The `top_k` nearest vectors, most similar first. A missing or empty
    /// index yields no results.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredVector>, VectorStoreError>;

    async fn delete(&self, keys: &[String]) -> Result<(), VectorStoreError>;

    /// Delete every vector whose `source` metadata equals `source`.
    async fn delete_source(&self, source: &str) -> Result<(), VectorStoreError>;
}

/// Reject vectors whose length differs from the index dimension.
pub(crate) fn check_dimensions<'a>(
    expected: usize,
    vectors: impl IntoIterator<Item = &'a [f32]>,
) -> Result<(), VectorStoreError> {
    for vector in vectors {
        if vector.len() != expected {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
    }
    Ok(())
}

/// Create the store named by `config.driver`.
pub async fn create_store(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.driver.parse::<VectorDriver>()? {
        VectorDriver::Memory => Ok(Arc::new(MemoryStore::new(config.index.clone()))),
        VectorDriver::Qdrant => Ok(Arc::new(QdrantStore::new(config)?)),
        VectorDriver::Postgres => Ok(Arc::new(PgVectorStore::new(config).await?)),
    }
}

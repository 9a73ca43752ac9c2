//! In-process vector store with brute-force search.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{IndexInfo, VectorStore, check_dimensions};
use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, IndexConfig, IndexedVector, ScoredVector};

/// Vectors live in a map keyed by vector key. `None` means the index has not
/// been created.
pub struct MemoryStore {
    index: IndexConfig,
    points: RwLock<Option<HashMap<String, IndexedVector>>>,
}

impl MemoryStore {
    pub fn new(index: IndexConfig) -> Self {
        Self {
            index,
            points: RwLock::new(None),
        }
    }
}

/// Similarity under `metric`. Higher is always more similar.
pub(crate) fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let dot = dot(a, b);
            let norm_a = dot_self(a).sqrt();
            let norm_b = dot_self(b).sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::Euclidean => {
            let distance: f32 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + distance)
        }
        DistanceMetric::Dot => dot(a, b),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_self(a: &[f32]) -> f32 {
    dot(a, a)
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn index_config(&self) -> &IndexConfig {
        &self.index
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn index_info(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        Ok(self.points.read().as_ref().map(|points| IndexInfo {
            points_count: points.len() as u64,
        }))
    }

    async fn create_index(&self) -> Result<(), VectorStoreError> {
        self.points.write().get_or_insert_with(HashMap::new);
        Ok(())
    }

    async fn delete_index(&self) -> Result<(), VectorStoreError> {
        self.points.write().take();
        Ok(())
    }

    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
        check_dimensions(self.dimension(), vectors.iter().map(|v| v.vector.as_slice()))?;

        let mut guard = self.points.write();
        let points = guard
            .as_mut()
            .ok_or_else(|| VectorStoreError::IndexNotFound(self.index.name.clone()))?;
        for vector in vectors {
            points.insert(vector.key.clone(), vector);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredVector>, VectorStoreError> {
        check_dimensions(self.dimension(), [vector])?;

        let guard = self.points.read();
        let Some(points) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredVector> = points
            .values()
            .map(|point| ScoredVector {
                key: point.key.clone(),
                score: similarity(metric, vector, &point.vector),
                metadata: point.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.key.cmp(&b.key))
        });
        scored.truncate(top_k);
        debug!(candidates = points.len(), returned = scored.len(), "memory query");
        Ok(scored)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), VectorStoreError> {
        if let Some(points) = self.points.write().as_mut() {
            for key in keys {
                points.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<(), VectorStoreError> {
        if let Some(points) = self.points.write().as_mut() {
            points.retain(|_, point| point.source() != Some(source));
        }
        Ok(())
    }
}

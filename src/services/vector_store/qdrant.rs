//! Qdrant vector store backend implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, PointsIdsList, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use tracing::{debug, info};

use super::{IndexInfo, VectorStore, check_dimensions};
use crate::error::VectorStoreError;
use crate::models::{
    DistanceMetric, IndexConfig, IndexedVector, Metadata, MetadataValue, ScoredVector,
    VectorStoreConfig, keys,
};

/// Payload fields that get a keyword index when filterable.
const KEYWORD_FIELDS: [&str; 2] = [keys::SOURCE, keys::DOCUMENT_TYPE];

pub struct QdrantStore {
    client: Qdrant,
    index: IndexConfig,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            index: config.index.clone(),
        })
    }

    fn collection(&self) -> &str {
        &self.index.name
    }

    fn distance(&self) -> Distance {
        match self.index.distance_metric {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Euclidean => Distance::Euclid,
            DistanceMetric::Dot => Distance::Dot,
        }
    }

    async fn exists(&self) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(self.collection())
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not found") || lower.contains("doesn't exist")
}

fn to_payload(metadata: Metadata) -> HashMap<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let value: Value = match value {
                MetadataValue::Bool(b) => b.into(),
                MetadataValue::Integer(n) => n.into(),
                MetadataValue::Float(f) => f.into(),
                MetadataValue::Text(s) => s.into(),
            };
            (key, value)
        })
        .collect()
}

fn from_payload(payload: HashMap<String, Value>) -> Metadata {
    payload
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value.kind? {
                Kind::BoolValue(b) => MetadataValue::Bool(b),
                Kind::IntegerValue(n) => MetadataValue::Integer(n),
                Kind::DoubleValue(f) => MetadataValue::Float(f),
                Kind::StringValue(s) => MetadataValue::Text(s),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn point_key(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Qdrant reports euclidean hits as distances.
fn similarity(metric: DistanceMetric, score: f32) -> f32 {
    match metric {
        DistanceMetric::Euclidean => 1.0 / (1.0 + score),
        DistanceMetric::Cosine | DistanceMetric::Dot => score,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn index_config(&self) -> &IndexConfig {
        &self.index
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn index_info(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        match self.client.collection_info(self.collection()).await {
            Ok(info) => Ok(Some(IndexInfo {
                points_count: info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            })),
            Err(e) => {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    Ok(None)
                } else {
                    Err(VectorStoreError::IndexError(msg))
                }
            }
        }
    }

    async fn create_index(&self) -> Result<(), VectorStoreError> {
        if self.exists().await? {
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(self.collection()).vectors_config(
            VectorParamsBuilder::new(u64::from(self.index.dimension), self.distance()),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        for field in KEYWORD_FIELDS {
            if !self.index.is_filterable(field) {
                continue;
            }
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    self.collection(),
                    field,
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        }

        info!(
            collection = %self.collection(),
            dimension = self.index.dimension,
            metric = %self.index.distance_metric,
            "created qdrant collection"
        );
        Ok(())
    }

    async fn delete_index(&self) -> Result<(), VectorStoreError> {
        if !self.exists().await? {
            return Ok(());
        }

        self.client
            .delete_collection(self.collection())
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
        if vectors.is_empty() {
            return Ok(());
        }
        check_dimensions(self.dimension(), vectors.iter().map(|v| v.vector.as_slice()))?;

        let points: Vec<PointStruct> = vectors
            .into_iter()
            .map(|v| PointStruct::new(v.key, v.vector, to_payload(v.metadata)))
            .collect();

        debug!(collection = %self.collection(), points = points.len(), "upserting points");

        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection(), points).wait(true))
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    VectorStoreError::IndexNotFound(self.collection().to_string())
                } else {
                    VectorStoreError::UpsertError(msg)
                }
            })?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredVector>, VectorStoreError> {
        if metric != self.index.distance_metric {
            return Err(VectorStoreError::UnsupportedMetric {
                index: self.collection().to_string(),
                metric: metric.to_string(),
            });
        }
        check_dimensions(self.dimension(), [vector])?;

        let search =
            SearchPointsBuilder::new(self.collection(), vector.to_vec(), top_k as u64)
                .with_payload(true);

        let response = match self.client.search_points(search).await {
            Ok(response) => response,
            Err(e) => {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    return Ok(Vec::new());
                }
                return Err(VectorStoreError::SearchError(msg));
            }
        };

        let mut results: Vec<ScoredVector> = response
            .result
            .into_iter()
            .map(|point| ScoredVector {
                key: point_key(point.id),
                score: similarity(metric, point.score),
                metadata: from_payload(point.payload),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), VectorStoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let ids = PointsIdsList {
            ids: keys.iter().map(|k| PointId::from(k.clone())).collect(),
        };

        self.client
            .delete_points(DeletePointsBuilder::new(self.collection()).points(ids).wait(true))
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<(), VectorStoreError> {
        let filter = Filter::must([Condition::matches(keys::SOURCE, source.to_string())]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection())
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info, warn};

use super::{IndexInfo, VectorStore, check_dimensions};
use crate::error::VectorStoreError;
use crate::models::{
    DistanceMetric, IndexConfig, IndexedVector, Metadata, ScoredVector, VectorStoreConfig, keys,
};

/// pgvector cannot build an HNSW index above this many dimensions.
const HNSW_MAX_DIMENSIONS: u32 = 2000;

const UNDEFINED_TABLE: &str = "42P01";

pub struct PgVectorStore {
    pool: PgPool,
    table_name: String,
    index: IndexConfig,
}

/// Lowercase identifier safe to splice into SQL.
fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "t_");
    }
    ident
}

fn qualified_table_name(schema: Option<&str>, index_name: &str) -> String {
    let table = sanitize_identifier(index_name);
    match schema {
        Some(schema) => format!("{}.{}", sanitize_identifier(schema), table),
        None => table,
    }
}

/// Score expression and ordering operator for `metric`, with `$1` as the
/// query vector.
fn metric_sql(metric: DistanceMetric) -> (&'static str, &'static str) {
    match metric {
        DistanceMetric::Cosine => ("1 - (embedding <=> $1)", "embedding <=> $1"),
        DistanceMetric::Euclidean => ("1 / (1 + (embedding <-> $1))", "embedding <-> $1"),
        DistanceMetric::Dot => ("(embedding <#> $1) * -1", "embedding <#> $1"),
    }
}

fn operator_class(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::Euclidean => "vector_l2_ops",
        DistanceMetric::Dot => "vector_ip_ops",
    }
}

fn is_undefined_table(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == UNDEFINED_TABLE)
}

impl PgVectorStore {
    pub async fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let store = Self {
            pool,
            table_name: qualified_table_name(config.schema.as_deref(), &config.index.name),
            index: config.index.clone(),
        };

        store.check_pgvector_extension().await?;

        if let Some(ref schema) = config.schema {
            store.ensure_schema(schema).await?;
        }

        Ok(store)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), VectorStoreError> {
        let query = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            sanitize_identifier(schema)
        );
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, VectorStoreError> {
        let (name,): (Option<String>,) = sqlx::query_as("SELECT to_regclass($1)::text")
            .bind(&self.table_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(name.is_some())
    }

    /// Index names must be unqualified even when the table is not.
    fn index_prefix(&self) -> String {
        self.table_name.replace('.', "_")
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn index_config(&self) -> &IndexConfig {
        &self.index
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn index_info(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let query = format!("SELECT COUNT(*) as count FROM {}", self.table_name);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(Some(IndexInfo {
            points_count: row.0 as u64,
        }))
    }

    async fn create_index(&self) -> Result<(), VectorStoreError> {
        if self.table_exists().await? {
            return Ok(());
        }

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                embedding vector({}) NOT NULL
            )
            "#,
            self.table_name, self.index.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        let prefix = self.index_prefix();
        let mut indices = Vec::new();
        if self.index.dimension <= HNSW_MAX_DIMENSIONS {
            indices.push(format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding {})",
                prefix,
                self.table_name,
                operator_class(self.index.distance_metric)
            ));
        } else {
            warn!(
                table = %self.table_name,
                dimension = self.index.dimension,
                "dimension exceeds the HNSW limit, queries will scan the table"
            );
        }
        if self.index.is_filterable(keys::SOURCE) {
            indices.push(format!(
                "CREATE INDEX IF NOT EXISTS {}_source_idx ON {} (source)",
                prefix, self.table_name
            ));
        }

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        }

        info!(
            table = %self.table_name,
            dimension = self.index.dimension,
            metric = %self.index.distance_metric,
            "created pgvector table"
        );
        Ok(())
    }

    async fn delete_index(&self) -> Result<(), VectorStoreError> {
        let query = format!("DROP TABLE IF EXISTS {}", self.table_name);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
        if vectors.is_empty() {
            return Ok(());
        }
        check_dimensions(self.dimension(), vectors.iter().map(|v| v.vector.as_slice()))?;

        let query = format!(
            r#"
            INSERT INTO {} (key, source, metadata, embedding)
            VALUES ($1, $2, $3::jsonb, $4)
            ON CONFLICT (key) DO UPDATE SET
                source = EXCLUDED.source,
                metadata = EXCLUDED.metadata,
                embedding = EXCLUDED.embedding
            "#,
            self.table_name
        );

        let upsert_error = |e: sqlx::Error| {
            if is_undefined_table(&e) {
                VectorStoreError::IndexNotFound(self.index.name.clone())
            } else {
                VectorStoreError::UpsertError(e.to_string())
            }
        };

        let mut tx = self.pool.begin().await.map_err(upsert_error)?;

        for vector in &vectors {
            let metadata = serde_json::to_string(&vector.metadata)
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
            let embedding = Vector::from(vector.vector.clone());

            sqlx::query(&query)
                .bind(&vector.key)
                .bind(vector.source().unwrap_or_default())
                .bind(&metadata)
                .bind(&embedding)
                .execute(&mut *tx)
                .await
                .map_err(upsert_error)?;
        }

        tx.commit().await.map_err(upsert_error)?;

        debug!(table = %self.table_name, rows = vectors.len(), "upserted rows");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredVector>, VectorStoreError> {
        // The HNSW index only serves the operator class it was built with
        if metric != self.index.distance_metric {
            return Err(VectorStoreError::UnsupportedMetric {
                index: self.table_name.clone(),
                metric: metric.to_string(),
            });
        }
        check_dimensions(self.dimension(), [vector])?;

        let (score, order) = metric_sql(metric);
        let query = format!(
            r#"
            SELECT key, metadata::text AS metadata, ({}) AS score
            FROM {}
            ORDER BY {}
            LIMIT $2
            "#,
            score, self.table_name, order
        );

        let rows = match sqlx::query(&query)
            .bind(Vector::from(vector.to_vec()))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(VectorStoreError::SearchError(e.to_string())),
        };

        rows.into_iter()
            .map(|row: PgRow| {
                let key: String = row.get("key");
                let metadata: String = row.get("metadata");
                let score: f64 = row.get("score");
                let metadata: Metadata = serde_json::from_str(&metadata)
                    .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;
                Ok(ScoredVector {
                    key,
                    score: score as f32,
                    metadata,
                })
            })
            .collect()
    }

    async fn delete(&self, keys: &[String]) -> Result<(), VectorStoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let query = format!("DELETE FROM {} WHERE key = ANY($1)", self.table_name);
        match sqlx::query(&query).bind(keys).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_undefined_table(&e) => Ok(()),
            Err(e) => Err(VectorStoreError::DeleteError(e.to_string())),
        }
    }

    async fn delete_source(&self, source: &str) -> Result<(), VectorStoreError> {
        let query = format!("DELETE FROM {} WHERE source = $1", self.table_name);
        match sqlx::query(&query).bind(source).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_undefined_table(&e) => Ok(()),
            Err(e) => Err(VectorStoreError::DeleteError(e.to_string())),
        }
    }
}

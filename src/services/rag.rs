//! Ingest and retrieval over one embedding provider and one vector store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::embedding::{EmbeddingProvider, create_provider};
use super::splitter::{ChunkSplitter, SplitterConfig, SplitterFactory};
use super::vector_store::{VectorStore, create_store};
use crate::error::{
    AppError, ConfigError, ContentError, EmbeddingError, IngestError, RetrievalError,
    VectorStoreError,
};
use crate::models::{
    Chunk, Config, DistanceMetric, Document, DocumentReport, FailureKind, IndexedVector,
    IngestConfig, IngestSummary, QueryResult,
};
use crate::utils::{RetryConfig, collect_files, compile_patterns, with_retry};

/// Cooperative stop signal for [`RagDriver::fill_rag`].
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of the driver's bindings and index state.
#[derive(Debug, Clone, Serialize)]
pub struct RagStatus {
    pub provider: String,
    pub store: String,
    pub index: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub healthy: bool,
    pub provider_healthy: bool,
    /// None when the index does not exist or the store is unreachable.
    pub points_count: Option<u64>,
}

enum ChunkOutcome {
    Embedded(u32, IndexedVector),
    Failed(u32, FailureKind, String),
    Cancelled(u32),
}

pub struct RagDriver {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    splitters: SplitterFactory,
    ingest: IngestConfig,
    retry: RetryConfig,
    metric: DistanceMetric,
}

impl RagDriver {
    /// Bind a provider and a store. Their dimensions must agree.
    pub fn new(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, ConfigError> {
        config.chunking.validate()?;
        config.ingest.validate()?;

        if provider.dimension() != store.dimension() {
            return Err(ConfigError::DimensionMismatch {
                expected: store.dimension(),
                actual: provider.dimension(),
            });
        }

        Ok(Self {
            metric: store.index_config().distance_metric,
            provider,
            store,
            splitters: SplitterFactory::new(&SplitterConfig::from_config(config)?),
            ingest: config.ingest.clone(),
            retry: RetryConfig::from_ingest(&config.ingest),
        })
    }

    /// Build the provider and store named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        config.validate()?;
        let provider = create_provider(&config.embedding)?;
        let store = create_store(&config.vector_store).await?;
        Ok(Self::new(config, provider, store)?)
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn splitters(&self) -> &SplitterFactory {
        &self.splitters
    }

    /// Load, split, embed and store every supported document under
    /// `source_path`.
    pub async fn fill_rag(
        &self,
        source_path: &Path,
        cancel: &CancellationFlag,
    ) -> Result<IngestSummary, IngestError> {
        let started = Instant::now();
        let root = std::fs::canonicalize(source_path)
            .map_err(|_| IngestError::SourceNotFound(source_path.to_path_buf()))?;

        let mut summary = IngestSummary::default();
        let files = self.discover(&root, &mut summary)?;

        if self.ingest.recreate_index {
            info!(index = %self.store.index_config().name, "recreating index");
            self.store.delete_index().await?;
        }
        self.store.create_index().await?;

        for path in files {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let report = self.fill_document(&path, cancel).await;
            if cancel.is_cancelled() {
                summary.cancelled = true;
            }
            summary.documents.push(report);
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            documents = summary.documents_processed(),
            failed = summary.documents_failed(),
            skipped = summary.documents_skipped,
            chunks = summary.chunks_produced(),
            indexed = summary.chunks_indexed(),
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "fill complete"
        );
        Ok(summary)
    }

    /// Supported files under `root`, in walk order.
    fn discover(
        &self,
        root: &Path,
        summary: &mut IngestSummary,
    ) -> Result<Vec<PathBuf>, IngestError> {
        if root.is_file() {
            self.splitters.for_path(root)?;
            summary.documents_found = 1;
            return Ok(vec![root.to_path_buf()]);
        }

        let exclude = compile_patterns(&self.ingest.exclude_patterns);
        let walk = collect_files(root, &exclude, self.ingest.follow_links);
        summary.documents_found = walk.files.len() + walk.errors.len();

        for error in &walk.errors {
            let path = error.path().unwrap_or(root);
            let mut report = DocumentReport::new(path.display().to_string());
            report.fail(FailureKind::Content, None, error);
            summary.documents.push(report);
        }

        let walked = walk.files.len();
        let supported: Vec<PathBuf> = walk
            .files
            .into_iter()
            .filter(|path| {
                let ok = self.splitters.supports(path);
                if !ok {
                    debug!(path = %path.display(), "skipping unsupported file");
                }
                ok
            })
            .collect();

        summary.documents_skipped = walked - supported.len();
        Ok(supported)
    }

    async fn fill_document(&self, path: &Path, cancel: &CancellationFlag) -> DocumentReport {
        let mut report = DocumentReport::new(path.display().to_string());

        let splitter = match self.splitters.for_path(path) {
            Ok(splitter) => splitter,
            Err(e) => {
                report.fail(FailureKind::Content, None, e);
                return report;
            }
        };

        let (document, chunks) = match load_and_split(splitter, path.to_path_buf()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load document");
                report.fail(FailureKind::Content, None, e);
                return report;
            }
        };

        report.source = document.source.clone();
        report.chunks = chunks.len();
        report.characters = document.text.chars().count();

        let dimension = self.store.dimension();
        let document = &document;
        let mut outcomes = stream::iter(chunks.iter())
            .map(|chunk| {
                let provider = Arc::clone(&self.provider);
                let retry = self.retry.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return ChunkOutcome::Cancelled(chunk.index);
                    }
                    embed_chunk(provider, &retry, chunk, document, dimension).await
                }
            })
            .buffer_unordered(self.ingest.concurrency);

        let mut pending: Vec<(u32, IndexedVector)> = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ChunkOutcome::Embedded(index, vector) => {
                    pending.push((index, vector));
                    if pending.len() >= self.ingest.upsert_batch_size {
                        self.flush(&mut pending, &mut report).await;
                    }
                }
                ChunkOutcome::Failed(index, kind, reason) => {
                    warn!(source = %report.source, chunk = index, kind = %kind, error = %reason, "chunk failed");
                    report.fail(kind, Some(index), reason);
                }
                ChunkOutcome::Cancelled(index) => {
                    debug!(source = %report.source, chunk = index, "chunk skipped after cancellation");
                    report.cancelled += 1;
                }
            }
        }
        self.flush(&mut pending, &mut report).await;

        info!(
            source = %report.source,
            chunks = report.chunks,
            indexed = report.indexed,
            characters = report.characters,
            "indexed document"
        );
        report
    }

    /// Upsert the pending vectors. A failed batch fails each of its chunks.
    async fn flush(&self, pending: &mut Vec<(u32, IndexedVector)>, report: &mut DocumentReport) {
        if pending.is_empty() {
            return;
        }

        let (indices, vectors): (Vec<u32>, Vec<IndexedVector>) =
            std::mem::take(pending).into_iter().unzip();

        let result = with_retry(&self.retry, || {
            let store = Arc::clone(&self.store);
            let batch = vectors.clone();
            async move { store.upsert(batch).await }
        })
        .await
        .into_result();

        match result {
            Ok(()) => report.indexed += indices.len(),
            Err(e) => {
                warn!(source = %report.source, chunks = indices.len(), error = %e, "upsert failed");
                for index in indices {
                    report.fail(FailureKind::Store, Some(index), &e);
                }
            }
        }
    }

    /// The `top_k` stored chunks most similar to `query`, best first.
    pub async fn find_in_rag(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let vector = self.provider.embed_query(query).await?;
        let expected = self.store.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }

        let mut hits = self.store.query(&vector, top_k, self.metric).await?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        debug!(query = %query, results = hits.len(), "query complete");

        Ok(hits.into_iter().map(QueryResult::from).collect())
    }

    /// Delete every vector stored for the document at `path`.
    pub async fn remove_source(&self, path: &Path) -> Result<(), VectorStoreError> {
        let source = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let source = source.display().to_string();
        self.store.delete_source(&source).await?;
        info!(source = %source, "removed document vectors");
        Ok(())
    }

    pub async fn create_index(&self) -> Result<(), VectorStoreError> {
        self.store.create_index().await
    }

    pub async fn delete_index(&self) -> Result<(), VectorStoreError> {
        self.store.delete_index().await
    }

    pub async fn status(&self) -> Result<RagStatus, VectorStoreError> {
        let healthy = self.store.health_check().await.unwrap_or(false);
        let points_count = if healthy {
            self.store.index_info().await?.map(|info| info.points_count)
        } else {
            None
        };

        let provider_healthy = match self.provider.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "embedding provider health check failed");
                false
            }
        };

        let index = self.store.index_config();
        Ok(RagStatus {
            provider: self.provider.name().to_string(),
            store: self.store.name().to_string(),
            index: index.name.clone(),
            dimension: self.store.dimension(),
            metric: index.distance_metric,
            healthy,
            provider_healthy,
            points_count,
        })
    }
}

/// Reading and PDF extraction block, so they run off the async workers.
async fn load_and_split(
    splitter: Arc<dyn ChunkSplitter>,
    path: PathBuf,
) -> Result<(Document, Vec<Chunk>), ContentError> {
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || {
        let document = splitter.load(&task_path)?;
        let chunks = splitter.split(&document);
        Ok::<_, ContentError>((document, chunks))
    })
    .await
    .map_err(|e| ContentError::Read {
        path,
        source: std::io::Error::other(e.to_string()),
    })?
}

async fn embed_chunk(
    provider: Arc<dyn EmbeddingProvider>,
    retry: &RetryConfig,
    chunk: &Chunk,
    document: &Document,
    dimension: usize,
) -> ChunkOutcome {
    let text = chunk.embedding_text();
    let result = with_retry(retry, || {
        let provider = Arc::clone(&provider);
        let text = text.clone();
        async move { provider.embed(&text).await }
    })
    .await
    .into_result();

    match result {
        Ok(vector) if vector.len() != dimension => {
            let e = EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            };
            ChunkOutcome::Failed(chunk.index, FailureKind::Configuration, e.to_string())
        }
        Ok(vector) => ChunkOutcome::Embedded(
            chunk.index,
            IndexedVector::from_chunk(chunk, document, vector),
        ),
        Err(e) => ChunkOutcome::Failed(chunk.index, FailureKind::Provider, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkingConfig, Granularity};
    use crate::services::vector_store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    const DIM: usize = 4;

    /// Letter-count embeddings: similar vowels, similar vectors.
    #[derive(Default)]
    struct MockProvider {
        dimension: usize,
        wrong_length: bool,
        fail_on: Option<&'static str>,
        /// Tripped on every embed call.
        cancel_on_embed: Option<CancellationFlag>,
        /// Calls answered with a retryable 503 before succeeding.
        transient_failures: AtomicUsize,
        calls: Arc<AtomicUsize>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                dimension: DIM,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(cancel) = &self.cancel_on_embed {
                cancel.cancel();
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::ServerError("status 503: overloaded".into()));
            }
            texts
                .iter()
                .map(|text| {
                    if let Some(marker) = self.fail_on
                        && text.contains(marker)
                    {
                        return Err(EmbeddingError::ServerError("status 400: rejected".into()));
                    }
                    let lower = text.to_lowercase();
                    let mut vector: Vec<f32> = ['a', 'e', 'i', 'o']
                        .iter()
                        .map(|v| lower.matches(*v).count() as f32 + 1.0)
                        .collect();
                    if self.wrong_length {
                        vector.push(1.0);
                    }
                    Ok(vector)
                })
                .collect()
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.embedding.dimension = DIM as u32;
        config.vector_store.driver = "memory".to_string();
        config.vector_store.index.dimension = DIM as u32;
        config.chunking = ChunkingConfig {
            chunk_size: 60,
            chunk_overlap: 0,
            min_granularity: Granularity::Word,
            ..Default::default()
        };
        config.ingest.max_attempts = 1;
        config
    }

    fn driver_with(provider: MockProvider, store: Arc<MemoryStore>, config: &Config) -> RagDriver {
        RagDriver::new(config, Arc::new(provider), store).unwrap()
    }

    fn driver(provider: MockProvider) -> (RagDriver, Arc<MemoryStore>) {
        let config = config();
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        (driver_with(provider, Arc::clone(&store), &config), store)
    }

    async fn points(store: &MemoryStore) -> u64 {
        store
            .index_info()
            .await
            .unwrap()
            .map_or(0, |info| info.points_count)
    }

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const ARTICLE: &str = "Apples are red and sweet.\n\nOranges are orange and sour.\n\nIris flowers bloom in spring.\n";

    #[tokio::test]
    async fn test_fill_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, store) = driver(MockProvider::new());

        let summary = driver.fill_rag(&path, &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_found, 1);
        assert_eq!(summary.documents_succeeded(), 1);
        assert!(summary.chunks_produced() >= 2);
        assert_eq!(summary.chunks_indexed(), summary.chunks_produced());
        assert_eq!(points(&store).await, summary.chunks_indexed() as u64);
    }

    #[tokio::test]
    async fn test_refill_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, store) = driver(MockProvider::new());

        driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();
        let first = points(&store).await;
        driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert!(first > 0);
        assert_eq!(points(&store).await, first);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.txt", &[0xff, 0xfe, 0xfd, 0x00]);
        write(dir.path(), "good.md", b"# Notes\n\nA valid document.\n");
        let (driver, store) = driver(MockProvider::new());

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_processed(), 2);
        assert_eq!(summary.documents_failed(), 1);
        assert_eq!(summary.documents_succeeded(), 1);
        let (source, failure) = summary.failures().next().unwrap();
        assert!(source.ends_with("bad.txt"));
        assert_eq!(failure.kind, FailureKind::Content);
        assert!(points(&store).await > 0);
    }

    #[tokio::test]
    async fn test_unsupported_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", b"Some text.");
        write(dir.path(), "image.png", &[0x89, 0x50, 0x4e, 0x47]);
        let (driver, _) = driver(MockProvider::new());

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_found, 2);
        assert_eq!(summary.documents_skipped, 1);
        assert_eq!(summary.documents_processed(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_single_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "data.csv", b"a,b\n1,2\n");
        let (driver, _) = driver(MockProvider::new());

        let err = driver.fill_rag(&path, &CancellationFlag::new()).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Config(ConfigError::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let (driver, _) = driver(MockProvider::new());
        let err = driver
            .fill_rag(Path::new("/definitely/not/here"), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_wrong_vector_length_fails_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, store) = driver(MockProvider {
            wrong_length: true,
            ..MockProvider::new()
        });

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.chunks_indexed(), 0);
        assert!(
            summary
                .failures()
                .all(|(_, f)| f.kind == FailureKind::Configuration)
        );
        assert_eq!(summary.failures().count(), summary.chunks_produced());
        assert_eq!(points(&store).await, 0);
    }

    #[tokio::test]
    async fn test_provider_error_fails_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, store) = driver(MockProvider {
            fail_on: Some("Oranges"),
            ..MockProvider::new()
        });

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.failures().count(), 1);
        let (_, failure) = summary.failures().next().unwrap();
        assert_eq!(failure.kind, FailureKind::Provider);
        assert!(failure.chunk_index.is_some());
        assert_eq!(points(&store).await, summary.chunks_indexed() as u64);
        assert_eq!(summary.chunks_indexed(), summary.chunks_produced() - 1);
    }

    #[test]
    fn test_dimension_mismatch_at_construction() {
        let config = config();
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let provider = MockProvider {
            dimension: 8,
            ..MockProvider::new()
        };
        let err = RagDriver::new(&config, Arc::new(provider), store).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::DimensionMismatch {
                expected: 4,
                actual: 8
            }
        ));
    }

    #[tokio::test]
    async fn test_find_ranks_results() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, _) = driver(MockProvider::new());
        driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        let results = driver.find_in_rag("oranges orange", 2).await.unwrap();

        assert!(!results.is_empty() && results.len() <= 2);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results[0].source.ends_with("fruit.txt"));
        assert!(results[0].chunk_index.is_some());
    }

    #[tokio::test]
    async fn test_find_on_empty_store() {
        let (driver, _) = driver(MockProvider::new());
        let results = driver.find_in_rag("anything", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_find_rejects_bad_input() {
        let (driver, _) = driver(MockProvider::new());
        assert!(matches!(
            driver.find_in_rag("query", 0).await,
            Err(RetrievalError::InvalidTopK)
        ));
        assert!(matches!(
            driver.find_in_rag("   ", 3).await,
            Err(RetrievalError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let provider = MockProvider::new();
        let (driver, store) = driver(provider);

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let summary = driver.fill_rag(dir.path(), &cancel).await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.documents.is_empty());
        assert_eq!(points(&store).await, 0);
    }

    #[tokio::test]
    async fn test_recreate_index_drops_old_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "first.txt", b"Alpha document.");
        let second = write(dir.path(), "second.txt", b"Beta document.");

        let mut config = config();
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let plain = driver_with(MockProvider::new(), Arc::clone(&store), &config);
        plain.fill_rag(&first, &CancellationFlag::new()).await.unwrap();

        config.ingest.recreate_index = true;
        let recreating = driver_with(MockProvider::new(), Arc::clone(&store), &config);
        recreating.fill_rag(&second, &CancellationFlag::new()).await.unwrap();

        let results = recreating.find_in_rag("document", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].source.ends_with("second.txt"));
    }

    #[tokio::test]
    async fn test_remove_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let (driver, store) = driver(MockProvider::new());
        driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        driver.remove_source(&path).await.unwrap();
        assert_eq!(points(&store).await, 0);
    }

    #[tokio::test]
    async fn test_status() {
        let (driver, _) = driver(MockProvider::new());
        let status = driver.status().await.unwrap();
        assert_eq!(status.provider, "mock");
        assert_eq!(status.store, "memory");
        assert!(status.healthy);
        assert!(status.provider_healthy);
        assert_eq!(status.points_count, None);

        driver.create_index().await.unwrap();
        assert_eq!(driver.status().await.unwrap().points_count, Some(0));
    }

    fn long_document() -> String {
        (0..5)
            .map(|i| format!("Paragraph {i} talks about apples, pears and plums.\n\n"))
            .collect()
    }

    #[tokio::test]
    async fn test_cancelled_mid_document() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", long_document().as_bytes());
        write(dir.path(), "b.txt", ARTICLE.as_bytes());
        let cancel = CancellationFlag::new();
        let provider = MockProvider {
            cancel_on_embed: Some(cancel.clone()),
            ..MockProvider::new()
        };
        let mut config = config();
        config.ingest.concurrency = 1;
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let driver = driver_with(provider, Arc::clone(&store), &config);

        let summary = driver.fill_rag(dir.path(), &cancel).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.documents.len(), 1);
        let report = &summary.documents[0];
        assert_eq!(report.chunks, 5);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.cancelled, 4);
        assert!(report.failures.is_empty());
        assert!(!report.succeeded());
        assert_eq!(summary.documents_failed(), 1);
        assert_eq!(summary.chunks_cancelled(), 4);
        assert_eq!(points(&store).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_embedding_keeps_counts() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write(dir.path(), &format!("doc{i}.txt"), long_document().as_bytes());
        }
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());

        let mut config = config();
        config.ingest.concurrency = 4;
        config.ingest.upsert_batch_size = 2;
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let driver = driver_with(MockProvider::new(), Arc::clone(&store), &config);

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_found, 7);
        assert_eq!(summary.documents_succeeded(), 7);
        let docs = summary.documents.iter().filter(|d| {
            Path::new(&d.source)
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("doc"))
        });
        for report in docs {
            assert_eq!(report.chunks, 5);
            assert_eq!(report.indexed, 5);
        }
        assert_eq!(summary.chunks_indexed(), summary.chunks_produced());
        let stored = points(&store).await;
        assert_eq!(stored, summary.chunks_produced() as u64);

        let again = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();
        assert_eq!(again.chunks_indexed(), summary.chunks_indexed());
        assert_eq!(points(&store).await, stored);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_entry_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link.txt")).unwrap();

        let mut config = config();
        config.ingest.follow_links = true;
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let driver = driver_with(MockProvider::new(), Arc::clone(&store), &config);

        let summary = driver.fill_rag(dir.path(), &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_found, 2);
        assert_eq!(summary.documents_failed(), 1);
        assert_eq!(summary.documents_succeeded(), 1);
        let (source, failure) = summary.failures().next().unwrap();
        assert!(source.ends_with("link.txt"));
        assert_eq!(failure.kind, FailureKind::Content);
        assert!(points(&store).await > 0);
    }

    #[tokio::test]
    async fn test_transient_provider_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "fruit.txt", ARTICLE.as_bytes());
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = MockProvider {
            transient_failures: AtomicUsize::new(2),
            calls: Arc::clone(&calls),
            ..MockProvider::new()
        };
        let mut config = config();
        config.ingest.max_attempts = 3;
        config.ingest.retry_delay_ms = 1;
        let store = Arc::new(MemoryStore::new(config.vector_store.index.clone()));
        let driver = driver_with(provider, Arc::clone(&store), &config);

        let summary = driver.fill_rag(&path, &CancellationFlag::new()).await.unwrap();

        assert_eq!(summary.documents_succeeded(), 1);
        assert_eq!(summary.chunks_indexed(), summary.chunks_produced());
        assert_eq!(calls.load(Ordering::SeqCst), summary.chunks_produced() + 2);
    }
}

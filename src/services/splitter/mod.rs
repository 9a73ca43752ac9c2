//! Document loading and chunk splitting.
//!
//! A [`ChunkSplitter`] knows how to read one family of files and how to cut
//! the resulting [`Document`] into ordered, bounded [`Chunk`]s. Splitters are
//! selected per file extension through the [`SplitterFactory`].

pub mod limits;
mod markdown;
mod pdf;
mod text;
pub mod window;

pub use limits::ChunkLimits;
pub use markdown::MarkdownSplitter;
pub use pdf::PdfSplitter;
pub use text::TextSplitter;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ConfigError, ContentError};
use crate::models::{Chunk, ChunkingConfig, Config, Document, IngestConfig, Metadata, keys};
use crate::utils::file::file_extension;
use window::Span;

/// Reads and splits one family of documents.
pub trait ChunkSplitter: Send + Sync {
    /// Short name recorded as the document type.
    fn kind(&self) -> &'static str;

    /// Lower-case extensions this splitter handles.
    fn extensions(&self) -> &'static [&'static str];

    fn load(&self, path: &Path) -> Result<Document, ContentError>;

    /// Split a loaded document. Blank documents yield no chunks.
    fn split(&self, document: &Document) -> Vec<Chunk>;
}

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub chunking: ChunkingConfig,
    pub max_file_size: u64,
    pub limits: Arc<ChunkLimits>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            max_file_size: IngestConfig::default().max_file_size,
            limits: Arc::new(ChunkLimits::default()),
        }
    }
}

impl SplitterConfig {
    /// Fails when the configured tokenizer cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            chunking: config.chunking.clone(),
            max_file_size: config.ingest.max_file_size,
            limits: Arc::new(ChunkLimits::from_config(&config.chunking)?),
        })
    }
}

/// Turn spans into chunks, adding line metadata and the per-span extras.
/// Spans over the token or byte ceiling are re-split without overlap.
pub(crate) fn assemble(
    document: &Document,
    spans: Vec<(Span, Metadata)>,
    limits: &ChunkLimits,
) -> Vec<Chunk> {
    let text = document.text.as_str();
    let lines = LineIndex::new(text);
    let mut chunks: Vec<Chunk> = Vec::with_capacity(spans.len());

    for (span, extra) in spans {
        let mut pieces = limits.fit(text, span.range.clone());
        let overlap = if pieces.len() == 1 {
            span.overlap
        } else {
            if span.overlap > 0 {
                pieces = limits.fit(text, span.range.start + span.overlap..span.range.end);
            }
            debug!(
                source = %document.source,
                chunk = chunks.len(),
                pieces = pieces.len(),
                "re-split chunk over token or byte limit"
            );
            0
        };

        for (range, tokens) in pieces {
            let index = chunks.len();
            let chunk_text = text[range.clone()].to_string();
            let (first, last) = content_bounds(&chunk_text, range.start);

            let mut metadata = extra.clone();
            metadata.insert(keys::LINE_START.into(), lines.line_of(first).into());
            metadata.insert(keys::LINE_END.into(), lines.line_of(last).into());
            metadata.insert(keys::NUM_TOKENS.into(), tokens.into());
            metadata.insert(keys::NUM_BYTES.into(), chunk_text.len().into());
            if span.oversized {
                warn!(
                    source = %document.source,
                    chunk = index,
                    chars = chunk_text.chars().count(),
                    "chunk exceeds configured size"
                );
                metadata.insert(keys::OVERSIZED.into(), true.into());
            }

            chunks.push(Chunk {
                text: chunk_text,
                source: document.source.clone(),
                index: index as u32,
                start_offset: range.start,
                end_offset: range.end,
                overlap,
                metadata,
            });
        }
    }

    debug!(source = %document.source, chunks = chunks.len(), "split document");
    chunks
}

/// Byte offsets of the first and last non-whitespace characters of a chunk
/// starting at `start`.
pub(crate) fn content_bounds(text: &str, start: usize) -> (usize, usize) {
    let leading = text.len() - text.trim_start().len();
    let trailing_end = text.trim_end().len();
    (start + leading, start + trailing_end.saturating_sub(1).max(leading))
}

/// 1-based line lookup by byte offset.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self {
            newlines: text
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i)
                .collect(),
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&n| n < offset) + 1
    }
}

/// Registry of splitters keyed by file extension.
#[derive(Clone, Default)]
pub struct SplitterFactory {
    registry: HashMap<String, Arc<dyn ChunkSplitter>>,
}

impl SplitterFactory {
    /// Factory with the text, markdown and PDF splitters registered.
    pub fn new(config: &SplitterConfig) -> Self {
        let mut factory = Self::default();
        factory.register(Arc::new(TextSplitter::new(config.clone())));
        factory.register(Arc::new(MarkdownSplitter::new(config.clone())));
        factory.register(Arc::new(PdfSplitter::new(config.clone())));
        factory
    }

    /// Register a splitter for each of its extensions, replacing earlier ones.
    pub fn register(&mut self, splitter: Arc<dyn ChunkSplitter>) {
        for ext in splitter.extensions() {
            self.registry.insert(ext.to_lowercase(), Arc::clone(&splitter));
        }
    }

    pub fn for_extension(&self, extension: &str) -> Result<Arc<dyn ChunkSplitter>, ConfigError> {
        let key = extension.trim_start_matches('.').to_lowercase();
        self.registry
            .get(&key)
            .cloned()
            .ok_or_else(|| ConfigError::unsupported("file type", extension))
    }

    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn ChunkSplitter>, ConfigError> {
        let ext = file_extension(path)
            .ok_or_else(|| ConfigError::unsupported("file type", path.display().to_string()))?;
        self.for_extension(&ext)
    }

    pub fn supports(&self, path: &Path) -> bool {
        file_extension(path).is_some_and(|ext| self.registry.contains_key(&ext))
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;
    use std::path::PathBuf;

    #[test]
    fn test_factory_defaults() {
        let factory = SplitterFactory::new(&SplitterConfig::default());

        assert_eq!(factory.for_extension("md").unwrap().kind(), "markdown");
        assert_eq!(factory.for_extension(".PDF").unwrap().kind(), "pdf");
        assert_eq!(factory.for_extension("txt").unwrap().kind(), "text");
        assert_eq!(
            factory.extensions(),
            vec!["markdown", "md", "pdf", "text", "txt"]
        );
    }

    #[test]
    fn test_factory_unsupported_type() {
        let factory = SplitterFactory::new(&SplitterConfig::default());

        let err = factory.for_path(&PathBuf::from("report.docx")).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::UnsupportedType { kind: "file type", ref value } if value == "docx"
        ));
        assert!(factory.for_path(&PathBuf::from("Makefile")).is_err());
        assert!(!factory.supports(&PathBuf::from("image.png")));
        assert!(factory.supports(&PathBuf::from("notes.Markdown")));
    }

    #[test]
    fn test_register_custom_splitter() {
        let mut factory = SplitterFactory::default();
        assert!(factory.for_extension("txt").is_err());

        factory.register(Arc::new(TextSplitter::new(SplitterConfig::default())));
        assert!(factory.for_extension("txt").is_ok());
    }

    #[test]
    fn test_resplit_over_byte_limit() {
        let chunking = ChunkingConfig {
            chunk_size: 1000,
            chunk_overlap: 0,
            max_chunk_bytes: 32,
            ..Default::default()
        };
        let splitter = TextSplitter::new(SplitterConfig {
            limits: Arc::new(ChunkLimits::from_config(&chunking).unwrap()),
            chunking,
            ..Default::default()
        });
        let text = "one two three four five six seven eight nine ten ".repeat(4);
        let document = Document::new("/tmp/long.txt", "text", text.clone());

        let chunks = splitter.split(&document);

        assert!(chunks.len() > 1);
        let rebuilt: String = chunks.iter().map(Chunk::fresh_text).collect();
        assert_eq!(rebuilt, text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
            assert_eq!(chunk.overlap, 0);
            assert!(chunk.text.len() <= 32);
            assert_eq!(
                chunk.metadata.get(keys::NUM_BYTES).and_then(MetadataValue::as_i64),
                Some(chunk.text.len() as i64)
            );
        }
    }

    #[test]
    fn test_chunks_carry_size_metadata() {
        let splitter = TextSplitter::new(SplitterConfig::default());
        let document = Document::new("/tmp/a.txt", "text", "Hello there, world.".to_string());

        let chunks = splitter.split(&document);

        assert_eq!(chunks.len(), 1);
        let tokens = chunks[0]
            .metadata
            .get(keys::NUM_TOKENS)
            .and_then(MetadataValue::as_i64);
        assert!(tokens.is_some_and(|n| n > 0));
        assert_eq!(
            chunks[0].metadata.get(keys::NUM_BYTES).and_then(MetadataValue::as_i64),
            Some(19)
        );
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a\nb\n\nc");
        assert_eq!(lines.line_of(0), 1);
        assert_eq!(lines.line_of(2), 2);
        assert_eq!(lines.line_of(5), 4);
    }

    #[test]
    fn test_content_bounds() {
        assert_eq!(content_bounds("\n\nabc\n", 10), (12, 14));
        assert_eq!(content_bounds("x", 0), (0, 0));
    }
}

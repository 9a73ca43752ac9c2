//! PDF splitting by page.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::window::{Level, Window, split_after};
use super::{ChunkSplitter, SplitterConfig, assemble, content_bounds};
use crate::error::ContentError;
use crate::models::{Chunk, Document, Metadata, keys};
use crate::utils::file::read_file_bytes;

/// pdf-extract separates pages with form feeds.
const PAGE_BREAK: char = '\x0C';

static RE_PAGE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x0C").unwrap());

#[derive(Debug, Clone)]
pub struct PdfSplitter {
    config: SplitterConfig,
}

impl PdfSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }
}

/// Extract text from PDF bytes. Some malformed files make the parser panic,
/// so the call is isolated and reported as a content error.
fn extract_text(path: &Path, bytes: &[u8]) -> Result<String, ContentError> {
    let pdf_error = |message: String| ContentError::Pdf {
        path: path.to_path_buf(),
        message,
    };

    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(pdf_error(e.to_string())),
        Err(_) => Err(pdf_error("parser panicked".to_string())),
    }
}

impl ChunkSplitter for PdfSplitter {
    fn kind(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<Document, ContentError> {
        let bytes = read_file_bytes(path, self.config.max_file_size)?;
        let text = extract_text(path, &bytes)?;
        debug!(
            path = %path.display(),
            pages = text.matches(PAGE_BREAK).count() + 1,
            "extracted PDF text"
        );
        Ok(Document::new(path.display().to_string(), self.kind(), text))
    }

    fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.is_blank() {
            return Vec::new();
        }

        let text = document.text.as_str();
        let breaks: Vec<usize> = text.match_indices(PAGE_BREAK).map(|(i, _)| i).collect();
        let page_of = |offset: usize| breaks.partition_point(|&b| b < offset) + 1;

        let pages = split_after(text, 0..text.len(), &RE_PAGE_BREAK);
        let spans = Window::new(text, &self.config.chunking)
            .split(&pages, Level::Section)
            .into_iter()
            .map(|span| {
                let chunk = &text[span.range.clone()];
                let (first, last) = content_bounds(chunk, span.range.start);
                let mut metadata = Metadata::new();
                metadata.insert(keys::PAGE.into(), page_of(first).into());
                metadata.insert(keys::PAGE_END.into(), page_of(last).into());
                (span, metadata)
            })
            .collect();

        assemble(document, spans, &self.config.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkingConfig, Granularity, MetadataValue};

    fn splitter(chunk_size: usize) -> PdfSplitter {
        PdfSplitter::new(SplitterConfig {
            chunking: ChunkingConfig {
                chunk_size,
                chunk_overlap: 0,
                min_granularity: Granularity::Word,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn page(chunk: &Chunk, key: &str) -> Option<i64> {
        chunk.metadata.get(key).and_then(MetadataValue::as_i64)
    }

    #[test]
    fn test_pages_are_tracked() {
        let text = "Page one text.\n\x0CPage two text.\n\x0CPage three text.\n";
        let document = Document::new("r.pdf", "pdf", text.to_string());
        let chunks = splitter(20).split(&document);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(page(chunk, keys::PAGE), Some(i as i64 + 1));
            assert_eq!(page(chunk, keys::PAGE_END), Some(i as i64 + 1));
        }
    }

    #[test]
    fn test_small_pages_are_merged() {
        let text = "One.\x0CTwo.\x0CThree.";
        let document = Document::new("r.pdf", "pdf", text.to_string());
        let chunks = splitter(100).split(&document);

        assert_eq!(chunks.len(), 1);
        assert_eq!(page(&chunks[0], keys::PAGE), Some(1));
        assert_eq!(page(&chunks[0], keys::PAGE_END), Some(3));
    }

    #[test]
    fn test_blank_pages_produce_nothing() {
        let document = Document::new("r.pdf", "pdf", "\x0C \n\x0C".to_string());
        assert!(splitter(100).split(&document).is_empty());
    }

    #[test]
    fn test_corrupt_pdf_is_content_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = splitter(100).load(&path).unwrap_err();
        assert!(matches!(err, ContentError::Pdf { .. }));
    }
}

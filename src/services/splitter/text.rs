//! Plain text splitting by paragraph.

use std::path::Path;

use super::window::{Level, Window, paragraphs};
use super::{ChunkSplitter, SplitterConfig, assemble};
use crate::error::ContentError;
use crate::models::{Chunk, Document, Metadata};
use crate::utils::file::read_text_file;

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }
}

impl ChunkSplitter for TextSplitter {
    fn kind(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text"]
    }

    fn load(&self, path: &Path) -> Result<Document, ContentError> {
        let text = read_text_file(path, self.config.max_file_size)?;
        Ok(Document::new(path.display().to_string(), self.kind(), text))
    }

    fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.is_blank() {
            return Vec::new();
        }

        let text = document.text.as_str();
        let units = paragraphs(text, 0..text.len());
        let spans = Window::new(text, &self.config.chunking)
            .split(&units, Level::Paragraph)
            .into_iter()
            .map(|span| (span, Metadata::new()))
            .collect();

        assemble(document, spans, &self.config.limits)
    }
}

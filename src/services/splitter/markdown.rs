//! Markdown splitting on `#`, `##` and `###` sections.

use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::window::{Level, Window};
use super::{ChunkSplitter, SplitterConfig, assemble};
use crate::error::ContentError;
use crate::models::{Chunk, Document, Metadata, keys};
use crate::utils::file::read_text_file;

static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,3})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").unwrap());

#[derive(Debug, Clone, PartialEq)]
struct Section {
    range: Range<usize>,
    headings: [Option<String>; 3],
}

impl Section {
    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        for (key, heading) in keys::HEADINGS.iter().zip(&self.headings) {
            if let Some(heading) = heading {
                metadata.insert((*key).to_string(), heading.clone().into());
            }
        }
        metadata
    }
}

/// Cut the document at level 1-3 headings outside fenced code blocks.
fn sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: [Option<String>; 3] = Default::default();
    let mut headings = stack.clone();
    let mut start = 0;
    let mut offset = 0;
    let mut fence: Option<&str> = None;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        let trimmed = content.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
        } else if trimmed.starts_with("```") {
            fence = Some("```");
        } else if trimmed.starts_with("~~~") {
            fence = Some("~~~");
        } else if let Some(caps) = RE_HEADING.captures(content) {
            if offset > start {
                sections.push(Section {
                    range: start..offset,
                    headings: headings.clone(),
                });
            }
            let level = caps[1].len();
            stack[level - 1] = Some(caps[2].trim().to_string());
            for deeper in stack.iter_mut().skip(level) {
                *deeper = None;
            }
            headings = stack.clone();
            start = offset;
        }

        offset += line.len();
    }

    if offset > start {
        sections.push(Section {
            range: start..offset,
            headings,
        });
    }

    merge_blank_sections(text, sections)
}

/// A whitespace-only preamble joins the first real section.
fn merge_blank_sections(text: &str, sections: Vec<Section>) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::with_capacity(sections.len());
    let mut pending: Option<usize> = None;

    for mut section in sections {
        if text[section.range.clone()].trim().is_empty() {
            pending.get_or_insert(section.range.start);
            continue;
        }
        if let Some(start) = pending.take() {
            section.range.start = start;
        }
        merged.push(section);
    }
    merged
}

#[derive(Debug, Clone)]
pub struct MarkdownSplitter {
    config: SplitterConfig,
}

impl MarkdownSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }
}

impl ChunkSplitter for MarkdownSplitter {
    fn kind(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn load(&self, path: &Path) -> Result<Document, ContentError> {
        let text = read_text_file(path, self.config.max_file_size)?;
        Ok(Document::new(path.display().to_string(), self.kind(), text))
    }

    fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.is_blank() {
            return Vec::new();
        }

        let window = Window::new(&document.text, &self.config.chunking);
        let spans = sections(&document.text)
            .into_iter()
            .flat_map(|section| {
                let metadata = section.metadata();
                window
                    .split(std::slice::from_ref(&section.range), Level::Section)
                    .into_iter()
                    .map(move |span| (span, metadata.clone()))
            })
            .collect();

        assemble(document, spans, &self.config.limits)
    }
}

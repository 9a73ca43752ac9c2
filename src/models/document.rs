use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::file::calculate_checksum;

/// Scalar metadata value attached to chunks and stored vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Integer(n) => write!(f, "{n}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Reserved metadata keys written for every stored vector.
pub mod keys {
    pub const CONTENT: &str = "content";
    pub const SOURCE: &str = "source";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const CHECKSUM: &str = "checksum";
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const INDEXED_AT: &str = "indexed_at";
    pub const OVERSIZED: &str = "oversized";
    pub const LINE_START: &str = "line_start";
    pub const LINE_END: &str = "line_end";
    pub const PAGE: &str = "page";
    pub const PAGE_END: &str = "page_end";
    pub const NUM_TOKENS: &str = "num_tokens";
    pub const NUM_BYTES: &str = "num_bytes";
    pub const HEADINGS: [&str; 3] = ["heading_1", "heading_2", "heading_3"];
}

/// A source document as read from disk. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Document {
    /// Canonical identifier, usually the absolute path.
    pub source: String,
    /// Splitter kind that loaded it (`text`, `markdown`, `pdf`).
    pub kind: &'static str,
    pub text: String,
    pub checksum: String,
}

impl Document {
    pub fn new(source: impl Into<String>, kind: &'static str, text: String) -> Self {
        let checksum = calculate_checksum(text.as_bytes());
        Self {
            source: source.into(),
            kind,
            text,
            checksum,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A bounded span of a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub index: u32,
    /// Byte offset of `text` in the document.
    pub start_offset: usize,
    pub end_offset: usize,
    /// Leading bytes of `text` repeated from the previous chunk.
    pub overlap: usize,
    pub metadata: Metadata,
}

impl Chunk {
    /// Deterministic key for `(source, index)`.
    pub fn generate_id(source: &str, index: u32) -> String {
        let name = format!("{}:{}", source, index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn id(&self) -> String {
        Self::generate_id(&self.source, self.index)
    }

    /// Text after the overlap prefix.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }

    /// Text sent to the embedding provider: the heading breadcrumb, when
    /// present, followed by the chunk text.
    pub fn embedding_text(&self) -> String {
        let breadcrumb: Vec<&str> = keys::HEADINGS
            .iter()
            .filter_map(|k| self.metadata.get(*k).and_then(MetadataValue::as_str))
            .collect();

        if breadcrumb.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", breadcrumb.join(" > "), self.text)
        }
    }
}

/// A vector with its key and payload, as persisted by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub key: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

impl IndexedVector {
    /// Build the stored record for a chunk of `document`.
    pub fn from_chunk(chunk: &Chunk, document: &Document, vector: Vec<f32>) -> Self {
        let mut metadata = chunk.metadata.clone();
        metadata.insert(keys::CONTENT.into(), chunk.text.clone().into());
        metadata.insert(keys::SOURCE.into(), chunk.source.clone().into());
        metadata.insert(keys::CHUNK_INDEX.into(), i64::from(chunk.index).into());
        metadata.insert(keys::CHECKSUM.into(), document.checksum.clone().into());
        metadata.insert(keys::DOCUMENT_TYPE.into(), document.kind.into());
        metadata.insert(
            keys::INDEXED_AT.into(),
            chrono::Utc::now().to_rfc3339().into(),
        );

        Self {
            key: chunk.id(),
            vector,
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get(keys::SOURCE)
            .and_then(MetadataValue::as_str)
    }
}
